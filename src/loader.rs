//! Dataset Loader
//!
//! Parses a memory-mapped text file of one point per line into a [`Dataset`],
//! fully in parallel and straight into pre-sized storage.
//!
//! # Algorithm
//!
//! 1. Infer D from the number of whitespace-separated tokens on the first line.
//! 2. Count line terminators in parallel to get N exactly (plus one for an
//!    unterminated final record) and allocate N points of D coordinates.
//! 3. Split the buffer into one byte range per worker, moving every start
//!    except the first forward to the next record boundary.
//! 4. Each worker counts the terminators before its start to learn the global
//!    index of its first record, so its destination slice is fixed by input
//!    position alone. No shared counter, no barrier.
//! 5. Workers parse their records directly into their disjoint slice.
//!
//! Point order therefore equals line order for every worker count.
//!
//! # Example
//!
//! ```
//! use pointrank::loader::parse_dataset;
//!
//! let dataset = parse_dataset(b"1.0 2.0\n3.0 4.0", 4)?;
//! assert_eq!(dataset.len(), 2);
//! assert_eq!(dataset.dim(), 2);
//! assert_eq!(dataset.points()[1].coords(), &[3.0, 4.0]);
//! # Ok::<(), pointrank::RankError>(())
//! ```

use crate::error::{RankError, Result};
use crate::point::{Dataset, Point};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, instrument};

const TERMINATOR: u8 = b'\n';

/// Memory-map `path` and parse it with `workers` parallel ranges.
///
/// # Errors
///
/// - [`RankError::Io`] if the file cannot be opened or mapped
/// - any error of [`parse_dataset`]
#[instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn load_dataset<P: AsRef<Path>>(path: P, workers: usize) -> Result<Dataset> {
    let file = File::open(path.as_ref())?;
    if file.metadata()?.len() == 0 {
        debug!("Empty dataset file");
        return Ok(Dataset::default());
    }

    // SAFETY: the map is read-only and dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file)? };
    parse_dataset(&mmap, workers)
}

/// Parse dataset text held in memory.
///
/// An empty buffer yields an empty dataset with `dim() == 0`.
///
/// # Errors
///
/// - [`RankError::EmptyFirstRecord`] if the first line has no tokens
/// - [`RankError::MalformedRecord`] if a line does not hold exactly D tokens
/// - [`RankError::InvalidToken`] if a token is not a valid `f32`
///
/// When several lines are bad, the earliest one is reported.
#[instrument(skip(bytes), fields(bytes = bytes.len()))]
pub fn parse_dataset(bytes: &[u8], workers: usize) -> Result<Dataset> {
    if bytes.is_empty() {
        return Ok(Dataset::default());
    }
    let workers = workers.max(1);

    let dim = infer_dim(bytes);
    if dim == 0 {
        return Err(RankError::EmptyFirstRecord);
    }

    let n = count_records(bytes, workers);
    let bounds = worker_bounds(bytes, workers);

    // Global index of each worker's first record, from input position only.
    // A start at the end of the buffer follows every record, terminated or not.
    let mut starts: Vec<usize> = bounds[..workers]
        .par_iter()
        .map(|&start| {
            if start == bytes.len() {
                n
            } else {
                count_terminators(&bytes[..start])
            }
        })
        .collect();
    starts.push(n);

    debug!(n, dim, workers, "Allocating point storage");
    let mut points: Vec<Point> = (0..n).into_par_iter().map(|_| Point::zeroed(dim)).collect();

    let mut slices: Vec<&mut [Point]> = Vec::with_capacity(workers);
    let mut rest: &mut [Point] = &mut points;
    for w in 0..workers {
        let count = starts[w + 1]
            .checked_sub(starts[w])
            .filter(|&c| c <= rest.len())
            .ok_or_else(|| {
                RankError::InvalidState(format!("worker {} start index out of order", w))
            })?;
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(count);
        slices.push(head);
        rest = tail;
    }

    let outcomes: Vec<Result<()>> = slices
        .into_par_iter()
        .enumerate()
        .map(|(w, out)| {
            let range = bounds[w]..bounds[w + 1];
            parse_range(bytes, range, out, dim, starts[w])
        })
        .collect();
    outcomes.into_iter().collect::<Result<()>>()?;

    Ok(Dataset::from_parts_unchecked(points, dim))
}

/// Number of tokens on the first line.
fn infer_dim(bytes: &[u8]) -> usize {
    let end = bytes
        .iter()
        .position(|&b| b == TERMINATOR)
        .unwrap_or(bytes.len());
    tokens(&bytes[..end]).count()
}

/// Exact record count: terminators summed over per-worker slices, plus one
/// when the last record is unterminated.
fn count_records(bytes: &[u8], workers: usize) -> usize {
    let chunk = bytes.len().div_ceil(workers).max(1);
    let terminated: usize = bytes.par_chunks(chunk).map(count_terminators).sum();
    match bytes.last() {
        Some(&last) if last != TERMINATOR => terminated + 1,
        _ => terminated,
    }
}

#[inline]
fn count_terminators(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == TERMINATOR).count()
}

/// `workers + 1` monotonic byte offsets. Every inner offset sits at the start
/// of a record; ranges may be empty.
fn worker_bounds(bytes: &[u8], workers: usize) -> Vec<usize> {
    let len = bytes.len();
    let chunk = len / workers;
    let mut bounds = Vec::with_capacity(workers + 1);
    bounds.push(0);
    for w in 1..workers {
        let previous = bounds[w - 1];
        bounds.push(align_to_record(bytes, (w * chunk).max(previous)));
    }
    bounds.push(len);
    bounds
}

/// Move `pos` forward to the first byte of the next record, unless it is one already.
fn align_to_record(bytes: &[u8], pos: usize) -> usize {
    if pos == 0 || pos >= bytes.len() {
        return pos.min(bytes.len());
    }
    if bytes[pos - 1] == TERMINATOR {
        return pos;
    }
    match bytes[pos..].iter().position(|&b| b == TERMINATOR) {
        Some(offset) => pos + offset + 1,
        None => bytes.len(),
    }
}

/// Parse every record in `bytes[range]` into `out`, one point per record.
fn parse_range(
    bytes: &[u8],
    range: Range<usize>,
    out: &mut [Point],
    dim: usize,
    first_record: usize,
) -> Result<()> {
    let chunk = bytes.get(range.clone()).ok_or_else(|| {
        RankError::InvalidState(format!("byte range {:?} outside buffer", range))
    })?;

    let mut records = chunk.split_inclusive(|&b| b == TERMINATOR);
    for (offset, point) in out.iter_mut().enumerate() {
        let line = first_record + offset + 1;
        let record = records.next().ok_or_else(|| {
            RankError::InvalidState(format!("range ended before record on line {}", line))
        })?;
        parse_record(record, point.coords_mut(), dim, line)?;
    }
    if records.next().is_some() {
        return Err(RankError::InvalidState(format!(
            "range holds more records than the {} reserved for it",
            out.len()
        )));
    }
    Ok(())
}

/// Parse one line into exactly `dim` coordinates.
fn parse_record(record: &[u8], coords: &mut [f32], dim: usize, line: usize) -> Result<()> {
    let mut found = 0;
    for token in tokens(record) {
        if found < dim {
            coords[found] = parse_token(token, line)?;
        }
        found += 1;
    }
    if found != dim {
        return Err(RankError::MalformedRecord {
            line,
            expected: dim,
            found,
        });
    }
    Ok(())
}

#[inline]
fn tokens(record: &[u8]) -> impl Iterator<Item = &[u8]> {
    record
        .split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty())
}

#[inline]
fn parse_token(token: &[u8], line: usize) -> Result<f32> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse::<f32>().ok())
        .ok_or_else(|| RankError::InvalidToken {
            line,
            token: String::from_utf8_lossy(token).into_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rows(dataset: &Dataset) -> Vec<Vec<f32>> {
        dataset.points().iter().map(|p| p.coords().to_vec()).collect()
    }

    #[test]
    fn test_unterminated_final_record() {
        let ds = parse_dataset(b"1.0 2.0\n3.0 4.0", 2).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.dim(), 2);
        assert_eq!(rows(&ds), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_terminated_final_record() {
        let ds = parse_dataset(b"1 2 3\n4 5 6\n", 3).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.dim(), 3);
    }

    #[test]
    fn test_empty_input() {
        let ds = parse_dataset(b"", 4).unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.dim(), 0);
    }

    #[test]
    fn test_whitespace_runs_and_crlf() {
        let ds = parse_dataset(b"  1.5\t -2  \r\n3   4\r\n", 2).unwrap();
        assert_eq!(rows(&ds), vec![vec![1.5, -2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_order_independent_of_worker_count() {
        let text: String = (0..997)
            .map(|i| format!("{}.25 {} -{}.5\n", i, i * 2, i % 13))
            .collect();
        let reference = parse_dataset(text.as_bytes(), 1).unwrap();
        assert_eq!(reference.len(), 997);
        for workers in [2, 3, 7, 16, 64, 2000] {
            let ds = parse_dataset(text.as_bytes(), workers).unwrap();
            assert_eq!(rows(&ds), rows(&reference), "workers = {}", workers);
        }
    }

    #[test]
    fn test_unterminated_tail_swallowing_later_ranges() {
        // Every inner bound lands at the end of the buffer.
        let ds = parse_dataset(b"1\n2222222", 2).unwrap();
        assert_eq!(rows(&ds), vec![vec![1.0], vec![2222222.0]]);

        let ds = parse_dataset(b"1\n2222222222222", 6).unwrap();
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn test_short_record_is_malformed() {
        let err = parse_dataset(b"1 2 3\n4 5\n6 7 8\n", 2).unwrap_err();
        assert!(matches!(
            err,
            RankError::MalformedRecord {
                line: 2,
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn test_long_record_is_malformed() {
        let err = parse_dataset(b"1 2\n3 4 5\n", 1).unwrap_err();
        assert!(matches!(
            err,
            RankError::MalformedRecord {
                line: 2,
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn test_blank_line_is_malformed() {
        let err = parse_dataset(b"1 2\n\n3 4\n", 3).unwrap_err();
        assert!(matches!(err, RankError::MalformedRecord { line: 2, found: 0, .. }));
    }

    #[test]
    fn test_invalid_token() {
        let err = parse_dataset(b"1 2\n3 x4\n", 2).unwrap_err();
        match err {
            RankError::InvalidToken { line, token } => {
                assert_eq!(line, 2);
                assert_eq!(token, "x4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_earliest_error_is_reported() {
        let mut text = String::new();
        for i in 0..500 {
            text.push_str(&format!("{} {}\n", i, i));
        }
        text.push_str("1\n");
        for i in 0..500 {
            text.push_str(&format!("{} {}\n", i, i));
        }
        text.push_str("bad 2\n");
        let err = parse_dataset(text.as_bytes(), 8).unwrap_err();
        assert!(matches!(err, RankError::MalformedRecord { line: 501, .. }));
    }

    #[test]
    fn test_empty_first_record() {
        assert!(matches!(
            parse_dataset(b"\n1 2\n", 2),
            Err(RankError::EmptyFirstRecord)
        ));
    }

    #[test]
    fn test_worker_bounds_are_record_aligned() {
        let text = b"11 22\n33 44\n55 66\n77 88\n";
        let bounds = worker_bounds(text, 5);
        assert_eq!(bounds.len(), 6);
        assert_eq!(bounds[0], 0);
        assert_eq!(*bounds.last().unwrap(), text.len());
        for pair in bounds.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        for &b in &bounds[1..bounds.len() - 1] {
            assert!(b == text.len() || text[b - 1] == b'\n');
        }
    }

    #[test]
    fn test_count_records() {
        assert_eq!(count_records(b"a\nb\nc", 2), 3);
        assert_eq!(count_records(b"a\nb\nc\n", 2), 3);
        assert_eq!(count_records(b"\n", 4), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "0 0\n3 4\n1 1\n10 10").unwrap();
        file.flush().unwrap();

        let ds = load_dataset(file.path(), 3).unwrap();
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.points()[3].coords(), &[10.0, 10.0]);
    }

    #[test]
    fn test_load_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let ds = load_dataset(file.path(), 3).unwrap();
        assert!(ds.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_dataset("/definitely/not/here.txt", 2).unwrap_err();
        assert!(matches!(err, RankError::Io(_)));
    }
}
