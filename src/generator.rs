//! Synthetic dataset generator.
//!
//! Each worker owns a contiguous share of the rows and an RNG seeded from
//! `seed + worker`. Rows are formatted into a worker-local buffer and
//! appended to the shared output in batches, so the lock is taken once per
//! batch rather than once per row. Batches from different workers
//! interleave, so the row order in the file is unspecified; the row count is
//! exact.

use crate::error::{RankError, Result};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Bytes of text targeted per batch write.
pub const TARGET_BATCH_BYTES: usize = 32 * 1024 * 1024;

/// Upper bound on rows per batch.
pub const MAX_BATCH_ROWS: usize = 100_000;

/// Coordinates are sampled uniformly from `[-VALUE_RANGE, VALUE_RANGE]`.
pub const VALUE_RANGE: f32 = 1000.0;

/// Estimated text width of one formatted coordinate, separator included.
const BYTES_PER_VALUE: usize = 12;

/// Rows per batch for `dims`-dimensional points: about
/// [`TARGET_BATCH_BYTES`] of text, capped at [`MAX_BATCH_ROWS`].
pub fn default_batch_rows(dims: usize) -> usize {
    let row_bytes = (dims * BYTES_PER_VALUE).max(1);
    (TARGET_BATCH_BYTES / row_bytes).clamp(1, MAX_BATCH_ROWS)
}

/// What to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Rows to write
    pub points: u64,
    /// Coordinates per row
    pub dims: usize,
    /// Base RNG seed; worker `w` uses `seed + w`
    pub seed: u64,
    /// Parallel writers
    pub workers: usize,
    /// Rows buffered per write
    pub batch_rows: usize,
}

impl GeneratorConfig {
    /// Configuration with the default batch size for `dims`.
    pub fn new(points: u64, dims: usize, seed: u64, workers: usize) -> Self {
        Self {
            points,
            dims,
            seed,
            workers,
            batch_rows: default_batch_rows(dims),
        }
    }

    /// Check every field is usable.
    pub fn validate(&self) -> Result<()> {
        if self.dims == 0 {
            return Err(RankError::InvalidConfig("dims must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(RankError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.batch_rows == 0 {
            return Err(RankError::InvalidConfig("batch_rows must be at least 1".into()));
        }
        Ok(())
    }

    /// Rows owned by worker `w`: an even split with the remainder spread
    /// over the first workers.
    fn rows_for(&self, w: usize) -> Range<u64> {
        let workers = self.workers as u64;
        let w = w as u64;
        let base = self.points / workers;
        let extra = self.points % workers;
        let start = w * base + w.min(extra);
        let len = base + u64::from(w < extra);
        start..start + len
    }
}

/// Result of a generator run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateReport {
    /// Rows written
    pub rows: u64,
    /// Bytes written
    pub bytes: u64,
    /// Batch writes issued across all workers
    pub batches: u64,
    /// Wall-clock time
    pub elapsed: Duration,
}

/// Write `config.points` random rows of `config.dims` coordinates to `path`,
/// truncating any existing file.
///
/// Runs on the current rayon pool.
///
/// # Errors
///
/// - [`RankError::InvalidConfig`] if `config` does not validate
/// - [`RankError::Io`] if the file cannot be created or written
#[instrument(skip(path, config), fields(path = %path.as_ref().display(), points = config.points, dims = config.dims))]
pub fn generate_dataset<P: AsRef<Path>>(path: P, config: &GeneratorConfig) -> Result<GenerateReport> {
    config.validate()?;
    let start = Instant::now();

    let file = File::create(path.as_ref())?;
    let out = generate_into(BufWriter::new(file), config)?;
    let elapsed = start.elapsed();

    info!(
        rows = out.rows,
        bytes = out.bytes,
        batches = out.batches,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "Dataset generated"
    );
    Ok(GenerateReport { elapsed, ..out })
}

/// Generate into any writer. The writer is flushed before returning.
pub fn generate_into<W: Write + Send>(writer: W, config: &GeneratorConfig) -> Result<GenerateReport> {
    config.validate()?;
    debug!(batch_rows = config.batch_rows, workers = config.workers, "Generator config");

    let shared = Mutex::new(writer);
    let totals: Vec<(u64, u64)> = (0..config.workers)
        .into_par_iter()
        .map(|w| write_share(&shared, config, w))
        .collect::<Result<_>>()?;

    shared.into_inner().flush()?;

    let (bytes, batches) = totals
        .iter()
        .fold((0, 0), |(b, n), &(bytes, batches)| (b + bytes, n + batches));
    Ok(GenerateReport {
        rows: config.points,
        bytes,
        batches,
        elapsed: Duration::ZERO,
    })
}

/// Generate worker `w`'s rows. Returns `(bytes, batches)` written.
fn write_share<W: Write>(shared: &Mutex<W>, config: &GeneratorConfig, w: usize) -> Result<(u64, u64)> {
    let rows = config.rows_for(w);
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(w as u64));
    let batch = (rows.end - rows.start).min(config.batch_rows as u64) as usize;
    let mut buffer = String::with_capacity(batch * config.dims * (BYTES_PER_VALUE + 1));

    let (mut bytes, mut batches) = (0u64, 0u64);
    let mut pending = 0usize;
    for _ in rows {
        push_row(&mut buffer, &mut rng, config.dims);
        pending += 1;
        if pending == config.batch_rows {
            bytes += flush(shared, &mut buffer)?;
            batches += 1;
            pending = 0;
        }
    }
    if pending > 0 {
        bytes += flush(shared, &mut buffer)?;
        batches += 1;
    }
    Ok((bytes, batches))
}

fn push_row(buffer: &mut String, rng: &mut StdRng, dims: usize) {
    for d in 0..dims {
        if d > 0 {
            buffer.push(' ');
        }
        let value: f32 = rng.gen_range(-VALUE_RANGE..=VALUE_RANGE);
        // Writing to a String cannot fail.
        let _ = write!(buffer, "{:.4}", value);
    }
    buffer.push('\n');
}

fn flush<W: Write>(shared: &Mutex<W>, buffer: &mut String) -> Result<u64> {
    let len = buffer.len() as u64;
    shared.lock().write_all(buffer.as_bytes())?;
    buffer.clear();
    Ok(len)
}
