//! Edge case tests for pointrank
//! Boundary conditions, malformed input and error reporting

use pointrank::{
    load_dataset, parse_dataset, ranker_for, Backend, CpuRanker, Dataset, DevicePreference,
    ErrorCode, GpuRanker, HostDevice, Point, RankConfig, RankError, Ranker, ReferenceVector,
};
use std::io::Write;
use tempfile::NamedTempFile;

fn backends() -> Vec<Box<dyn Ranker>> {
    let cpu = RankConfig::builder().workers(2).min_grain(2).build();
    let gpu = RankConfig::builder()
        .workers(2)
        .backend(Backend::Gpu)
        .device(DevicePreference::Host)
        .build();
    vec![ranker_for(&cpu).unwrap(), ranker_for(&gpu).unwrap()]
}

// ============================================================================
// Tiny Datasets
// ============================================================================

#[test]
fn test_empty_dataset_ranks_on_every_backend() {
    for ranker in backends() {
        let mut ds = Dataset::default();
        ranker.rank(&mut ds, &ReferenceVector::zeros(0)).unwrap();
        assert!(ds.is_empty(), "{}", ranker.name());
        assert_eq!(ds.closest(), None);
    }
}

#[test]
fn test_single_point() {
    for ranker in backends() {
        let mut ds = parse_dataset(b"3 4", 1).unwrap();
        ranker.rank(&mut ds, &ReferenceVector::zeros(2)).unwrap();
        assert_eq!(ds.distances(), vec![25.0], "{}", ranker.name());
    }
}

#[test]
fn test_power_of_two_boundaries() {
    for n in [2usize, 3, 4, 7, 8, 9, 255, 256, 257] {
        let text: String = (0..n).rev().map(|i| format!("{}\n", i)).collect();
        for ranker in backends() {
            let mut ds = parse_dataset(text.as_bytes(), 3).unwrap();
            ranker.rank(&mut ds, &ReferenceVector::zeros(1)).unwrap();

            let expected: Vec<f32> = (0..n).map(|i| (i * i) as f32).collect();
            assert_eq!(ds.distances(), expected, "{} n={}", ranker.name(), n);
        }
    }
}

#[test]
fn test_all_points_identical() {
    let text = "1 1 1\n".repeat(100);
    for ranker in backends() {
        let mut ds = parse_dataset(text.as_bytes(), 4).unwrap();
        ranker.rank(&mut ds, &ReferenceVector::zeros(3)).unwrap();
        assert!(ds.distances().iter().all(|&d| d == 3.0));
    }
}

#[test]
fn test_zero_dimensional_points() {
    let mut ds = Dataset::from_points(vec![Point::zeroed(0); 3], 0).unwrap();
    let ranker = CpuRanker::new(RankConfig::new(1));
    ranker.rank(&mut ds, &ReferenceVector::zeros(0)).unwrap();
    assert_eq!(ds.distances(), vec![0.0; 3]);
}

#[test]
fn test_dimension_not_multiple_of_lanes() {
    // 8 full lanes plus a remainder of 3
    let row: Vec<String> = (0..11).map(|i| i.to_string()).collect();
    let text = format!("{}\n", row.join(" "));
    for ranker in backends() {
        let mut ds = parse_dataset(text.as_bytes(), 1).unwrap();
        ranker.rank(&mut ds, &ReferenceVector::zeros(11)).unwrap();
        assert_eq!(ds.distances(), vec![385.0]);
    }
}

// ============================================================================
// Malformed Input
// ============================================================================

#[test]
fn test_short_line_reports_line_number() {
    let err = parse_dataset(b"1 2 3\n4 5 6\n7 8\n", 2).unwrap_err();
    assert!(matches!(
        err,
        RankError::MalformedRecord {
            line: 3,
            expected: 3,
            found: 2
        }
    ));
    assert_eq!(err.error_code(), ErrorCode::MalformedRecord);
    assert!(err.hint().is_some());
}

#[test]
fn test_garbage_token() {
    let err = parse_dataset(b"1 2\n3 four\n", 2).unwrap_err();
    match err {
        RankError::InvalidToken { line, token } => {
            assert_eq!(line, 2);
            assert_eq!(token, "four");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_leading_blank_line() {
    assert!(matches!(
        parse_dataset(b"\n1 2\n", 1),
        Err(RankError::EmptyFirstRecord)
    ));
    assert!(matches!(
        parse_dataset(b"   \t\n1 2\n", 1),
        Err(RankError::EmptyFirstRecord)
    ));
}

#[test]
fn test_non_utf8_bytes_are_invalid_tokens() {
    let err = parse_dataset(b"1 2\n\xff\xfe 3\n", 2).unwrap_err();
    assert!(matches!(err, RankError::InvalidToken { line: 2, .. }));
}

#[test]
fn test_crlf_dataset() {
    let ds = parse_dataset(b"1 2\r\n3 4\r\n", 2).unwrap();
    assert_eq!(ds.len(), 2);
    assert_eq!(ds.points()[1].coords(), &[3.0, 4.0]);
}

// ============================================================================
// Reference Vector
// ============================================================================

#[test]
fn test_reference_with_spaces_and_negatives() {
    let r = ReferenceVector::parse(" -1.5 , 2 ", 3).unwrap();
    assert_eq!(r.as_slice(), &[-1.5, 2.0, 0.0]);
}

#[test]
fn test_reference_longer_than_dataset() {
    let err = ReferenceVector::parse("1,2,3,4", 3).unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::DimensionMismatch);
}

#[test]
fn test_mismatched_reference_rejected_by_every_backend() {
    for ranker in backends() {
        let mut ds = parse_dataset(b"1 2\n3 4\n", 1).unwrap();
        let before = ds.clone();
        let err = ranker.rank(&mut ds, &ReferenceVector::zeros(3)).unwrap_err();
        assert!(matches!(err, RankError::DimensionMismatch { .. }));
        assert_eq!(ds, before, "{} mutated the dataset", ranker.name());
    }
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn test_load_file_with_more_workers_than_lines() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"1 1\n2 2\n").unwrap();

    let ds = load_dataset(file.path(), 64).unwrap();
    assert_eq!(ds.len(), 2);
    assert_eq!(ds.points()[1].coords(), &[2.0, 2.0]);
}

#[test]
fn test_load_missing_file_has_hint() {
    let err = load_dataset("/definitely/not/here.txt", 1).unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::IoRead);
    assert!(err.hint().unwrap().contains("path"));
}

#[test]
fn test_gpu_ranker_reusable_across_datasets() {
    let ranker = GpuRanker::new(HostDevice::new());
    for n in [5, 50, 500] {
        let text: String = (0..n).map(|i| format!("{} {}\n", n - i, i)).collect();
        let mut ds = parse_dataset(text.as_bytes(), 2).unwrap();
        ranker.sort(&mut ds, &ReferenceVector::zeros(2)).unwrap();
        assert!(ds.is_ranked());
        assert_eq!(ds.len(), n);
    }
}
