//! End-to-end tests: generate a dataset, load it, rank it on both backends

use pointrank::generator::{generate_dataset, GeneratorConfig};
use pointrank::prelude::*;
use tempfile::tempdir;

fn config(workers: usize, backend: Backend) -> RankConfig {
    RankConfig::builder()
        .workers(workers)
        .min_grain(64)
        .backend(backend)
        .device(DevicePreference::Host)
        .build()
}

#[test]
fn test_generated_dataset_ranks_identically_on_both_backends() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("points.txt");
    generate_dataset(&path, &GeneratorConfig::new(5000, 10, 99, 4)).unwrap();

    let (cpu, cpu_summary) = Pipeline::new(config(4, Backend::Cpu))
        .unwrap()
        .rank_file(&path, Some("100,-100,0.5"))
        .unwrap();
    let (gpu, gpu_summary) = Pipeline::new(config(3, Backend::Gpu))
        .unwrap()
        .rank_file(&path, Some("100,-100,0.5"))
        .unwrap();

    assert_eq!(cpu.len(), 5000);
    assert_eq!(cpu.dim(), 10);
    assert!(cpu.is_ranked());
    assert_eq!(cpu, gpu);
    assert_eq!(cpu_summary.closest, gpu_summary.closest);
    assert_eq!(cpu_summary.farthest, gpu_summary.farthest);
    assert!(cpu_summary.report.gpu.is_none());
    assert!(gpu_summary.report.gpu.is_some());
}

#[test]
fn test_worker_count_does_not_change_result() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("points.txt");
    generate_dataset(&path, &GeneratorConfig::new(2048, 4, 1, 2)).unwrap();

    let (baseline, _) = Pipeline::new(config(1, Backend::Cpu))
        .unwrap()
        .rank_file(&path, None)
        .unwrap();
    for workers in [2, 5, 16] {
        let (ds, summary) = Pipeline::new(config(workers, Backend::Cpu))
            .unwrap()
            .rank_file(&path, None)
            .unwrap();
        assert_eq!(summary.workers, workers);
        assert_eq!(ds, baseline, "workers = {}", workers);
    }
}

#[test]
fn test_empty_file_runs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    std::fs::write(&path, b"").unwrap();

    for backend in [Backend::Cpu, Backend::Gpu] {
        for reference in [None, Some("1,2"), Some("-3.5")] {
            let summary = Pipeline::new(config(2, backend))
                .unwrap()
                .run(&path, reference)
                .unwrap();
            assert_eq!(summary.n, 0);
            assert_eq!(summary.closest, None);
            assert_eq!(summary.farthest, None);
        }
    }
}

#[test]
fn test_ranker_for_selects_backend() {
    let cpu = ranker_for(&config(1, Backend::Cpu)).unwrap();
    assert_eq!(cpu.name(), "cpu");

    let gpu = ranker_for(&config(1, Backend::Gpu)).unwrap();
    assert!(gpu.name().starts_with("gpu"));
}
