//! The ranking interface shared by both backends.
//!
//! A [`Ranker`] writes every point's distance key and reorders the dataset
//! ascending by it. [`ranker_for`] picks the implementation for a
//! [`RankConfig`]: the CPU merge sort, or the GPU network on the requested
//! device with the host device as the fallback.

use crate::config::{Backend, DevicePreference, RankConfig};
use crate::error::{RankError, Result};
use crate::evaluator::compute_distances;
use crate::gpu::{DeviceBackend, GpuRanker, GpuTimings, HostDevice};
use crate::mergesort::parallel_merge_sort;
use crate::point::{Dataset, ReferenceVector};
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Serialize a [`Duration`] as fractional milliseconds.
pub(crate) fn serialize_ms<S: Serializer>(d: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// What one ranking call did and how long it took.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankReport {
    /// Backend label, e.g. `cpu` or `gpu [host (8 workers)]`
    pub backend: String,
    /// Time spent computing distance keys
    #[serde(rename = "distance_ms", serialize_with = "serialize_ms")]
    pub distance: Duration,
    /// Time spent ordering the points (for the GPU, everything but the distance kernel)
    #[serde(rename = "sort_ms", serialize_with = "serialize_ms")]
    pub sort: Duration,
    /// Per-stage breakdown, GPU backend only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuTimings>,
}

impl RankReport {
    /// Distance plus sort time.
    pub fn total(&self) -> Duration {
        self.distance + self.sort
    }
}

/// A ranking backend.
pub trait Ranker: Send + Sync {
    /// Backend label used in reports and logs.
    fn name(&self) -> &str;

    /// Compute every distance key against `reference` and sort `dataset` by it.
    fn rank(&self, dataset: &mut Dataset, reference: &ReferenceVector) -> Result<RankReport>;
}

/// Distance Evaluator followed by the fork-join merge sort.
#[derive(Debug, Clone)]
pub struct CpuRanker {
    config: RankConfig,
}

impl CpuRanker {
    /// Create a CPU ranker; the grain size is derived from `config` per call.
    pub fn new(config: RankConfig) -> Self {
        Self { config }
    }
}

impl Ranker for CpuRanker {
    fn name(&self) -> &str {
        "cpu"
    }

    #[instrument(skip(self, dataset, reference), fields(n = dataset.len()))]
    fn rank(&self, dataset: &mut Dataset, reference: &ReferenceVector) -> Result<RankReport> {
        let start = Instant::now();
        compute_distances(dataset.points_mut(), reference)?;
        let distance = start.elapsed();

        let grain = self.config.grain_size(dataset.len());
        let start = Instant::now();
        let stats = parallel_merge_sort(dataset.points_mut(), grain);
        let sort = start.elapsed();

        info!(
            grain = stats.grain,
            depth = stats.depth,
            leaves = stats.leaves,
            distance_ms = distance.as_secs_f64() * 1000.0,
            sort_ms = sort.as_secs_f64() * 1000.0,
            "CPU ranking finished"
        );
        Ok(RankReport {
            backend: self.name().to_string(),
            distance,
            sort,
            gpu: None,
        })
    }
}

impl<D: DeviceBackend> Ranker for GpuRanker<D> {
    fn name(&self) -> &str {
        GpuRanker::name(self)
    }

    fn rank(&self, dataset: &mut Dataset, reference: &ReferenceVector) -> Result<RankReport> {
        let timings = self.sort(dataset, reference)?;
        Ok(RankReport {
            backend: self.name().to_string(),
            distance: timings.distance_kernel,
            sort: timings.total() - timings.distance_kernel,
            gpu: Some(timings),
        })
    }
}

/// Build the ranker selected by `config`.
///
/// With [`DevicePreference::Auto`] the GPU backend tries CUDA when the
/// `gpu-cuda` feature is compiled in and falls back to the host device.
///
/// # Errors
///
/// - [`RankError::InvalidConfig`] if `config` does not validate
/// - [`RankError::Device`] if CUDA is requested but unavailable
pub fn ranker_for(config: &RankConfig) -> Result<Box<dyn Ranker>> {
    config.validate()?;
    match config.backend {
        Backend::Cpu => Ok(Box::new(CpuRanker::new(config.clone()))),
        Backend::Gpu => gpu_ranker(config),
    }
}

fn gpu_ranker(config: &RankConfig) -> Result<Box<dyn Ranker>> {
    match config.device {
        DevicePreference::Host => Ok(Box::new(GpuRanker::new(HostDevice::new()))),
        DevicePreference::Cuda => cuda_ranker(config),
        DevicePreference::Auto => match cuda_ranker(config) {
            Ok(ranker) => Ok(ranker),
            Err(e) => {
                warn!(error = %e, "No CUDA device, using host device");
                Ok(Box::new(GpuRanker::new(HostDevice::new())))
            }
        },
    }
}

#[cfg(feature = "gpu-cuda")]
fn cuda_ranker(config: &RankConfig) -> Result<Box<dyn Ranker>> {
    let device = crate::gpu::CudaDevice::new(0, config.block_size)?;
    Ok(Box::new(GpuRanker::new(device)))
}

#[cfg(not(feature = "gpu-cuda"))]
fn cuda_ranker(_config: &RankConfig) -> Result<Box<dyn Ranker>> {
    Err(RankError::Device(
        "built without CUDA support (enable the gpu-cuda feature)".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_rows(vec![
            vec![0.0, 0.0],
            vec![3.0, 4.0],
            vec![1.0, 1.0],
            vec![10.0, 10.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_cpu_ranker() {
        let ranker = CpuRanker::new(RankConfig::new(2));
        let mut ds = dataset();
        let report = ranker.rank(&mut ds, &ReferenceVector::zeros(2)).unwrap();

        assert_eq!(report.backend, "cpu");
        assert!(report.gpu.is_none());
        assert_eq!(ds.distances(), vec![0.0, 2.0, 25.0, 200.0]);
    }

    #[test]
    fn test_gpu_ranker_reports_stages() {
        let config = RankConfig::builder()
            .backend(Backend::Gpu)
            .device(DevicePreference::Host)
            .build();
        let ranker = ranker_for(&config).unwrap();
        assert!(ranker.name().starts_with("gpu [host"));

        let mut ds = dataset();
        let report = ranker.rank(&mut ds, &ReferenceVector::zeros(2)).unwrap();
        let gpu = report.gpu.unwrap();
        assert_eq!(report.total(), gpu.total());
        assert_eq!(ds.distances(), vec![0.0, 2.0, 25.0, 200.0]);
    }

    #[test]
    fn test_auto_device_always_builds() {
        let config = RankConfig::builder().backend(Backend::Gpu).build();
        assert!(ranker_for(&config).is_ok());
    }

    #[cfg(not(feature = "gpu-cuda"))]
    #[test]
    fn test_cuda_without_feature_is_device_error() {
        let config = RankConfig::builder()
            .backend(Backend::Gpu)
            .device(DevicePreference::Cuda)
            .build();
        assert!(matches!(ranker_for(&config), Err(RankError::Device(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RankConfig::builder().workers(0).build();
        assert!(matches!(ranker_for(&config), Err(RankError::InvalidConfig(_))));
    }

    #[test]
    fn test_report_json() {
        let report = RankReport {
            backend: "cpu".into(),
            distance: Duration::from_micros(1500),
            sort: Duration::from_millis(3),
            gpu: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["distance_ms"], 1.5);
        assert_eq!(json["sort_ms"], 3.0);
        assert!(json.get("gpu").is_none());
    }
}
