//! Run configuration.
//!
//! The worker count is always explicit: library code never inspects the
//! machine. Callers (the `pointrank` binary, tests, benchmarks) decide it.
//!
//! ```
//! use pointrank::{Backend, RankConfig};
//!
//! let config = RankConfig::builder()
//!     .workers(16)
//!     .backend(Backend::Cpu)
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.grain_size(1_000_000), 7812);
//! ```

use crate::error::{RankError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default lower bound for the merge-sort grain size.
pub const DEFAULT_MIN_GRAIN: usize = 2000;

/// Default number of leaf tasks targeted per worker.
pub const DEFAULT_TASKS_PER_WORKER: usize = 8;

/// Default device threads per block.
pub const DEFAULT_BLOCK_SIZE: u32 = 256;

/// Ranking backend, selected per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Fork-join parallel merge sort on the worker pool
    #[default]
    Cpu,
    /// On-device distance plus bitonic sorting network
    Gpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cpu => write!(f, "cpu"),
            Backend::Gpu => write!(f, "gpu"),
        }
    }
}

impl FromStr for Backend {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Backend::Cpu),
            "gpu" => Ok(Backend::Gpu),
            other => Err(RankError::InvalidArgument(format!(
                "unknown backend '{}' (expected cpu or gpu)",
                other
            ))),
        }
    }
}

/// Which device the GPU backend runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// CUDA if compiled in and a device is present, else the host device
    #[default]
    Auto,
    /// The worker-pool implementation of the device kernels
    Host,
    /// CUDA only; fails if unavailable
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "host" | "cpu" => Ok(DevicePreference::Host),
            "cuda" => Ok(DevicePreference::Cuda),
            other => Err(RankError::InvalidArgument(format!(
                "unknown device '{}' (expected auto, host or cuda)",
                other
            ))),
        }
    }
}

/// Configuration for one ranking run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankConfig {
    /// Worker threads used by the loader, evaluator and CPU ranker
    pub workers: usize,
    /// Lower bound for the merge-sort grain size
    pub min_grain: usize,
    /// Leaf tasks targeted per worker
    pub tasks_per_worker: usize,
    /// Selected backend
    pub backend: Backend,
    /// Device used by the GPU backend
    pub device: DevicePreference,
    /// Device threads per block
    pub block_size: u32,
}

impl RankConfig {
    /// Configuration for `workers` threads with every other field at its default.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            min_grain: DEFAULT_MIN_GRAIN,
            tasks_per_worker: DEFAULT_TASKS_PER_WORKER,
            backend: Backend::Cpu,
            device: DevicePreference::Auto,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Create a builder
    pub fn builder() -> RankConfigBuilder {
        RankConfigBuilder {
            config: RankConfig::new(1),
        }
    }

    /// Check every field is usable.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(RankError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.min_grain == 0 {
            return Err(RankError::InvalidConfig("min_grain must be at least 1".into()));
        }
        if self.tasks_per_worker == 0 {
            return Err(RankError::InvalidConfig(
                "tasks_per_worker must be at least 1".into(),
            ));
        }
        if self.block_size == 0 || self.block_size > 1024 {
            return Err(RankError::InvalidConfig(format!(
                "block_size must be in 1..=1024, got {}",
                self.block_size
            )));
        }
        Ok(())
    }

    /// Merge-sort grain size for `n` points: `max(min_grain, n / (workers * tasks_per_worker))`.
    pub fn grain_size(&self, n: usize) -> usize {
        let leaves = self.workers.max(1) * self.tasks_per_worker.max(1);
        self.min_grain.max(n / leaves)
    }
}

/// Builder for [`RankConfig`]
#[derive(Debug, Clone)]
pub struct RankConfigBuilder {
    config: RankConfig,
}

impl RankConfigBuilder {
    /// Set the worker-thread count
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the merge-sort grain floor
    pub fn min_grain(mut self, min_grain: usize) -> Self {
        self.config.min_grain = min_grain;
        self
    }

    /// Set the leaf tasks targeted per worker
    pub fn tasks_per_worker(mut self, tasks: usize) -> Self {
        self.config.tasks_per_worker = tasks;
        self
    }

    /// Set the ranking backend
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the device for the GPU backend
    pub fn device(mut self, device: DevicePreference) -> Self {
        self.config.device = device;
        self
    }

    /// Set the device threads per block
    pub fn block_size(mut self, block_size: u32) -> Self {
        self.config.block_size = block_size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> RankConfig {
        self.config
    }
}
