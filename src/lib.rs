//! # pointrank - Brute-Force Nearest-Neighbour Ranking
//!
//! pointrank loads a text dataset of N points in D dimensions, computes every
//! point's squared Euclidean distance to a reference point, and reorders the
//! dataset by that distance. Two interchangeable backends do the ranking:
//!
//! - **CPU**: a parallel distance pass followed by a fork-join merge sort
//! - **GPU**: on-device distances and a bitonic sorting network, on CUDA or
//!   on the host worker pool when no device is present
//!
//! Both backends produce the same order: distance first, then original
//! position on ties.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pointrank::{Backend, Pipeline, RankConfig};
//!
//! fn main() -> pointrank::Result<()> {
//!     let config = RankConfig::builder()
//!         .workers(8)
//!         .backend(Backend::Cpu)
//!         .build();
//!
//!     let summary = Pipeline::new(config)?.run("points.txt", Some("1.0,2.0"))?;
//!     println!("closest: {:?}, farthest: {:?}", summary.closest, summary.farthest);
//!     Ok(())
//! }
//! ```
//!
//! ## Working in Memory
//!
//! ```rust
//! use pointrank::{parse_dataset, CpuRanker, RankConfig, Ranker, ReferenceVector};
//!
//! let mut dataset = parse_dataset(b"3 4\n0 0\n1 1\n", 2)?;
//! let ranker = CpuRanker::new(RankConfig::new(2));
//! ranker.rank(&mut dataset, &ReferenceVector::zeros(2))?;
//!
//! assert_eq!(dataset.distances(), vec![0.0, 2.0, 25.0]);
//! # Ok::<(), pointrank::RankError>(())
//! ```

#![warn(missing_docs)]

// ── Core ──────────────────────────────────────────────────────────────────────
// Errors and the distance kernel live in pointrank-core.
pub use pointrank_core::{distance, error};
pub mod config;
pub mod point;

// ── Pipeline Stages ──────────────────────────────────────────────────────────
pub mod evaluator;
pub mod loader;
pub mod mergesort;

// ── Ranking Backends ─────────────────────────────────────────────────────────
pub mod gpu;
pub mod ranker;

// ── Orchestration & Tools ────────────────────────────────────────────────────
pub mod generator;
pub mod pipeline;

// ── Stable API ───────────────────────────────────────────────────────────────
pub use config::{Backend, DevicePreference, RankConfig, RankConfigBuilder};
pub use distance::squared_euclidean;
pub use error::{ErrorCode, RankError, Result};
pub use evaluator::compute_distances;
pub use gpu::{DeviceBackend, GpuRanker, GpuTimings, HostDevice};
pub use loader::{load_dataset, parse_dataset};
pub use mergesort::{parallel_merge_sort, SortStats};
pub use pipeline::{Pipeline, RunSummary};
pub use point::{Dataset, Point, ReferenceVector};
pub use ranker::{ranker_for, CpuRanker, RankReport, Ranker};

#[cfg(feature = "gpu-cuda")]
pub use gpu::CudaDevice;

/// Prelude module for convenient imports.
///
/// ```rust
/// use pointrank::prelude::*;
///
/// let config = RankConfig::new(4);
/// assert_eq!(config.backend, Backend::Cpu);
/// ```
pub mod prelude {
    pub use crate::config::{Backend, DevicePreference, RankConfig};
    pub use crate::error::{RankError, Result};
    pub use crate::pipeline::{Pipeline, RunSummary};
    pub use crate::point::{Dataset, Point, ReferenceVector};
    pub use crate::ranker::{ranker_for, Ranker};
}
