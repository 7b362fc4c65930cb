//! Load, key and sort orchestration.
//!
//! Every phase runs inside a dedicated rayon pool of exactly
//! `config.workers` threads, so the loader's byte ranges, the evaluator and
//! the merge sort all see the same worker count.

use crate::config::RankConfig;
use crate::error::{RankError, Result};
use crate::loader::load_dataset;
use crate::point::{Dataset, ReferenceVector};
use crate::ranker::{ranker_for, serialize_ms, RankReport};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Number of points loaded
    pub n: usize,
    /// Dimensionality of the dataset
    pub dim: usize,
    /// Worker threads used
    pub workers: usize,
    /// Time spent loading (mmap and parse)
    #[serde(rename = "load_ms", serialize_with = "serialize_ms")]
    pub load: Duration,
    /// What the ranker did
    pub report: RankReport,
    /// Smallest distance, if any points were loaded
    pub closest: Option<f32>,
    /// Largest distance, if any points were loaded
    pub farthest: Option<f32>,
}

impl RunSummary {
    /// Load plus ranking time.
    pub fn total(&self) -> Duration {
        self.load + self.report.total()
    }
}

/// Runs load → rank on an owned worker pool.
pub struct Pipeline {
    config: RankConfig,
    pool: ThreadPool,
}

impl Pipeline {
    /// Validate `config` and build its worker pool.
    pub fn new(config: RankConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("pointrank-{}", i))
            .build()
            .map_err(|e| RankError::InvalidConfig(format!("cannot build worker pool: {}", e)))?;
        Ok(Self { config, pool })
    }

    /// The configuration this pipeline runs with.
    pub fn config(&self) -> &RankConfig {
        &self.config
    }

    /// Load the dataset at `path`, rank it against `reference` (comma
    /// separated, zero-padded; the origin when `None`) and summarize.
    pub fn run<P: AsRef<Path>>(&self, path: P, reference: Option<&str>) -> Result<RunSummary> {
        self.rank_file(path, reference).map(|(_, summary)| summary)
    }

    /// Like [`run`](Self::run), but also hands back the ranked dataset.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display(), backend = %self.config.backend))]
    pub fn rank_file<P: AsRef<Path>>(
        &self,
        path: P,
        reference: Option<&str>,
    ) -> Result<(Dataset, RunSummary)> {
        let path = path.as_ref();
        self.pool.install(|| {
            let start = Instant::now();
            let mut dataset = load_dataset(path, self.config.workers)?;
            let load = start.elapsed();

            let reference = match reference {
                // Nothing to rank, so only the tokens are checked.
                Some(text) if dataset.is_empty() => {
                    ReferenceVector::parse_components(text)?;
                    ReferenceVector::zeros(dataset.dim())
                }
                Some(text) => ReferenceVector::parse(text, dataset.dim())?,
                None => ReferenceVector::zeros(dataset.dim()),
            };

            let ranker = ranker_for(&self.config)?;
            let report = ranker.rank(&mut dataset, &reference)?;

            let summary = RunSummary {
                n: dataset.len(),
                dim: dataset.dim(),
                workers: self.config.workers,
                load,
                report,
                closest: dataset.closest(),
                farthest: dataset.farthest(),
            };
            info!(
                n = summary.n,
                dim = summary.dim,
                total_ms = summary.total().as_secs_f64() * 1000.0,
                "Pipeline finished"
            );
            Ok((dataset, summary))
        })
    }
}
