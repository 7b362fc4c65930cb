//! GPU Ranker: on-device distances plus a bitonic sorting network.
//!
//! The driver works in an index domain. Points are flattened into a row-major
//! coordinate buffer, the slot count is padded to the next power of two, and
//! the device sorts `(key, index)` pairs. Padding slots carry `+inf` keys and
//! indices `>= n`, so they can never displace a real point. Once the network
//! finishes, the host drops the padding and gathers the points in parallel
//! into their ranked order.
//!
//! # Device Backends
//!
//! - [`HostDevice`]: the kernels mapped over the current rayon pool
//! - `CudaDevice` (feature `gpu-cuda`): the kernels compiled with NVRTC
//!
//! Both produce bit-identical keys and the same order, which is also the
//! order of the CPU merge sort: distance first, original position on ties.
//!
//! ```
//! use pointrank::gpu::{GpuRanker, HostDevice};
//! use pointrank::{Dataset, ReferenceVector};
//!
//! let mut ds = Dataset::from_rows(vec![vec![3.0, 4.0], vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
//! let ranker = GpuRanker::new(HostDevice::new());
//! ranker.sort(&mut ds, &ReferenceVector::zeros(2)).unwrap();
//!
//! assert_eq!(ds.distances(), vec![0.0, 2.0, 25.0]);
//! ```

mod host;
mod kernels;

#[cfg(feature = "gpu-cuda")]
mod cuda;

pub use host::{HostBuffers, HostDevice};

#[cfg(feature = "gpu-cuda")]
pub use cuda::{CudaBuffers, CudaDevice};

use crate::error::{RankError, Result};
use crate::point::{Dataset, Point, ReferenceVector};
use crate::ranker::serialize_ms;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Largest point count the `u32` index payload can address with padding.
pub const MAX_POINTS: usize = 1 << 31;

/// A device that can run the ranking kernels.
///
/// Calls are issued in order. Kernel launches may be asynchronous;
/// [`synchronize`](Self::synchronize) waits for everything issued so far.
pub trait DeviceBackend: Send + Sync {
    /// Device-resident buffers for one ranking call, freed on drop.
    type Buffers;

    /// Human-readable device name.
    fn name(&self) -> String;

    /// Copy the flattened coordinates, the reference and the initial index
    /// array to the device. The key buffer gets one slot per index.
    fn upload(&self, coords: &[f32], reference: &[f32], indices: &[u32]) -> Result<Self::Buffers>;

    /// Write the key of every slot: the distance for slots `< n`, `+inf` otherwise.
    fn distance_pass(&self, buffers: &mut Self::Buffers, n: u32, dim: u32) -> Result<()>;

    /// One `(k, j)` pass of the bitonic network over all slots.
    fn bitonic_step(&self, buffers: &mut Self::Buffers, k: u32, j: u32) -> Result<()>;

    /// Wait for all issued work.
    fn synchronize(&self) -> Result<()>;

    /// Copy `(indices, keys)` back to the host.
    fn download(&self, buffers: &Self::Buffers) -> Result<(Vec<u32>, Vec<f32>)>;
}

/// Wall-clock time of each GPU ranking stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GpuTimings {
    /// Flattening points and building the index array
    #[serde(rename = "host_prep_ms", serialize_with = "serialize_ms")]
    pub host_prep: Duration,
    /// Host to device copies
    #[serde(rename = "transfer_in_ms", serialize_with = "serialize_ms")]
    pub transfer_in: Duration,
    /// Distance kernel
    #[serde(rename = "distance_kernel_ms", serialize_with = "serialize_ms")]
    pub distance_kernel: Duration,
    /// All bitonic network passes
    #[serde(rename = "sort_network_ms", serialize_with = "serialize_ms")]
    pub sort_network: Duration,
    /// Device to host copies
    #[serde(rename = "transfer_out_ms", serialize_with = "serialize_ms")]
    pub transfer_out: Duration,
    /// Gathering points into ranked order
    #[serde(rename = "host_reorder_ms", serialize_with = "serialize_ms")]
    pub host_reorder: Duration,
}

impl GpuTimings {
    /// Sum of all stages.
    pub fn total(&self) -> Duration {
        self.host_prep
            + self.transfer_in
            + self.distance_kernel
            + self.sort_network
            + self.transfer_out
            + self.host_reorder
    }

    /// Time spent on the device including transfers.
    pub fn device(&self) -> Duration {
        self.transfer_in + self.distance_kernel + self.sort_network + self.transfer_out
    }
}

/// Ranks a dataset on a [`DeviceBackend`].
#[derive(Debug, Clone)]
pub struct GpuRanker<D> {
    device: D,
    name: String,
}

impl<D: DeviceBackend> GpuRanker<D> {
    /// Create a ranker on `device`.
    pub fn new(device: D) -> Self {
        let name = format!("gpu [{}]", device.name());
        Self { device, name }
    }

    /// Backend label, including the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Write every distance key and reorder `dataset` ascending by it.
    ///
    /// # Errors
    ///
    /// - [`RankError::DimensionMismatch`] if the reference has the wrong dimensionality
    /// - [`RankError::CapacityExceeded`] if the dataset has more than [`MAX_POINTS`] points
    /// - [`RankError::Device`] on any device failure
    /// - [`RankError::InvalidState`] if the device returns something that is not a permutation
    #[instrument(skip(self, dataset, reference), fields(n = dataset.len(), dim = dataset.dim()))]
    pub fn sort(&self, dataset: &mut Dataset, reference: &ReferenceVector) -> Result<GpuTimings> {
        let mut timings = GpuTimings::default();
        let n = dataset.len();
        let dim = dataset.dim();

        if n == 0 {
            return Ok(timings);
        }
        if reference.dim() != dim {
            return Err(RankError::DimensionMismatch {
                expected: dim,
                got: reference.dim(),
            });
        }
        if n > MAX_POINTS {
            return Err(RankError::CapacityExceeded(format!(
                "{} points exceed the device limit of {}",
                n, MAX_POINTS
            )));
        }
        if dim == 0 {
            // Every point is the origin: all keys are zero and the order stands.
            dataset.points_mut().par_iter_mut().for_each(|p| p.distance = 0.0);
            return Ok(timings);
        }

        let slots = n.next_power_of_two();
        let dim32 = u32::try_from(dim)
            .map_err(|_| RankError::CapacityExceeded(format!("{} dimensions exceed u32", dim)))?;
        let values = n.checked_mul(dim).ok_or_else(|| {
            RankError::CapacityExceeded(format!("{} x {} coordinates overflow", n, dim))
        })?;

        info!(device = %self.device.name(), n, dim, slots, "Starting GPU ranking");

        let start = Instant::now();
        let coords = flatten(dataset.points(), dim, values);
        let indices: Vec<u32> = (0..slots as u32).into_par_iter().collect();
        timings.host_prep = start.elapsed();

        let start = Instant::now();
        let mut buffers = self.device.upload(&coords, reference.as_slice(), &indices)?;
        drop(coords);
        drop(indices);
        timings.transfer_in = start.elapsed();

        let start = Instant::now();
        self.device.distance_pass(&mut buffers, n as u32, dim32)?;
        self.device.synchronize()?;
        timings.distance_kernel = start.elapsed();

        let start = Instant::now();
        let passes = self.run_network(&mut buffers, slots as u32)?;
        timings.sort_network = start.elapsed();
        debug!(passes, "Sorting network finished");

        let start = Instant::now();
        let (order, keys) = self.device.download(&buffers)?;
        drop(buffers);
        timings.transfer_out = start.elapsed();

        let start = Instant::now();
        let ranked = ranked_slots(&order, &keys, n, slots)?;
        dataset.reorder_with(|points| gather(points, &ranked))?;
        timings.host_reorder = start.elapsed();

        debug!(?timings, "GPU ranking finished");
        Ok(timings)
    }

    /// Issue every `(k, j)` pass. Returns the number of passes.
    fn run_network(&self, buffers: &mut D::Buffers, slots: u32) -> Result<usize> {
        let mut passes = 0;
        let mut k = 2u32;
        while k <= slots {
            let mut j = k / 2;
            while j > 0 {
                self.device.bitonic_step(buffers, k, j)?;
                passes += 1;
                j /= 2;
            }
            self.device.synchronize()?;
            match k.checked_mul(2) {
                Some(next) => k = next,
                None => break,
            }
        }
        Ok(passes)
    }
}

/// Row-major copy of every point's coordinates.
fn flatten(points: &[Point], dim: usize, values: usize) -> Vec<f32> {
    let mut coords = vec![0.0f32; values];
    coords
        .par_chunks_mut(dim)
        .zip(points.par_iter())
        .for_each(|(row, point)| row.copy_from_slice(point.coords()));
    coords
}

/// Drop padding slots and check the rest is a permutation of `0..n`.
///
/// Padding carries `+inf` keys and indices `>= n`, so it sorts after every
/// finite key; a NaN key from a real point may sort after it, which is why
/// padding is filtered rather than cut off.
fn ranked_slots(order: &[u32], keys: &[f32], n: usize, slots: usize) -> Result<Vec<(u32, f32)>> {
    if order.len() != slots || keys.len() != slots {
        return Err(RankError::InvalidState(format!(
            "device returned {} indices and {} keys for {} slots",
            order.len(),
            keys.len(),
            slots
        )));
    }

    let ranked: Vec<(u32, f32)> = order
        .par_iter()
        .zip(keys.par_iter())
        .filter(|(index, _)| (**index as usize) < n)
        .map(|(&index, &key)| (index, key))
        .collect();
    if ranked.len() != n {
        return Err(RankError::InvalidState(format!(
            "device returned {} real slots, expected {}",
            ranked.len(),
            n
        )));
    }

    let mut seen = vec![false; n];
    for &(index, _) in &ranked {
        if std::mem::replace(&mut seen[index as usize], true) {
            return Err(RankError::InvalidState(format!(
                "point {} appears twice in the device order",
                index
            )));
        }
    }
    Ok(ranked)
}

/// Move each point to its ranked position and store its device key.
fn gather(points: Vec<Point>, ranked: &[(u32, f32)]) -> Result<Vec<Point>> {
    let sources: Vec<Mutex<Option<Point>>> =
        points.into_par_iter().map(|p| Mutex::new(Some(p))).collect();

    ranked
        .par_iter()
        .map(|&(index, key)| {
            let mut point = sources
                .get(index as usize)
                .and_then(|slot| slot.lock().take())
                .ok_or_else(|| {
                    RankError::InvalidState(format!("point {} is missing or already placed", index))
                })?;
            point.distance = key;
            Ok(point)
        })
        .collect()
}
