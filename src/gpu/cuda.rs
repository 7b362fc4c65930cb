//! CUDA device via `cudarc`.
//!
//! Kernels are CUDA C compiled at startup with NVRTC. FMA contraction is
//! disabled and the distance loop keeps the eight-lane accumulation order of
//! [`squared_euclidean`](crate::distance::squared_euclidean), so device keys
//! equal host keys bit for bit. Keys are compared through the same total-order
//! bit transform as `f32::total_cmp`.
//!
//! Device buffers are `CudaSlice`s owned by [`CudaBuffers`] and freed when it
//! drops, on success and error paths alike.

use super::DeviceBackend;
use crate::error::{RankError, Result};
use cudarc::driver::{CudaDevice as Device, CudaFunction, CudaSlice, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::{compile_ptx_with_opts, CompileOptions};
use std::sync::Arc;
use tracing::{debug, info};

const MODULE: &str = "pointrank";
const DISTANCE_KERNEL: &str = "distance_kernel";
const BITONIC_KERNEL: &str = "bitonic_step_kernel";

const KERNEL_SOURCE: &str = r#"
#define LANES 8

extern "C" __global__ void distance_kernel(
    const float* coords,
    const float* reference,
    float* keys,
    unsigned int n,
    unsigned int dim,
    unsigned int slots)
{
    unsigned int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= slots) return;
    if (i >= n) {
        keys[i] = __int_as_float(0x7f800000);
        return;
    }

    const float* row = coords + (unsigned long long)i * dim;
    float acc[LANES];
    for (int l = 0; l < LANES; ++l) acc[l] = 0.0f;

    unsigned int full = dim - dim % LANES;
    for (unsigned int c = 0; c < full; c += LANES) {
        for (int l = 0; l < LANES; ++l) {
            float diff = row[c + l] - reference[c + l];
            acc[l] += diff * diff;
        }
    }

    float sum = ((acc[0] + acc[1]) + (acc[2] + acc[3])) + ((acc[4] + acc[5]) + (acc[6] + acc[7]));
    for (unsigned int c = full; c < dim; ++c) {
        float diff = row[c] - reference[c];
        sum += diff * diff;
    }
    if (isnan(sum)) sum = __int_as_float(0x7fc00000);
    keys[i] = sum;
}

__device__ int total_order(float x) {
    int bits = __float_as_int(x);
    return bits ^ ((bits >> 31) & 0x7fffffff);
}

__device__ bool precedes(float ka, unsigned int ia, float kb, unsigned int ib) {
    int oa = total_order(ka);
    int ob = total_order(kb);
    return oa < ob || (oa == ob && ia < ib);
}

extern "C" __global__ void bitonic_step_kernel(
    float* keys,
    unsigned int* indices,
    unsigned int slots,
    unsigned int k,
    unsigned int j)
{
    unsigned int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= slots) return;
    unsigned int partner = i ^ j;
    if (partner <= i) return;

    float key_i = keys[i];
    float key_p = keys[partner];
    unsigned int idx_i = indices[i];
    unsigned int idx_p = indices[partner];

    bool ascending = (i & k) == 0;
    bool swap = ascending ? precedes(key_p, idx_p, key_i, idx_i)
                          : precedes(key_i, idx_i, key_p, idx_p);
    if (swap) {
        keys[i] = key_p;
        keys[partner] = key_i;
        indices[i] = idx_p;
        indices[partner] = idx_i;
    }
}
"#;

fn driver_error(context: &'static str) -> impl Fn(cudarc::driver::DriverError) -> RankError {
    move |e| RankError::Device(format!("CUDA {} failed: {:?}", context, e))
}

/// A CUDA device with the ranking kernels loaded.
pub struct CudaDevice {
    device: Arc<Device>,
    ordinal: usize,
    block_size: u32,
    distance: CudaFunction,
    bitonic: CudaFunction,
}

/// Device-resident buffers for one ranking call.
pub struct CudaBuffers {
    coords: CudaSlice<f32>,
    reference: CudaSlice<f32>,
    keys: CudaSlice<f32>,
    indices: CudaSlice<u32>,
    slots: u32,
}

impl CudaDevice {
    /// Open device `ordinal`, compile the kernels and load them.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::Device`] if the driver, the device or NVRTC is unavailable.
    pub fn new(ordinal: usize, block_size: u32) -> Result<Self> {
        let device = Device::new(ordinal).map_err(driver_error("device open"))?;

        let options = CompileOptions {
            fmad: Some(false),
            ..Default::default()
        };
        let ptx = compile_ptx_with_opts(KERNEL_SOURCE, options)
            .map_err(|e| RankError::Device(format!("NVRTC compile failed: {:?}", e)))?;
        device
            .load_ptx(ptx, MODULE, &[DISTANCE_KERNEL, BITONIC_KERNEL])
            .map_err(driver_error("module load"))?;

        let distance = device
            .get_func(MODULE, DISTANCE_KERNEL)
            .ok_or_else(|| RankError::Device(format!("kernel {} not found", DISTANCE_KERNEL)))?;
        let bitonic = device
            .get_func(MODULE, BITONIC_KERNEL)
            .ok_or_else(|| RankError::Device(format!("kernel {} not found", BITONIC_KERNEL)))?;

        info!(ordinal, block_size, "CUDA device ready");
        Ok(Self {
            device,
            ordinal,
            block_size,
            distance,
            bitonic,
        })
    }

    fn launch_config(&self, slots: u32) -> LaunchConfig {
        let grid = slots.div_ceil(self.block_size);
        LaunchConfig {
            grid_dim: (grid, 1, 1),
            block_dim: (self.block_size, 1, 1),
            shared_mem_bytes: 0,
        }
    }
}

impl DeviceBackend for CudaDevice {
    type Buffers = CudaBuffers;

    fn name(&self) -> String {
        format!("cuda:{}", self.ordinal)
    }

    fn upload(&self, coords: &[f32], reference: &[f32], indices: &[u32]) -> Result<CudaBuffers> {
        let slots = u32::try_from(indices.len()).map_err(|_| {
            RankError::CapacityExceeded(format!("{} slots exceed the u32 index range", indices.len()))
        })?;

        let coords = self.device.htod_sync_copy(coords).map_err(driver_error("coords copy"))?;
        let reference = self
            .device
            .htod_sync_copy(reference)
            .map_err(driver_error("reference copy"))?;
        let indices = self.device.htod_sync_copy(indices).map_err(driver_error("index copy"))?;
        let keys = self
            .device
            .alloc_zeros::<f32>(slots as usize)
            .map_err(driver_error("key alloc"))?;

        debug!(slots, "Buffers uploaded");
        Ok(CudaBuffers {
            coords,
            reference,
            keys,
            indices,
            slots,
        })
    }

    fn distance_pass(&self, buffers: &mut CudaBuffers, n: u32, dim: u32) -> Result<()> {
        let config = self.launch_config(buffers.slots);
        unsafe {
            self.distance
                .clone()
                .launch(
                    config,
                    (
                        &buffers.coords,
                        &buffers.reference,
                        &mut buffers.keys,
                        n,
                        dim,
                        buffers.slots,
                    ),
                )
                .map_err(driver_error("distance launch"))
        }
    }

    fn bitonic_step(&self, buffers: &mut CudaBuffers, k: u32, j: u32) -> Result<()> {
        let config = self.launch_config(buffers.slots);
        unsafe {
            self.bitonic
                .clone()
                .launch(
                    config,
                    (&mut buffers.keys, &mut buffers.indices, buffers.slots, k, j),
                )
                .map_err(driver_error("bitonic launch"))
        }
    }

    fn synchronize(&self) -> Result<()> {
        self.device.synchronize().map_err(driver_error("synchronize"))
    }

    fn download(&self, buffers: &CudaBuffers) -> Result<(Vec<u32>, Vec<f32>)> {
        let indices = self
            .device
            .dtoh_sync_copy(&buffers.indices)
            .map_err(driver_error("index copy back"))?;
        let keys = self
            .device
            .dtoh_sync_copy(&buffers.keys)
            .map_err(driver_error("key copy back"))?;
        Ok((indices, keys))
    }
}
