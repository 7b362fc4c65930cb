//! Thread-pool device: runs the index-domain kernels on the current rayon pool.
//!
//! Used when no CUDA device is present. "Device memory" is a set of host
//! vectors owned by [`HostBuffers`]; transfers are copies. Each pass completes
//! before its call returns, so [`synchronize`](DeviceBackend::synchronize) has
//! nothing to wait for.

use super::kernels::{bitonic_pass, distance_slot};
use super::DeviceBackend;
use crate::error::{RankError, Result};
use rayon::prelude::*;

/// The rayon-backed device.
#[derive(Debug, Clone, Default)]
pub struct HostDevice;

impl HostDevice {
    /// Create a host device.
    pub fn new() -> Self {
        Self
    }
}

/// Buffers "resident" on a [`HostDevice`].
#[derive(Debug)]
pub struct HostBuffers {
    coords: Vec<f32>,
    reference: Vec<f32>,
    keys: Vec<f32>,
    indices: Vec<u32>,
}

impl DeviceBackend for HostDevice {
    type Buffers = HostBuffers;

    fn name(&self) -> String {
        format!("host ({} workers)", rayon::current_num_threads())
    }

    fn upload(&self, coords: &[f32], reference: &[f32], indices: &[u32]) -> Result<HostBuffers> {
        Ok(HostBuffers {
            coords: coords.to_vec(),
            reference: reference.to_vec(),
            keys: vec![0.0; indices.len()],
            indices: indices.to_vec(),
        })
    }

    fn distance_pass(&self, buffers: &mut HostBuffers, n: u32, dim: u32) -> Result<()> {
        let (n, dim) = (n as usize, dim as usize);
        if buffers.reference.len() != dim
            || buffers.coords.len() != n * dim
            || n > buffers.keys.len()
        {
            return Err(RankError::InvalidState(format!(
                "distance pass over {} points of {} dims does not match uploaded buffers",
                n, dim
            )));
        }

        let coords = buffers.coords.as_slice();
        let reference = buffers.reference.as_slice();
        buffers
            .keys
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, key)| *key = distance_slot(i, coords, reference, n));
        Ok(())
    }

    fn bitonic_step(&self, buffers: &mut HostBuffers, k: u32, j: u32) -> Result<()> {
        let (k, j) = (k as usize, j as usize);
        if j == 0 || k < 2 * j || k > buffers.keys.len() {
            return Err(RankError::InvalidState(format!(
                "invalid bitonic step k={} j={} over {} slots",
                k,
                j,
                buffers.keys.len()
            )));
        }
        bitonic_pass(&mut buffers.keys, &mut buffers.indices, k, j);
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    fn download(&self, buffers: &HostBuffers) -> Result<(Vec<u32>, Vec<f32>)> {
        Ok((buffers.indices.clone(), buffers.keys.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_pass_pads_with_infinity() {
        let device = HostDevice::new();
        let coords = [0.0, 0.0, 3.0, 4.0, 1.0, 1.0];
        let indices: Vec<u32> = (0..4).collect();
        let mut buffers = device.upload(&coords, &[0.0, 0.0], &indices).unwrap();

        device.distance_pass(&mut buffers, 3, 2).unwrap();
        let (_, keys) = device.download(&buffers).unwrap();
        assert_eq!(keys, vec![0.0, 25.0, 2.0, f32::INFINITY]);
    }

    #[test]
    fn test_distance_pass_rejects_mismatched_shape() {
        let device = HostDevice::new();
        let mut buffers = device.upload(&[1.0, 2.0], &[0.0, 0.0], &[0]).unwrap();
        assert!(device.distance_pass(&mut buffers, 2, 2).is_err());
    }

    #[test]
    fn test_bitonic_step_rejects_bad_stage() {
        let device = HostDevice::new();
        let mut buffers = device.upload(&[], &[], &[0, 1, 2, 3]).unwrap();
        assert!(device.bitonic_step(&mut buffers, 2, 2).is_err());
        assert!(device.bitonic_step(&mut buffers, 8, 1).is_err());
        assert!(device.bitonic_step(&mut buffers, 4, 2).is_ok());
    }
}
