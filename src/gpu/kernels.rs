//! Index-domain kernels shared by every device.
//!
//! Each kernel is a pure function of a slot index and the buffers it reads,
//! writing only to slots it owns. The CUDA source in `cuda.rs` implements the
//! same contracts; [`HostDevice`](super::HostDevice) maps them over a rayon pool.

use crate::distance::squared_euclidean;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Key of slot `i`: the squared distance of point `i` to `reference`, or
/// `+inf` for a padding slot (`i >= n`).
///
/// `coords` is row-major with `reference.len()` values per point.
#[inline]
pub fn distance_slot(i: usize, coords: &[f32], reference: &[f32], n: usize) -> f32 {
    if i >= n {
        return f32::INFINITY;
    }
    let dim = reference.len();
    squared_euclidean(&coords[i * dim..(i + 1) * dim], reference)
}

/// Whether slot `i` belongs to an ascending run in major stage `k`.
#[inline]
pub fn ascending(i: usize, k: usize) -> bool {
    i & k == 0
}

/// Total order on `(key, index)` pairs: key first, index on ties.
#[inline]
pub fn slot_order(a: (f32, u32), b: (f32, u32)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// Compare-exchange of a lower slot with its partner `lower ^ j`.
///
/// Swaps both keys and payloads when the pair is out of order for the run direction.
#[inline]
pub fn compare_exchange(
    ascending: bool,
    lo_key: &mut f32,
    hi_key: &mut f32,
    lo_index: &mut u32,
    hi_index: &mut u32,
) {
    let order = slot_order((*lo_key, *lo_index), (*hi_key, *hi_index));
    let swap = if ascending {
        order.is_gt()
    } else {
        order.is_lt()
    };
    if swap {
        std::mem::swap(lo_key, hi_key);
        std::mem::swap(lo_index, hi_index);
    }
}

/// One `(k, j)` pass of the bitonic network over all slots.
///
/// Slots are visited as blocks of `2j`: the lower half of a block holds
/// exactly the slots whose partner `i ^ j` is larger, and since `k >= 2j`
/// the run direction is constant inside a block. Blocks are disjoint, so
/// they run in parallel without synchronization.
pub fn bitonic_pass(keys: &mut [f32], indices: &mut [u32], k: usize, j: usize) {
    debug_assert!(keys.len().is_power_of_two());
    debug_assert_eq!(keys.len(), indices.len());
    debug_assert!(j >= 1 && k >= 2 * j);

    let block = 2 * j;
    keys.par_chunks_mut(block)
        .zip(indices.par_chunks_mut(block))
        .enumerate()
        .for_each(|(b, (key_block, index_block))| {
            let up = ascending(b * block, k);
            let (lo_keys, hi_keys) = key_block.split_at_mut(j);
            let (lo_indices, hi_indices) = index_block.split_at_mut(j);
            for t in 0..j {
                compare_exchange(
                    up,
                    &mut lo_keys[t],
                    &mut hi_keys[t],
                    &mut lo_indices[t],
                    &mut hi_indices[t],
                );
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straight per-slot rendition of the device kernel: thread `i` acts only
    /// when it is the lower slot of its pair.
    fn reference_pass(keys: &mut [f32], indices: &mut [u32], k: usize, j: usize) {
        for i in 0..keys.len() {
            let partner = i ^ j;
            if partner <= i {
                continue;
            }
            let (mut ki, mut kp) = (keys[i], keys[partner]);
            let (mut ii, mut ip) = (indices[i], indices[partner]);
            compare_exchange(ascending(i, k), &mut ki, &mut kp, &mut ii, &mut ip);
            keys[i] = ki;
            keys[partner] = kp;
            indices[i] = ii;
            indices[partner] = ip;
        }
    }

    fn full_network(keys: &mut [f32], indices: &mut [u32], pass: fn(&mut [f32], &mut [u32], usize, usize)) {
        let m = keys.len();
        let mut k = 2;
        while k <= m {
            let mut j = k / 2;
            while j > 0 {
                pass(keys, indices, k, j);
                j /= 2;
            }
            k *= 2;
        }
    }

    #[test]
    fn test_distance_slot_padding_is_infinite() {
        let coords = [3.0, 4.0, 1.0, 1.0];
        let reference = [0.0, 0.0];
        assert_eq!(distance_slot(0, &coords, &reference, 2), 25.0);
        assert_eq!(distance_slot(1, &coords, &reference, 2), 2.0);
        assert_eq!(distance_slot(2, &coords, &reference, 2), f32::INFINITY);
        assert_eq!(distance_slot(3, &coords, &reference, 2), f32::INFINITY);
    }

    #[test]
    fn test_block_pass_matches_per_slot_kernel() {
        let keys: Vec<f32> = (0..64).map(|i| ((i * 37) % 17) as f32).collect();
        let indices: Vec<u32> = (0..64).collect();

        let (mut k1, mut i1) = (keys.clone(), indices.clone());
        let (mut k2, mut i2) = (keys, indices);
        full_network(&mut k1, &mut i1, bitonic_pass);
        full_network(&mut k2, &mut i2, reference_pass);

        assert_eq!(k1, k2);
        assert_eq!(i1, i2);
    }

    #[test]
    fn test_network_sorts_with_index_tie_break() {
        let mut keys: Vec<f32> = (0..128).map(|i| ((i * 7) % 5) as f32).collect();
        let mut indices: Vec<u32> = (0..128).collect();
        full_network(&mut keys, &mut indices, bitonic_pass);

        for w in 0..127 {
            let a = (keys[w], indices[w]);
            let b = (keys[w + 1], indices[w + 1]);
            assert!(slot_order(a, b).is_lt(), "slot {} out of order", w);
        }
    }

    #[test]
    fn test_compare_exchange_directions() {
        let (mut a, mut b, mut ia, mut ib) = (5.0, 1.0, 0, 1);
        compare_exchange(true, &mut a, &mut b, &mut ia, &mut ib);
        assert_eq!((a, b, ia, ib), (1.0, 5.0, 1, 0));

        compare_exchange(false, &mut a, &mut b, &mut ia, &mut ib);
        assert_eq!((a, b, ia, ib), (5.0, 1.0, 0, 1));

        let (mut a, mut b, mut ia, mut ib) = (2.0, 2.0, 9, 3);
        compare_exchange(true, &mut a, &mut b, &mut ia, &mut ib);
        assert_eq!((ia, ib), (3, 9));
    }
}
