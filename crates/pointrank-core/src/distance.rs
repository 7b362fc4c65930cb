//! Squared Euclidean distance, the ranking key.
//!
//! Sorting by squared distance gives the same order as sorting by distance,
//! and skips a square root per point.
//!
//! The accumulation order is part of the contract: eight independent lanes
//! over `chunks_exact(LANES)`, lanes folded pairwise, then the remainder added
//! left to right. The device kernel in `pointrank::gpu` reproduces the same
//! order with FMA contraction disabled, so both backends produce identical
//! keys for identical input.
//!
//! A NaN result is returned as the canonical positive quiet NaN
//! (`0x7fc0_0000`), whatever sign the hardware produced, so NaN keys sort
//! after every number under total ordering on every device.
//!
//! ```
//! use pointrank_core::distance::squared_euclidean;
//!
//! let d = squared_euclidean(&[3.0, 4.0], &[0.0, 0.0]);
//! assert_eq!(d, 25.0);
//! ```

/// Accumulator lanes used by [`squared_euclidean`].
pub const LANES: usize = 8;

/// Compute the squared Euclidean distance between `a` and `b`.
///
/// # Panics
/// Panics if `a` and `b` have different lengths.
#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "vectors must have equal length for euclidean distance");

    let chunks_a = a.chunks_exact(LANES);
    let chunks_b = b.chunks_exact(LANES);
    let rem_a = chunks_a.remainder();
    let rem_b = chunks_b.remainder();

    let mut acc = [0.0f32; LANES];
    for (xa, xb) in chunks_a.zip(chunks_b) {
        for lane in 0..LANES {
            let diff = xa[lane] - xb[lane];
            acc[lane] += diff * diff;
        }
    }

    let mut sum = ((acc[0] + acc[1]) + (acc[2] + acc[3])) + ((acc[4] + acc[5]) + (acc[6] + acc[7]));
    for (x, y) in rem_a.iter().zip(rem_b) {
        let diff = x - y;
        sum += diff * diff;
    }
    if sum.is_nan() {
        f32::NAN
    } else {
        sum
    }
}
