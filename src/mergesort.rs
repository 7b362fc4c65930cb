//! CPU Ranker: fork-join parallel merge sort keyed by `distance`.
//!
//! - One scratch buffer of dataset size is allocated per sort call and shared
//!   by every merge in the recursion. It is filled in parallel before the sort
//!   starts, so each worker first-touches the pages it will later merge into.
//! - Ranges shorter than the grain size are sorted sequentially; longer ranges
//!   split at the midpoint, sort both halves as `rayon::join` tasks, then merge.
//! - A merge moves points into the matching scratch range and swaps the range
//!   back. Points are relocated, never cloned.
//!
//! The sort is stable: ties keep their relative order from the start of the
//! call, which matches the GPU network's tie-break on the slot index.

use crate::point::Point;
use rayon::prelude::*;
use std::cmp::Ordering;
use tracing::debug;

/// Shape of the task tree built by one sort call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortStats {
    /// Grain size used for this call
    pub grain: usize,
    /// Depth of the fork-join tree (0 when the whole input was a leaf)
    pub depth: usize,
    /// Number of sequentially sorted leaves
    pub leaves: usize,
}

#[inline]
fn by_distance(a: &Point, b: &Point) -> Ordering {
    a.distance.total_cmp(&b.distance)
}

/// Sort `points` ascending by `distance` with the given grain size.
pub fn parallel_merge_sort(points: &mut [Point], grain: usize) -> SortStats {
    let n = points.len();
    let grain = grain.max(2);
    if n <= 1 {
        return SortStats {
            grain,
            depth: 0,
            leaves: n,
        };
    }

    let mut scratch: Vec<Point> = Vec::with_capacity(n);
    scratch.par_extend((0..n).into_par_iter().map(|_| Point::default()));

    let (depth, leaves) = sort_range(points, &mut scratch, grain);
    debug!(n, grain, depth, leaves, "Merge sort finished");
    SortStats {
        grain,
        depth,
        leaves,
    }
}

/// Returns `(depth, leaves)` of the subtree rooted at this range.
fn sort_range(points: &mut [Point], scratch: &mut [Point], grain: usize) -> (usize, usize) {
    let len = points.len();
    if len < grain {
        points.sort_by(by_distance);
        return (0, 1);
    }

    let mid = len / 2;
    let ((left_depth, left_leaves), (right_depth, right_leaves)) = {
        let (points_left, points_right) = points.split_at_mut(mid);
        let (scratch_left, scratch_right) = scratch.split_at_mut(mid);
        rayon::join(
            || sort_range(points_left, scratch_left, grain),
            || sort_range(points_right, scratch_right, grain),
        )
    };

    merge(points, scratch, mid);
    (left_depth.max(right_depth) + 1, left_leaves + right_leaves)
}

/// Merge the sorted runs `points[..mid]` and `points[mid..]` through `scratch`.
fn merge(points: &mut [Point], scratch: &mut [Point], mid: usize) {
    debug_assert_eq!(points.len(), scratch.len());
    {
        let (left, right) = points.split_at_mut(mid);
        let (mut i, mut j) = (0, 0);
        for slot in scratch.iter_mut() {
            let take_right =
                i >= left.len() || (j < right.len() && by_distance(&right[j], &left[i]).is_lt());
            if take_right {
                std::mem::swap(slot, &mut right[j]);
                j += 1;
            } else {
                std::mem::swap(slot, &mut left[i]);
                i += 1;
            }
        }
    }
    points.swap_with_slice(scratch);
}
