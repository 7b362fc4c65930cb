//! Distance Evaluator
//!
//! Writes every point's `distance` key: the squared Euclidean distance to the
//! reference. Each point owns its destination field, so the pass is a plain
//! parallel map with no synchronization.

use crate::distance::squared_euclidean;
use crate::error::{RankError, Result};
use crate::point::{Point, ReferenceVector};
use rayon::prelude::*;
use tracing::debug;

/// Minimum point count for parallel evaluation (below this, sequential is faster)
const PARALLEL_THRESHOLD: usize = 1024;

/// Compute each point's squared distance to `reference`.
///
/// # Errors
///
/// Returns [`RankError::DimensionMismatch`] if any point's dimensionality
/// differs from the reference's. No key is written in that case.
pub fn compute_distances(points: &mut [Point], reference: &ReferenceVector) -> Result<()> {
    let dim = reference.dim();
    if let Some(bad) = points.iter().find(|p| p.dim() != dim) {
        return Err(RankError::DimensionMismatch {
            expected: dim,
            got: bad.dim(),
        });
    }

    let r = reference.as_slice();
    if points.len() >= PARALLEL_THRESHOLD {
        points
            .par_iter_mut()
            .for_each(|p| p.distance = squared_euclidean(p.coords(), r));
    } else {
        points
            .iter_mut()
            .for_each(|p| p.distance = squared_euclidean(p.coords(), r));
    }

    debug!(points = points.len(), dim, "Distances computed");
    Ok(())
}
