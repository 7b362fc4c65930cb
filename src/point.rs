//! Points, datasets and the reference vector.
//!
//! A [`Dataset`] is created once by the loader, has its distance keys written
//! by a ranking backend, and is then physically reordered in place. Every
//! point in a dataset has the same dimensionality.

use crate::error::{RankError, Result};
use serde::{Deserialize, Serialize};

/// A fixed-dimension coordinate sequence plus its ranking key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    coords: Vec<f32>,
    /// Squared distance to the reference, written by a ranker.
    pub distance: f32,
}

impl Point {
    /// Create a point from coordinates with a zero distance key.
    pub fn new(coords: Vec<f32>) -> Self {
        Self {
            coords,
            distance: 0.0,
        }
    }

    /// Create a point of `dim` zeroed coordinates.
    pub fn zeroed(dim: usize) -> Self {
        Self::new(vec![0.0; dim])
    }

    /// The point's coordinates.
    #[inline]
    pub fn coords(&self) -> &[f32] {
        &self.coords
    }

    /// Dimensionality of this point.
    #[inline]
    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    /// Writable coordinates, used only while loading.
    #[inline]
    pub(crate) fn coords_mut(&mut self) -> &mut [f32] {
        &mut self.coords
    }
}

/// An ordered collection of N points of dimensionality D.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    points: Vec<Point>,
    dim: usize,
}

impl Dataset {
    /// Build a dataset, checking that every point has dimensionality `dim`.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::DimensionMismatch`] for the first point whose
    /// length differs from `dim`.
    pub fn from_points(points: Vec<Point>, dim: usize) -> Result<Self> {
        if let Some(bad) = points.iter().find(|p| p.dim() != dim) {
            return Err(RankError::DimensionMismatch {
                expected: dim,
                got: bad.dim(),
            });
        }
        Ok(Self { points, dim })
    }

    /// Build a dataset from raw coordinate rows.
    ///
    /// The dimensionality is taken from the first row; an empty input gives
    /// an empty dataset with `dim == 0`.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        Self::from_points(rows.into_iter().map(Point::new).collect(), dim)
    }

    pub(crate) fn from_parts_unchecked(points: Vec<Point>, dim: usize) -> Self {
        Self { points, dim }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the dataset has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Dimensionality shared by every point.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Points in their current order.
    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Mutable access to the points. Rankers write keys and reorder through this.
    #[inline]
    pub fn points_mut(&mut self) -> &mut [Point] {
        &mut self.points
    }

    /// Hand the point buffer to `reorder` and keep what it returns.
    ///
    /// The returned buffer must hold as many points as the dataset had. The
    /// dataset is left empty if `reorder` fails, so callers validate first.
    pub(crate) fn reorder_with<F>(&mut self, reorder: F) -> Result<()>
    where
        F: FnOnce(Vec<Point>) -> Result<Vec<Point>>,
    {
        let n = self.points.len();
        let points = reorder(std::mem::take(&mut self.points))?;
        if points.len() != n {
            return Err(RankError::InvalidState(format!(
                "reordered buffer has {} points, dataset had {}",
                points.len(),
                n
            )));
        }
        self.points = points;
        Ok(())
    }

    /// Take ownership of the point buffer.
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    /// Distance of the first point (the closest, once ranked).
    pub fn closest(&self) -> Option<f32> {
        self.points.first().map(|p| p.distance)
    }

    /// Distance of the last point (the farthest, once ranked).
    pub fn farthest(&self) -> Option<f32> {
        self.points.last().map(|p| p.distance)
    }

    /// The distance keys in current order.
    pub fn distances(&self) -> Vec<f32> {
        self.points.iter().map(|p| p.distance).collect()
    }

    /// Whether the distance keys are non-decreasing.
    pub fn is_ranked(&self) -> bool {
        self.points
            .windows(2)
            .all(|w| w[0].distance.total_cmp(&w[1].distance).is_le())
    }
}

/// The point every distance is measured against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceVector(Vec<f32>);

impl ReferenceVector {
    /// The origin in `dim` dimensions.
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    /// Use `components` as given, zero-padding up to `dim`.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::DimensionMismatch`] if more than `dim` components are given.
    pub fn from_components(mut components: Vec<f32>, dim: usize) -> Result<Self> {
        if components.len() > dim {
            return Err(RankError::DimensionMismatch {
                expected: dim,
                got: components.len(),
            });
        }
        components.resize(dim, 0.0);
        Ok(Self(components))
    }

    /// Parse a comma-separated list of floats such as `"1.5, -2,0"`.
    ///
    /// Missing trailing components default to zero. An empty string is the
    /// origin, and a single trailing comma is ignored.
    ///
    /// # Errors
    ///
    /// - [`RankError::InvalidArgument`] if a component is not a valid float
    /// - [`RankError::DimensionMismatch`] if more than `dim` components are given
    pub fn parse(text: &str, dim: usize) -> Result<Self> {
        Self::from_components(Self::parse_components(text)?, dim)
    }

    /// Parse the components of a reference without fixing its length.
    pub fn parse_components(text: &str) -> Result<Vec<f32>> {
        let text = text.trim();
        let text = text.strip_suffix(',').unwrap_or(text);
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        text.split(',')
            .map(str::trim)
            .enumerate()
            .map(|(i, token)| {
                token.parse::<f32>().map_err(|_| {
                    RankError::InvalidArgument(format!(
                        "reference component {} ('{}') is not a valid float",
                        i + 1,
                        token
                    ))
                })
            })
            .collect()
    }

    /// The coordinates, exactly `dim` long.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Dimensionality of the reference.
    #[inline]
    pub fn dim(&self) -> usize {
        self.0.len()
    }
}
