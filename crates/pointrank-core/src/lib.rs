//! # Pointrank Core
//!
//! Foundational types for the pointrank ranking engine.
//! This crate provides the error taxonomy and the distance kernel used by
//! both the CPU and GPU ranking backends.

pub mod distance;
pub mod error;

// Re-export primary types
pub use distance::{squared_euclidean, LANES};
pub use error::{ErrorCode, RankError, Result};
