//! Error Types and Handling
//!
//! Every failure the ranking engine can report, with structured error codes
//! for programmatic handling.
//!
//! # Error Categories
//!
//! | Range | Category | Examples |
//! |-------|----------|----------|
//! | 1xxx | I/O | Read, Permission |
//! | 2xxx | Input format | MalformedRecord, InvalidToken |
//! | 4xxx | Vector | DimensionMismatch |
//! | 7xxx | Configuration | InvalidConfig, InvalidArgument |
//! | 8xxx | Resource | CapacityExceeded |
//! | 13xxx | State | InvalidState |
//! | 14xxx | Device | Device |
//!
//! # Example
//!
//! ```rust
//! use pointrank_core::error::{RankError, Result};
//!
//! fn check(found: usize) -> Result<()> {
//!     if found < 3 {
//!         return Err(RankError::MalformedRecord { line: 7, expected: 3, found });
//!     }
//!     Ok(())
//! }
//!
//! let err = check(2).unwrap_err();
//! assert_eq!(err.error_code().code(), 2001);
//! assert_eq!(err.error_code().category(), "Input format");
//! ```

use thiserror::Error;

/// Error code categories for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Failed to open or read a file
    IoRead = 1001,
    /// Insufficient file system permissions
    IoPermission = 1003,
    /// Failed to write a file
    IoWrite = 1002,

    /// A record does not hold exactly D coordinates
    MalformedRecord = 2001,
    /// A coordinate token is not a valid 32-bit float
    InvalidToken = 2002,
    /// The first record carries no coordinates, so D cannot be inferred
    EmptyFirstRecord = 2003,

    /// Vector dimensions do not match the dataset
    DimensionMismatch = 4003,

    /// Configuration value is invalid
    InvalidConfig = 7001,
    /// Command-line or API argument is invalid
    InvalidArgument = 7003,

    /// Dataset is too large for the selected backend
    CapacityExceeded = 8001,

    /// Internal bookkeeping found an impossible state
    InvalidState = 13002,

    /// Device allocation, launch, transfer or synchronization failed
    DeviceFailure = 14001,
}

impl ErrorCode {
    /// Get the numeric error code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a brief description of the error category
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::IoRead | ErrorCode::IoWrite | ErrorCode::IoPermission => "I/O",
            ErrorCode::MalformedRecord | ErrorCode::InvalidToken | ErrorCode::EmptyFirstRecord => {
                "Input format"
            }
            ErrorCode::DimensionMismatch => "Vector",
            ErrorCode::InvalidConfig | ErrorCode::InvalidArgument => "Configuration",
            ErrorCode::CapacityExceeded => "Resource",
            ErrorCode::InvalidState => "State",
            ErrorCode::DeviceFailure => "Device",
        }
    }
}

/// Error types for loading and ranking operations
#[must_use]
#[derive(Error, Debug)]
pub enum RankError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: expected {expected} coordinates, found {found}")]
    MalformedRecord {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}: '{token}' is not a valid f32")]
    InvalidToken { line: usize, token: String },

    #[error("First record contains no coordinates")]
    EmptyFirstRecord,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Device error: {0}")]
    Device(String),
}

impl RankError {
    /// Get the error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            RankError::Io(source) => match source.kind() {
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                std::io::ErrorKind::WriteZero => ErrorCode::IoWrite,
                _ => ErrorCode::IoRead,
            },
            RankError::MalformedRecord { .. } => ErrorCode::MalformedRecord,
            RankError::InvalidToken { .. } => ErrorCode::InvalidToken,
            RankError::EmptyFirstRecord => ErrorCode::EmptyFirstRecord,
            RankError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            RankError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            RankError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            RankError::CapacityExceeded(_) => ErrorCode::CapacityExceeded,
            RankError::InvalidState(_) => ErrorCode::InvalidState,
            RankError::Device(_) => ErrorCode::DeviceFailure,
        }
    }

    /// One actionable sentence for the user, if there is one.
    pub fn hint(&self) -> Option<String> {
        match self {
            RankError::Io(source) => match source.kind() {
                std::io::ErrorKind::NotFound => {
                    Some("Check the dataset path spelling and that the file exists".to_string())
                }
                std::io::ErrorKind::PermissionDenied => {
                    Some("Ensure the process has read access to the dataset".to_string())
                }
                _ => None,
            },
            RankError::MalformedRecord { expected, .. } => Some(format!(
                "Every line must hold exactly {} whitespace-separated values (the count on the first line)",
                expected
            )),
            RankError::InvalidToken { .. } => {
                Some("Coordinates must be plain decimal numbers such as -12.5000".to_string())
            }
            RankError::EmptyFirstRecord => {
                Some("Remove leading blank lines from the dataset".to_string())
            }
            RankError::DimensionMismatch { expected, .. } => Some(format!(
                "Give at most {} comma-separated components for the reference point",
                expected
            )),
            RankError::CapacityExceeded(_) => {
                Some("Use the cpu backend for datasets of this size".to_string())
            }
            RankError::Device(_) => Some(
                "Run with --device host to use the thread-pool device instead".to_string(),
            ),
            RankError::InvalidConfig(_) | RankError::InvalidArgument(_) | RankError::InvalidState(_) => {
                None
            }
        }
    }
}

/// Result type alias for ranking operations
pub type Result<T> = std::result::Result<T, RankError>;
