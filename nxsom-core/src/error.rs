//! Error types for nxsom-core.

use crate::spectrum::DatasetType;
use thiserror::Error;

/// Result type alias for nxsom operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for nxsom operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Lookup into a backing array outside its bounds.
    #[error("index out of range: {index} (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Malformed pixel identifier.
    #[error("invalid pixel id: {0}")]
    InvalidPixelId(String),

    /// Data extent and variable-axis length do not describe a histogram or a density.
    #[error("inconsistent dataset dimensions: extent {extent}, axis length {axis_len}")]
    InconsistentDimensions { extent: usize, axis_len: usize },

    /// Two blocks of one collection disagree on their dataset type.
    #[error("cannot combine {first} and {second} blocks in one collection")]
    MixedDatasetTypes {
        first: DatasetType,
        second: DatasetType,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
