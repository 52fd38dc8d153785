//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container read or open failure.
    #[error("container error: {0}")]
    Container(String),

    /// No child of a data group carries the requested signal number.
    #[error("could not find signal={signal} in {location}")]
    MissingSignal { location: String, signal: i64 },

    /// Unresolvable signal, axis or type layout.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Blocks or requests that do not fit together.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// The container handle has been released.
    #[error("container has been released")]
    Closed,

    /// Instrument table (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] nxsom_core::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl Error {
    pub(crate) fn missing(path: &str) -> Self {
        Self::Container(format!("no such path: {path}"))
    }
}
