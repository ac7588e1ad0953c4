//! Error types for pyramid construction.

use thiserror::Error;

/// Errors that can occur while building or persisting a pyramid.
#[derive(Error, Debug)]
pub enum PyramidError {
    /// The source store could not be reached or opened.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The dataset has no recognizable spatial dimensions.
    #[error("missing spatial dimensions: {0}")]
    MissingSpatialDims(String),

    /// A CRS is required but has not been attached.
    #[error("no CRS attached to dataset; call attach_crs before building")]
    MissingCrs,

    /// A dimension selection was invalid.
    #[error("invalid selection: {0}")]
    Selection(String),

    /// Regridding a pyramid level failed; the whole build fails.
    #[error("regridding failed at level {level}: {reason}")]
    RegridFailure { level: usize, reason: String },

    /// Writing the pyramid store failed; the store is indeterminate.
    #[error("persist failed: {0}")]
    Persist(String),

    /// Metadata in the source or output store was malformed.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

impl PyramidError {
    /// Create a SourceUnavailable error.
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a MissingSpatialDims error.
    pub fn missing_spatial_dims(msg: impl Into<String>) -> Self {
        Self::MissingSpatialDims(msg.into())
    }

    /// Create a Selection error.
    pub fn selection(msg: impl Into<String>) -> Self {
        Self::Selection(msg.into())
    }

    /// Create a RegridFailure error.
    pub fn regrid_failure(level: usize, reason: impl Into<String>) -> Self {
        Self::RegridFailure {
            level,
            reason: reason.into(),
        }
    }

    /// Create a Persist error.
    pub fn persist(msg: impl Into<String>) -> Self {
        Self::Persist(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

impl From<std::io::Error> for PyramidError {
    fn from(err: std::io::Error) -> Self {
        Self::Persist(err.to_string())
    }
}

impl From<serde_json::Error> for PyramidError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for pyramid operations.
pub type Result<T> = std::result::Result<T, PyramidError>;
