//! Internal library error types

use thiserror::Error;

/// Internal library errors
#[derive(Error, Debug)]
pub enum InternalError {
    /// Commitment calculation error
    #[error("Commitment calculation failed for collector '{collector}': {message}")]
    Commitment { collector: String, message: String },

    /// The engine was used outside its single-pass lifecycle
    #[error("Engine lifecycle violation: {message}")]
    Lifecycle { message: String },

    /// A chunker produced a chunk outside its declared bounds
    #[error("Chunker '{chunker}' violated its size bounds: {message}")]
    ChunkBounds { chunker: String, message: String },

    /// Async hasher worker pool failure
    #[error("Hasher pool error: {message}")]
    HasherPool { message: String },

    /// Internal assertion failure
    #[error("Internal assertion failed: {message}")]
    Assertion { message: String },
}

impl InternalError {
    /// Create a commitment calculation error
    pub fn commitment(collector: &str, message: impl Into<String>) -> Self {
        Self::Commitment {
            collector: collector.to_string(),
            message: message.into(),
        }
    }

    /// Create a lifecycle violation error
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: message.into(),
        }
    }

    /// Create a chunk bound violation error
    pub fn chunk_bounds(chunker: &str, message: impl Into<String>) -> Self {
        Self::ChunkBounds {
            chunker: chunker.to_string(),
            message: message.into(),
        }
    }

    /// Create a hasher pool error
    pub fn hasher_pool(message: impl Into<String>) -> Self {
        Self::HasherPool {
            message: message.into(),
        }
    }

    /// Create an internal assertion failure error
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }
}
