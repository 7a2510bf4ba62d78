//! Container structure error types

use thiserror::Error;

/// Structural problems found while walking an archival container
#[derive(Error, Debug)]
pub enum StructureError {
    /// The container header could not be decoded
    #[error("car header parsing failed: {reason}")]
    Header { reason: String },

    /// The header root does not name the expected content
    #[error("car header root CID '{found}' does not match expected CID '{expected}'")]
    RootMismatch { found: String, expected: String },

    /// A section failed to decode
    #[error("car file invalid around block #{index} (byte offset {offset}): {reason}")]
    Block {
        index: usize,
        offset: u64,
        reason: String,
    },

    /// The trailing window could not be read back
    #[error("reading tail of file failed at byte offset {offset}: {reason}")]
    Tail { offset: u64, reason: String },

    /// Bytes remain after the last decodable section
    #[error("expected EOF at byte offset {offset}, but {remaining} trailing byte(s) remain")]
    TrailingBytes { offset: u64, remaining: u64 },
}

impl StructureError {
    /// Create a header error
    pub fn header(reason: impl Into<String>) -> Self {
        Self::Header {
            reason: reason.into(),
        }
    }

    /// Create a block error
    pub fn block(index: usize, offset: u64, reason: impl Into<String>) -> Self {
        Self::Block {
            index,
            offset,
            reason: reason.into(),
        }
    }

    /// Create a tail error
    pub fn tail(offset: u64, reason: impl Into<String>) -> Self {
        Self::Tail {
            offset,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_bytes_display() {
        let error = StructureError::TrailingBytes {
            offset: 1023,
            remaining: 1,
        };
        assert!(error.to_string().contains("1023"));
        assert!(error.to_string().contains("1 trailing"));
    }

    #[test]
    fn test_root_mismatch_display() {
        let error = StructureError::RootMismatch {
            found: "bafyA".to_string(),
            expected: "bafyB".to_string(),
        };
        assert!(error.to_string().contains("bafyA"));
        assert!(error.to_string().contains("bafyB"));
    }
}
