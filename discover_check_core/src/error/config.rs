//! Configuration error types
//!
//! Everything in here is fatal for the whole run: a validator refuses to start
//! when its engine chain cannot be assembled.

use thiserror::Error;

/// Engine and validator configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No chunker registered under the requested name
    #[error("Unknown chunker '{name}'")]
    UnknownChunker { name: String },

    /// No collector registered under the requested name
    #[error("Unknown collector '{name}'")]
    UnknownCollector { name: String },

    /// A chunker or collector rejected its arguments
    #[error("Initialization of '{name}' failed: {}", errors.join("; "))]
    Initialization { name: String, errors: Vec<String> },

    /// Adjacent chunkers declare incompatible size bounds
    #[error(
        "Chunker chain mismatch: '{downstream}' minimum {downstream_min} is below '{upstream}' maximum {upstream_max}"
    )]
    ChainBounds {
        upstream: String,
        upstream_max: usize,
        downstream: String,
        downstream_min: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl ConfigError {
    /// Create an unknown chunker error
    pub fn unknown_chunker(name: &str) -> Self {
        Self::UnknownChunker {
            name: name.to_string(),
        }
    }

    /// Create an unknown collector error
    pub fn unknown_collector(name: &str) -> Self {
        Self::UnknownCollector {
            name: name.to_string(),
        }
    }

    /// Create an initialization error from the plugin's error list
    pub fn initialization(name: &str, errors: Vec<String>) -> Self {
        Self::Initialization {
            name: name.to_string(),
            errors,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_error_joins_messages() {
        let error = ConfigError::initialization(
            "fixed-size",
            vec!["size missing".to_string(), "extra argument".to_string()],
        );
        let display = error.to_string();
        assert!(display.contains("fixed-size"));
        assert!(display.contains("size missing; extra argument"));
    }

    #[test]
    fn test_chain_bounds_error() {
        let error = ConfigError::ChainBounds {
            upstream: "fixed-size_4096".to_string(),
            upstream_max: 4096,
            downstream: "fixed-size_1024".to_string(),
            downstream_min: 1024,
        };
        assert!(error.to_string().contains("4096"));
        assert!(error.to_string().contains("1024"));
    }
}
