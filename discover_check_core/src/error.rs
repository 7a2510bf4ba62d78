//! Error types for the drive validation core
//!
//! This module contains all error types used throughout the library, organized
//! into logical categories matching how the validator treats them.

use thiserror::Error;

pub mod config;
pub mod internal;
pub mod io;
pub mod structure;

pub use self::config::ConfigError;
pub use self::io::IoError;
pub use self::structure::StructureError;
pub use internal::InternalError;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the drive validation core
///
/// Errors are categorized into four main types:
/// - Configuration errors: fatal at startup, never per-file
/// - I/O errors: open/read/seek failures on a candidate file
/// - Structure errors: malformed archival containers
/// - Internal errors: engine misuse and broken invariants
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O related errors
    #[error(transparent)]
    Io(#[from] IoError),

    /// Container structure errors
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// Internal library errors
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl Error {
    /// Whether this error must abort the whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io(IoError::from_std(source))
    }
}
