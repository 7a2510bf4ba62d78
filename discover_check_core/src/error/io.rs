//! I/O failures on candidate files, the catalog and the report directory

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// An operating system I/O failure, tied to the file it happened on when known
#[derive(Error, Debug)]
pub struct IoError {
    pub path: Option<PathBuf>,
    #[source]
    pub source: io::Error,
}

impl IoError {
    pub fn from_std(source: io::Error) -> Self {
        Self { path: None, source }
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }

    /// The file vanished between discovery and the check
    pub fn is_missing(&self) -> bool {
        self.kind() == io::ErrorKind::NotFound
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "I/O error on {}: {}", path.display(), self.source),
            None => write!(f, "I/O error: {}", self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let error = IoError::from_std(io::Error::from(io::ErrorKind::NotFound))
            .with_path(Path::new("/mnt/drive/a.car"));

        assert!(error.is_missing());
        assert!(error.to_string().starts_with("I/O error on /mnt/drive/a.car"));
    }

    #[test]
    fn test_short_read_without_path() {
        let error = IoError::from_std(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));

        assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof);
        assert!(!error.is_missing());
        assert_eq!(error.to_string(), "I/O error: short read");
    }
}
