//! Discovery of CID-named archives on a mounted drive
//!
//! Every regular file called `<cid>.car` whose CID starts with `bafyr` (a
//! base32 CIDv1 over a DAG-CBOR root) is a candidate. A file that looks like one but carries an undecodable CID aborts
//! the walk: the drive layout itself is broken at that point.

mod filter;
mod walker;

pub use filter::{FileFilter, PatternMatcher};
pub use walker::{CarDiscovery, DiscoveryOptions, discover_cars};

use std::path::PathBuf;

/// Default patterns that are never walked into
pub const DEFAULT_EXCLUDES: &[&str] = &["**/lost+found", "**/lost+found/**"];

/// Prefix every payload CID on a drive carries; other archives are not ours
pub const CID_PREFIX: &str = "bafyr";

/// Error type for file discovery operations
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Undecodable CID '{name}' at {path}: {source}")]
    UndecodableCid {
        name: String,
        path: PathBuf,
        #[source]
        source: cid::Error,
    },
}

/// Result type for file discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
