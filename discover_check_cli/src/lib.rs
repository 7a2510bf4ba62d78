//! Library half of the `discover-check` binary
//!
//! Everything except argument parsing lives here so integration tests can
//! drive the same code paths.

pub mod config;
pub mod drive;
pub mod error;
pub mod file_discovery;
pub mod orchestrators;
pub mod output;
pub mod paths;
pub mod progress;
pub mod terminal;
