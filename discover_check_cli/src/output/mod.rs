//! Rendering of commitment results and drive summaries

mod formatters;

pub use formatters::{JsonFormatter, TextFormatter, verdict_banner};

use anyhow::Result;
use discover_check_core::{CommitmentReport, ValidationSummary};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Result of the single-file `commp` command
#[derive(Debug, Clone, Serialize)]
pub struct CommpResult {
    pub path: PathBuf,
    pub payload_size: u64,
    /// Padded piece size the commitment covers
    pub piece_size: u64,
    pub commp: String,
    pub digest: String,
    pub duplicate: bool,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl CommpResult {
    pub fn new(path: &Path, report: &CommitmentReport) -> Self {
        Self {
            path: path.to_path_buf(),
            payload_size: report.root.size_raw,
            piece_size: report.root.size_stored,
            commp: report
                .root
                .content_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            digest: hex::encode(report.root.digest()),
            duplicate: report.stats.duplicate_root,
            elapsed: report.stats.elapsed,
        }
    }
}

fn as_millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

/// Trait for output formatters
pub trait OutputFormatter: Send + Sync {
    fn format_commp(&self, result: &CommpResult) -> Result<String>;

    fn format_summary(&self, summary: &ValidationSummary) -> Result<String>;
}

/// The formatter for `format`, colored only when `use_color` holds
pub fn formatter(format: OutputFormat, use_color: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter::new(use_color)),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
