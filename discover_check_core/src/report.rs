//! Report naming and storage

use crate::validator::ValidationSummary;
use crate::{Result, error::InternalError, error::IoError};
use log::info;
use std::path::{Path, PathBuf};

/// Destination for a finished drive report
pub trait ReportSink: Send + Sync {
    /// Store the summary under `name`; returns where it went
    fn submit(&self, name: &str, summary: &ValidationSummary) -> Result<String>;
}

/// `<UTC timestamp>_<drive>_<flawless>_<hard>_<soft>.json`
pub fn report_name(summary: &ValidationSummary) -> String {
    let drive: String = summary
        .drive_identifier
        .chars()
        .map(|c| if c == '/' || c.is_whitespace() { '_' } else { c })
        .collect();
    format!(
        "{}_{}_{:04}_{:04}_{:04}.json",
        summary.validation_finish.format("%Y%m%dT%H%M%SZ"),
        drive,
        summary.flawless,
        summary.hard_failures,
        summary.soft_failures
    )
}

/// Writes pretty-printed JSON reports into a directory
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    directory: PathBuf,
}

impl JsonFileSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl ReportSink for JsonFileSink {
    fn submit(&self, name: &str, summary: &ValidationSummary) -> Result<String> {
        std::fs::create_dir_all(&self.directory)
            .map_err(|e| IoError::from_std(e).with_path(&self.directory))?;

        let json = serde_json::to_vec_pretty(summary).map_err(|e| {
            InternalError::assertion(format!("report encoding failed: {e}"))
        })?;
        let path = self.directory.join(name);
        std::fs::write(&path, json).map_err(|e| IoError::from_std(e).with_path(&path))?;

        info!("report stored at {}", path.display());
        Ok(path.display().to_string())
    }
}
