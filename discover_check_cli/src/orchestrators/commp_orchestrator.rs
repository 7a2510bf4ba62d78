//! Single-file commitment
//!
//! Runs one engine pass over a file with the configured chain, the same pass
//! the validator makes for every known archive.

use crate::output::CommpResult;
use crate::progress::{create_progress_infrastructure, render_progress};
use anyhow::{Context, Result};
use discover_check_core::{EngineConfig, ProgressProvider, commitment_of_file};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct CommpOrchestrator {
    engine: EngineConfig,
    show_progress: bool,
}

impl CommpOrchestrator {
    pub fn new(engine: EngineConfig, show_progress: bool) -> Self {
        Self {
            engine,
            show_progress,
        }
    }

    pub async fn run(&self, path: &Path) -> Result<CommpResult> {
        if !path.is_file() {
            anyhow::bail!("Not a regular file: {}", path.display());
        }

        let (progress, render_task) = if self.show_progress {
            let (provider, rx) = create_progress_infrastructure();
            (provider, Some(tokio::spawn(render_progress(rx))))
        } else {
            (<dyn ProgressProvider>::null(), None)
        };

        let file: PathBuf = path.to_path_buf();
        let engine = self.engine.clone();
        let reporter = Arc::clone(&progress);
        let report = tokio::task::spawn_blocking(move || {
            commitment_of_file(&file, &engine, None, reporter)
        })
        .await
        .context("Commitment task panicked")?;

        progress.complete();
        if let Some(task) = render_task {
            let _ = task.await;
        }

        let report =
            report.with_context(|| format!("commP calculation failed for {}", path.display()))?;
        debug!(
            "{}: {} bytes in {} chunks, {} blocks",
            path.display(),
            report.stats.bytes_seen,
            report.stats.chunks_emitted,
            report.stats.blocks_produced
        );
        Ok(CommpResult::new(path, &report))
    }
}
