//! Progress rendering for the CLI
//!
//! One overall bar counts handled files; each running check gets its own byte
//! bar that disappears once the check finishes.

use super::utils::{format_bytes, format_duration, format_file_count};
use colored::*;
use discover_check_core::progress::{CheckKind, ProgressUpdate};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::warn;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const FILE_TEMPLATE: &str =
    "{prefix:>9.yellow} {wide_msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec}";
const BATCH_TEMPLATE: &str = "{msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} files | {percent}% | ETA {eta}";

/// Drain `rx` until every sender is gone, then print the totals
pub async fn render_progress(mut rx: mpsc::Receiver<ProgressUpdate>) {
    let mut renderer = ProgressRenderer::new();

    while let Some(update) = rx.recv().await {
        renderer.handle_update(update);
    }

    renderer.finish();
}

/// Wait for a spawned [`render_progress`] task; `false` if it panicked or was cancelled
pub async fn finish_rendering(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Progress renderer failed: {e}");
            false
        }
    }
}

pub struct ProgressRenderer {
    multi: MultiProgress,
    file_bars: HashMap<(PathBuf, &'static str), ProgressBar>,
    batch_bar: Option<ProgressBar>,
    bytes_checked: u64,
    failed_checks: usize,
    start_time: Instant,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            file_bars: HashMap::new(),
            batch_bar: None,
            bytes_checked: 0,
            failed_checks: 0,
            start_time: Instant::now(),
        }
    }

    pub fn handle_update(&mut self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::FileProgress {
                path,
                check,
                bytes_processed,
                total_bytes,
            } => self.update_file_progress(path, check, bytes_processed, total_bytes),

            ProgressUpdate::CheckFinished {
                path,
                check,
                passed,
            } => self.finish_check(&path, check, passed),

            ProgressUpdate::BatchProgress {
                current,
                total,
                current_file,
            } => self.update_batch_progress(current, total, current_file),

            ProgressUpdate::Status { message } => self.show_status(&message),
        }
    }

    /// Checks reported as failed so far
    pub fn failed_checks(&self) -> usize {
        self.failed_checks
    }

    fn update_file_progress(
        &mut self,
        path: PathBuf,
        check: CheckKind,
        bytes_processed: u64,
        total_bytes: u64,
    ) {
        let multi = &self.multi;
        let pb = self
            .file_bars
            .entry((path, check.label()))
            .or_insert_with_key(|(path, label)| {
                let pb = multi.add(ProgressBar::new(total_bytes));
                if let Ok(style) = ProgressStyle::default_bar().template(FILE_TEMPLATE) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb.set_prefix(*label);
                pb.set_message(display_name(path).cyan().to_string());
                pb
            });

        pb.set_position(bytes_processed);
    }

    fn finish_check(&mut self, path: &Path, check: CheckKind, passed: bool) {
        if let Some(pb) = self.file_bars.remove(&(path.to_path_buf(), check.label())) {
            if check == CheckKind::Commitment {
                self.bytes_checked += pb.position();
            }
            pb.finish_and_clear();
            self.multi.remove(&pb);
        }

        if !passed {
            self.failed_checks += 1;
            let line = format!(
                "{} {} check failed: {}",
                "✗".red(),
                check.label(),
                display_name(path)
            );
            let _ = self.multi.println(line);
        }
    }

    fn update_batch_progress(&mut self, current: usize, total: usize, current_file: Option<String>) {
        let multi = &self.multi;
        let bar = self.batch_bar.get_or_insert_with(|| {
            let bar = multi.insert(0, ProgressBar::new(total as u64));
            if let Ok(style) = ProgressStyle::default_bar().template(BATCH_TEMPLATE) {
                bar.set_style(style.progress_chars("##-"));
            }
            bar.set_message("Validating drive".bold().to_string());
            bar
        });

        bar.set_length(total as u64);
        bar.set_position(current as u64);
        if let Some(file) = current_file {
            bar.set_message(format!("{}: {}", "Validating drive".bold(), file.cyan()));
        }
    }

    fn show_status(&self, message: &str) {
        let _ = self.multi.println(format!("{} {message}", "→".green()));
    }

    /// Clear every bar and print a one-line summary
    pub fn finish(self) {
        for (_, pb) in self.file_bars {
            pb.finish_and_clear();
        }

        let elapsed = self.start_time.elapsed();
        if let Some(bar) = self.batch_bar {
            bar.finish_and_clear();
            let files = usize::try_from(bar.position()).unwrap_or(usize::MAX);
            let summary = format!(
                "Checked {}, {} hashed in {}",
                format_file_count(files),
                format_bytes(self.bytes_checked),
                format_duration(elapsed)
            );
            if self.failed_checks == 0 {
                eprintln!("{} {summary}", "✓".green());
            } else {
                eprintln!(
                    "{} {summary}, {} failed checks",
                    "✗".red(),
                    self.failed_checks
                );
            }
        }
    }
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}
