//! Validate command orchestrator
//!
//! Resolves the drive, installs the catalog, walks the mountpoint, runs the
//! drive validator and stores the summary through a [`ReportSink`].

use crate::config::AppConfig;
use crate::drive::{Drive, DriveResolver};
use crate::error::{CliError, ErrorContext};
use crate::file_discovery::{DiscoveryOptions, discover_cars};
use crate::progress::{create_progress_infrastructure, finish_rendering, render_progress};
use anyhow::{Context, Result};
use discover_check_core::progress::ProgressUpdate;
use discover_check_core::{
    Candidate, Catalog, CatalogLookup, DriveValidator, JsonFileSink, ProgressProvider,
    ReportSink, ValidationSummary, report_name,
};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    pub mountpoint: PathBuf,
    /// Skip the device lookup and report under this name
    pub drive_identifier: Option<String>,
    /// Extra patterns, relative to the drive root, left out of the walk
    pub exclude_patterns: Vec<String>,
    pub show_progress: bool,
}

/// What a validation run produced
#[derive(Debug)]
pub struct ValidateOutcome {
    pub drive: Drive,
    pub summary: ValidationSummary,
    /// Where the report landed; `None` when the sink failed
    pub report_location: Option<String>,
}

impl ValidateOutcome {
    /// Shippable and on record
    pub fn is_success(&self) -> bool {
        self.report_location.is_some() && self.summary.is_shippable()
    }
}

pub struct ValidateOrchestrator {
    config: AppConfig,
    sink: Box<dyn ReportSink>,
}

impl ValidateOrchestrator {
    pub fn new(config: AppConfig) -> Self {
        let sink = Box::new(JsonFileSink::new(config.report.directory.clone()));
        Self { config, sink }
    }

    /// Store reports somewhere other than the configured directory
    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub async fn run(&self, options: ValidateOptions) -> Result<ValidateOutcome> {
        let drive = DriveResolver::new()
            .with_device_pattern(self.config.drive.device_pattern.clone())
            .with_require_mount_root(self.config.drive.require_mount_root)
            .resolve(&options.mountpoint, options.drive_identifier.as_deref())?;
        info!(
            "Processing Filecoin Discover drive {} at {}",
            drive.identifier,
            drive.mountpoint.display()
        );

        let catalog = self.install_catalog()?;

        let (progress, render_task) = if options.show_progress {
            let (provider, rx) = create_progress_infrastructure();
            (provider, Some(tokio::spawn(render_progress(rx))))
        } else {
            (<dyn ProgressProvider>::null(), None)
        };

        // fails fast on a bad engine chain, before the walk
        let validator = DriveValidator::new(
            drive.mountpoint.clone(),
            self.config.engine.clone(),
            self.config.validator.clone(),
            catalog,
        )
        .context("Failed to prepare validator")?
        .with_progress(Arc::clone(&progress));

        progress.report(ProgressUpdate::Status {
            message: format!("Gathering car files from {}", drive.mountpoint.display()),
        });
        let candidates = self.discover(&drive, &options).await?;
        info!("Found total of {} car files", candidates.len());

        let result = validator.validate(&drive.identifier, candidates).await;
        // the renderer exits once the last sender is dropped
        progress.complete();
        if let Some(task) = render_task {
            finish_rendering(task).await;
        }
        let summary = result.context("Drive validation failed")?;

        let name = report_name(&summary);
        let report_location = match self.sink.submit(&name, &summary) {
            Ok(location) => {
                info!("Stored report '{name}' at {location}");
                Some(location)
            }
            Err(e) => {
                warn!("Unable to store report '{name}': {e}");
                None
            }
        };

        Ok(ValidateOutcome {
            drive,
            summary,
            report_location,
        })
    }

    fn install_catalog(&self) -> Result<Arc<dyn CatalogLookup>> {
        let Some(ref path) = self.config.catalog.path else {
            return Err(CliError::misuse("No payload catalog configured")
                .with_suggestion("Pass --catalog <FILE> or set catalog.path in the configuration")
                .into());
        };

        let catalog = Catalog::load(path).map_err(|e| {
            CliError::misuse(&format!("Unable to load catalog: {e}"))
                .with_context("path", &path.display().to_string())
        })?;
        debug!("Loaded {} catalog records from {}", catalog.len(), path.display());

        let catalog: Arc<dyn CatalogLookup> = catalog
            .install()
            .context("Failed to install payload catalog")?;
        Ok(catalog)
    }

    async fn discover(&self, drive: &Drive, options: &ValidateOptions) -> Result<Vec<Candidate>> {
        let root = drive.mountpoint.clone();
        let discovery =
            DiscoveryOptions::new().with_exclude_patterns(options.exclude_patterns.clone());

        tokio::task::spawn_blocking(move || discover_cars(&root, discovery))
            .await
            .context("Discovery task panicked")?
            .with_context(|| {
                format!(
                    "Error encountered while collecting car files from {}",
                    drive.mountpoint.display()
                )
            })
    }
}
