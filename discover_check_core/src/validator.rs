//! Drive validation: catalog classification, commitment and structure checks
//!
//! Every candidate file is first classified against the catalog. Known files
//! then get their commitment re-derived by an [`Engine`]; every file gets the
//! CAR structure check. The two kinds of work run under separate semaphores
//! on the blocking pool.

use crate::block::{BlockHeader, Cid, catalog_key};
use crate::car::{self, StructureCheckConfig};
use crate::catalog::{CatalogEntry, CatalogLookup, UNKNOWN_DATASET};
use crate::engine::{Engine, EngineConfig, SeenRoots, StatSummary};
use crate::progress::{CheckKind, ProgressProvider, ProgressReader, ProgressUpdate};
use crate::{Error, Result, error::ConfigError, error::InternalError, error::IoError};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Flawless files a drive needs before it may ship
pub const DEFAULT_SHIP_THRESHOLD: usize = 6900;
pub const DEFAULT_COMMITMENT_WORKERS: usize = 1;
pub const DEFAULT_STRUCTURE_WORKERS: usize = 3;

pub const UNKNOWN_PAYLOAD: &str = "payload not found in the Filecoin Discover set";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub commitment_workers: usize,
    pub structure_workers: usize,
    pub head_blocks: usize,
    pub tail_window_bytes: u64,
    pub ship_threshold: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            commitment_workers: DEFAULT_COMMITMENT_WORKERS,
            structure_workers: DEFAULT_STRUCTURE_WORKERS,
            head_blocks: car::DEFAULT_HEAD_BLOCKS,
            tail_window_bytes: car::DEFAULT_TAIL_WINDOW,
            ship_threshold: DEFAULT_SHIP_THRESHOLD,
        }
    }
}

impl ValidatorConfig {
    pub fn structure(&self) -> StructureCheckConfig {
        StructureCheckConfig {
            head_blocks: self.head_blocks,
            tail_window: self.tail_window_bytes,
        }
    }
}

/// A file found on the drive, named after the CID it should contain
#[derive(Debug, Clone)]
pub struct Candidate {
    pub cid: Cid,
    /// Path relative to the drive root
    pub relative_path: PathBuf,
    pub size: u64,
}

/// Everything learned about one file
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileReport {
    pub full_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<u8>,
    pub byte_size: u64,
    pub byte_size_validated: bool,
    pub car_header_validated: bool,
    pub commp_validated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commp: Option<String>,
    pub soft_fails: Vec<String>,
    pub hard_fails: Vec<String>,
}

impl FileReport {
    pub fn is_flawless(&self) -> bool {
        self.hard_fails.is_empty()
    }
}

/// The report of a whole drive
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationSummary {
    pub drive_identifier: String,
    pub validation_start: DateTime<Utc>,
    pub validation_finish: DateTime<Utc>,
    pub soft_failures: usize,
    pub hard_failures: usize,
    pub flawless: usize,
    pub ship_threshold: usize,
    pub carfiles_per_dataset: BTreeMap<String, usize>,
    /// Keyed by the CID string from the file name
    pub carfiles: BTreeMap<String, FileReport>,
}

impl ValidationSummary {
    pub fn unknown_files(&self) -> usize {
        self.carfiles_per_dataset
            .get(UNKNOWN_DATASET)
            .copied()
            .unwrap_or(0)
    }

    /// Enough flawless files and nothing outside the catalog
    pub fn is_shippable(&self) -> bool {
        self.flawless > self.ship_threshold && self.unknown_files() == 0
    }

    fn tally(&mut self) {
        self.flawless = 0;
        self.hard_failures = 0;
        self.soft_failures = 0;
        for report in self.carfiles.values() {
            if report.is_flawless() {
                self.flawless += 1;
            } else {
                self.hard_failures += 1;
            }
            if !report.soft_fails.is_empty() {
                self.soft_failures += 1;
            }
        }
    }
}

/// Root and counters of one commitment pass over a file
#[derive(Debug, Clone)]
pub struct CommitmentReport {
    pub root: BlockHeader,
    pub stats: StatSummary,
}

/// Run one engine pass over the file at `path`
pub fn commitment_of_file(
    path: &Path,
    config: &EngineConfig,
    seen_roots: Option<Arc<SeenRoots>>,
    progress: Arc<dyn ProgressProvider>,
) -> Result<CommitmentReport> {
    let file = File::open(path).map_err(|e| IoError::from_std(e).with_path(path))?;
    commitment_of_reader(file, path, config, seen_roots, progress)
}

fn commitment_of_reader(
    file: File,
    path: &Path,
    config: &EngineConfig,
    seen_roots: Option<Arc<SeenRoots>>,
    progress: Arc<dyn ProgressProvider>,
) -> Result<CommitmentReport> {
    let total = file
        .metadata()
        .map_err(|e| IoError::from_std(e).with_path(path))?
        .len();

    let mut builder = Engine::builder().config(config.clone());
    if let Some(seen) = seen_roots {
        builder = builder.seen_roots(seen);
    }
    let mut engine = builder.build()?;

    let reader = ProgressReader::new(
        file,
        progress,
        path.to_path_buf(),
        CheckKind::Commitment,
        total,
    );
    let root = engine.process_reader(reader)?;
    engine.destroy()?;
    Ok(CommitmentReport {
        root,
        stats: engine.stats().clone(),
    })
}

pub struct DriveValidator {
    root: PathBuf,
    engine_config: EngineConfig,
    config: ValidatorConfig,
    catalog: Arc<dyn CatalogLookup>,
    seen_roots: Arc<SeenRoots>,
    progress: Arc<dyn ProgressProvider>,
}

impl DriveValidator {
    /// Build a validator; engine configuration errors surface here
    pub fn new(
        root: impl Into<PathBuf>,
        engine_config: EngineConfig,
        config: ValidatorConfig,
        catalog: Arc<dyn CatalogLookup>,
    ) -> Result<Self> {
        if config.commitment_workers == 0 || config.structure_workers == 0 {
            return Err(Error::Config(ConfigError::invalid_configuration(
                "validator worker counts must be at least 1",
            )));
        }

        // a bad chain must abort before any file is touched
        let trial = Engine::from_config(&engine_config)?;
        trial.destroy()?;

        Ok(Self {
            root: root.into(),
            engine_config,
            config,
            catalog,
            seen_roots: SeenRoots::global(),
            progress: <dyn ProgressProvider>::null(),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressProvider>) -> Self {
        self.progress = progress;
        self
    }

    /// Use a private duplicate-root registry instead of the process-wide one
    pub fn with_seen_roots(mut self, seen_roots: Arc<SeenRoots>) -> Self {
        self.seen_roots = seen_roots;
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Classify and check every candidate, then tally the drive
    pub async fn validate(
        &self,
        drive_identifier: &str,
        candidates: Vec<Candidate>,
    ) -> Result<ValidationSummary> {
        let validation_start = Utc::now();
        let total = candidates.len();

        let mut carfiles_per_dataset = BTreeMap::new();
        let mut jobs = Vec::with_capacity(total);
        for candidate in candidates {
            let entry = catalog_key(&candidate.cid).and_then(|key| self.catalog.lookup(&key));
            let report = classify(&candidate, entry.as_ref());
            let bucket = entry
                .as_ref()
                .map(CatalogEntry::dataset_label)
                .unwrap_or_else(|| UNKNOWN_DATASET.to_string());
            *carfiles_per_dataset.entry(bucket).or_insert(0) += 1;
            jobs.push((candidate, entry, report));
        }
        for (dataset, count) in &carfiles_per_dataset {
            info!("{count}\tbelong to dataset\t{dataset}");
        }

        // files already carrying a soft failure get their commitment first
        jobs.sort_by_key(|(_, _, report)| report.soft_fails.is_empty());

        let commitment_permits = Arc::new(Semaphore::new(self.config.commitment_workers));
        let structure_permits = Arc::new(Semaphore::new(self.config.structure_workers));
        let mut pending = FuturesUnordered::new();

        for (candidate, entry, report) in jobs {
            let path = self.root.join(&candidate.relative_path);
            let commitment = entry.map(|entry| {
                run_commitment(
                    Arc::clone(&commitment_permits),
                    path.clone(),
                    entry,
                    self.engine_config.clone(),
                    Arc::clone(&self.seen_roots),
                    Arc::clone(&self.progress),
                )
            });
            let structure = run_structure(
                Arc::clone(&structure_permits),
                path,
                candidate.cid,
                self.config.structure(),
                Arc::clone(&self.progress),
            );

            pending.push(async move {
                let (commitment, structure) = tokio::join!(
                    async move {
                        match commitment {
                            Some(check) => Some(check.await),
                            None => None,
                        }
                    },
                    structure
                );
                (candidate, report, commitment, structure)
            });
        }

        let mut carfiles = BTreeMap::new();
        while let Some((candidate, mut report, commitment, structure)) = pending.next().await {
            if let Some(outcome) = commitment {
                outcome?.apply(&mut report);
            }
            structure?.apply(&mut report);

            if !report.hard_fails.is_empty() {
                warn!(
                    "{}: {}",
                    candidate.relative_path.display(),
                    report.hard_fails.join("; ")
                );
            }
            let key = candidate.cid.to_string();
            carfiles.insert(key, report);

            self.progress.report(ProgressUpdate::BatchProgress {
                current: carfiles.len(),
                total,
                current_file: Some(candidate.relative_path.display().to_string()),
            });
        }
        self.progress.complete();

        let mut summary = ValidationSummary {
            drive_identifier: drive_identifier.to_string(),
            validation_start,
            validation_finish: Utc::now(),
            soft_failures: 0,
            hard_failures: 0,
            flawless: 0,
            ship_threshold: self.config.ship_threshold,
            carfiles_per_dataset,
            carfiles,
        };
        summary.tally();
        debug!(
            "drive {drive_identifier}: {} flawless, {} hard, {} soft",
            summary.flawless, summary.hard_failures, summary.soft_failures
        );
        Ok(summary)
    }
}

/// Catalog-only verdict on a file, before any bytes are read
fn classify(candidate: &Candidate, entry: Option<&CatalogEntry>) -> FileReport {
    let mut report = FileReport {
        full_path: candidate.relative_path.display().to_string(),
        byte_size: candidate.size,
        ..FileReport::default()
    };
    match entry {
        None => report.hard_fails.push(UNKNOWN_PAYLOAD.to_string()),
        Some(entry) => {
            report.dataset_id = Some(entry.dataset_id);
            if entry.expected_size == candidate.size {
                report.byte_size_validated = true;
            } else {
                report.soft_fails.push(format!(
                    "car file size {} does not match expected catalog value {}",
                    candidate.size, entry.expected_size
                ));
            }
        }
    }
    report
}

enum CommitmentOutcome {
    Matched { root: Cid, duplicate: bool },
    Mismatch { root: Cid, found: Vec<u8>, expected: [u8; 16] },
    Failed(String),
}

impl CommitmentOutcome {
    fn apply(self, report: &mut FileReport) {
        match self {
            CommitmentOutcome::Matched { root, duplicate } => {
                report.commp_validated = true;
                if duplicate {
                    report.soft_fails.push(format!(
                        "commP {root} was already produced by another file in this run"
                    ));
                }
                report.commp = Some(root.to_string());
            }
            CommitmentOutcome::Mismatch {
                root,
                found,
                expected,
            } => {
                report.hard_fails.push(format!(
                    "lower commP bytes of car '{}' do not match expected value '{}'",
                    hex::encode(found),
                    hex::encode(expected)
                ));
                report.commp = Some(root.to_string());
            }
            CommitmentOutcome::Failed(message) => report.hard_fails.push(message),
        }
    }
}

enum StructureOutcome {
    Valid,
    Invalid(String),
}

impl StructureOutcome {
    fn apply(self, report: &mut FileReport) {
        match self {
            StructureOutcome::Valid => report.car_header_validated = true,
            StructureOutcome::Invalid(message) => report.hard_fails.push(message),
        }
    }
}

async fn run_commitment(
    permits: Arc<Semaphore>,
    path: PathBuf,
    entry: CatalogEntry,
    config: EngineConfig,
    seen_roots: Arc<SeenRoots>,
    progress: Arc<dyn ProgressProvider>,
) -> Result<CommitmentOutcome> {
    let _permit = permits.acquire_owned().await.map_err(|_| {
        Error::Internal(InternalError::assertion("commitment semaphore closed"))
    })?;

    let task_path = path.clone();
    let task_progress = Arc::clone(&progress);
    let outcome = tokio::task::spawn_blocking(move || {
        check_commitment(&task_path, &entry, &config, seen_roots, task_progress)
    })
    .await
    .unwrap_or_else(|e| CommitmentOutcome::Failed(format!("commP calculation failed: {e}")));

    progress.report(ProgressUpdate::CheckFinished {
        path,
        check: CheckKind::Commitment,
        passed: matches!(outcome, CommitmentOutcome::Matched { .. }),
    });
    Ok(outcome)
}

fn check_commitment(
    path: &Path,
    entry: &CatalogEntry,
    config: &EngineConfig,
    seen_roots: Arc<SeenRoots>,
    progress: Arc<dyn ProgressProvider>,
) -> CommitmentOutcome {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            return CommitmentOutcome::Failed(format!(
                "unable to open car file for reading: {e}"
            ));
        }
    };
    let report = match commitment_of_reader(file, path, config, Some(seen_roots), progress) {
        Ok(report) => report,
        Err(e) => return CommitmentOutcome::Failed(format!("commP calculation failed: {e}")),
    };
    let Some(root) = report.root.content_id else {
        return CommitmentOutcome::Failed(
            "commP calculation failed: root has no content identifier".to_string(),
        );
    };

    let digest = root.hash().digest();
    let low = &digest[digest.len().saturating_sub(16)..];
    if low == entry.commitment_low {
        CommitmentOutcome::Matched {
            root,
            duplicate: report.stats.duplicate_root,
        }
    } else {
        CommitmentOutcome::Mismatch {
            found: low.to_vec(),
            root,
            expected: entry.commitment_low,
        }
    }
}

async fn run_structure(
    permits: Arc<Semaphore>,
    path: PathBuf,
    expected_root: Cid,
    config: StructureCheckConfig,
    progress: Arc<dyn ProgressProvider>,
) -> Result<StructureOutcome> {
    let _permit = permits.acquire_owned().await.map_err(|_| {
        Error::Internal(InternalError::assertion("structure semaphore closed"))
    })?;

    let task_path = path.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        check_structure(&task_path, &expected_root, &config)
    })
    .await
    .unwrap_or_else(|e| StructureOutcome::Invalid(format!("car structure check failed: {e}")));

    progress.report(ProgressUpdate::CheckFinished {
        path,
        check: CheckKind::Structure,
        passed: matches!(outcome, StructureOutcome::Valid),
    });
    Ok(outcome)
}

fn check_structure(
    path: &Path,
    expected_root: &Cid,
    config: &StructureCheckConfig,
) -> StructureOutcome {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            return StructureOutcome::Invalid(format!(
                "unable to open car file for reading: {e}"
            ));
        }
    };
    let file_size = match file.metadata() {
        Ok(metadata) => metadata.len(),
        Err(e) => return StructureOutcome::Invalid(format!("unable to size car file: {e}")),
    };

    match car::check_reader(BufReader::new(file), file_size, expected_root, config) {
        Ok(summary) => {
            debug!(
                "{}: {} sections, {} verified",
                path.display(),
                summary.sections,
                summary.sections_verified
            );
            StructureOutcome::Valid
        }
        Err(e) => StructureOutcome::Invalid(e.to_string()),
    }
}
