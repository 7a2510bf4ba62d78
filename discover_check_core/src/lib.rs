//! Filecoin Discover drive validation core
//!
//! The heart of the crate is a streaming chunk-and-commit engine: bytes flow
//! from a quantized ring buffer through a chain of chunkers into a chain of
//! collectors that reduce them into a root commitment. Around it sit the CAR
//! structure check, the payload catalog and the drive validator.

pub mod block;
pub mod car;
pub mod catalog;
pub mod chunker;
pub mod collector;
pub mod engine;
pub mod error;
pub mod progress;
pub mod report;
pub mod ringbuf;
pub mod validator;
pub mod workers;

pub use block::{BlockHeader, Cid};
pub use car::{CarSummary, StructureCheckConfig};
pub use catalog::{Catalog, CatalogEntry, CatalogLookup, dataset_name};
pub use engine::{Engine, EngineBuilder, EngineConfig, EngineState, SeenRoots, StatSummary};
pub use error::{Error, Result};
pub use progress::{CheckKind, NullProvider, ProgressProvider, ProgressUpdate};
pub use report::{JsonFileSink, ReportSink, report_name};
pub use validator::{
    Candidate, CommitmentReport, DriveValidator, FileReport, ValidationSummary, ValidatorConfig,
    commitment_of_file,
};
