//! Command orchestrators
//!
//! Each orchestrator wires configuration, progress and core services together
//! for one subcommand, leaving argument parsing and exit codes to `main`.

pub mod commp_orchestrator;
pub mod validate_orchestrator;

pub use commp_orchestrator::CommpOrchestrator;
pub use validate_orchestrator::{ValidateOptions, ValidateOrchestrator, ValidateOutcome};
