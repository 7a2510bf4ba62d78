//! Test utilities for the drive validator
//!
//! Builders for CARv1 files and payload catalogs, shared by the integration
//! tests of the core and the CLI.

pub mod builders;

pub use builders::{
    BuiltCar, CarFileBuilder, CatalogBuilder, DriveFixture, commitment_low, deterministic_bytes,
};
