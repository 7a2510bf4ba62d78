//! Catalog blob builder

use super::BuiltCar;
use discover_check_core::block::{Cid, catalog_key};
use discover_check_core::catalog::{Catalog, RECORD_LEN};
use discover_check_core::{Engine, EngineConfig, Result};
use std::io::Cursor;
use std::path::Path;

/// Assembles 37-byte catalog records
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    blob: Vec<u8>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record with explicit values
    pub fn with_entry(
        mut self,
        cid: &Cid,
        dataset_id: u8,
        expected_size: u32,
        commitment_low: [u8; 16],
    ) -> Self {
        let key = catalog_key(cid).expect("CID too short to key a catalog record");
        self.blob.extend_from_slice(&key);
        self.blob.push(dataset_id);
        self.blob.extend_from_slice(&expected_size.to_be_bytes());
        self.blob.extend_from_slice(&commitment_low);
        self
    }

    /// Add a record describing `car` exactly as built, commitment included
    pub fn with_car(self, car: &BuiltCar, dataset_id: u8) -> Result<Self> {
        let commitment_low = commitment_low(&car.bytes)?;
        let size = u32::try_from(car.len()).unwrap_or(u32::MAX);
        Ok(self.with_entry(&car.root, dataset_id, size, commitment_low))
    }

    pub fn len(&self) -> usize {
        self.blob.len() / RECORD_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.blob
    }

    pub fn build(&self) -> Result<Catalog> {
        Catalog::from_bytes(&self.blob)
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.blob)
    }
}

/// Low 16 bytes of the commitment the default engine derives from `bytes`
pub fn commitment_low(bytes: &[u8]) -> Result<[u8; 16]> {
    let mut engine = Engine::from_config(&EngineConfig::default())?;
    let root = engine.process_reader(Cursor::new(bytes))?;
    let digest = root.digest();
    let mut low = [0u8; 16];
    low.copy_from_slice(&digest[digest.len() - 16..]);
    Ok(low)
}
