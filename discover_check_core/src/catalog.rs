//! Catalog of known payloads and the datasets they belong to
//!
//! The catalog is a flat blob of 37-byte records:
//! `key[16] | dataset u8 | size u32 BE | commitment low bytes [16]`, where the
//! key is the low 16 bytes of the payload CID. It is loaded once per process
//! and never changes afterwards.

use crate::{Error, Result, error::ConfigError, error::IoError};
use log::{debug, warn};
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub const RECORD_LEN: usize = 37;

/// Bucket for payloads missing from the catalog
pub const UNKNOWN_DATASET: &str = "UNKNOWN";

static DATASET_NAMES: Lazy<HashMap<u8, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (1, "dumbo-v2-cars-encode-public"),
        (2, "dumbo-v2-cars-1000genomes"),
        (3, "dumbo-v2-cars-landsat-pds"),
        (4, "dumbo-v2-cars-prd-tnm"),
        (5, "dumbo-v2-cars-dumbo-internet-archive-prelinger"),
        (6, "dumbo-v2-cars-dumbo-internet-archive-librivox"),
        (7, "dumbo-v2-cars-source-berkeley"),
        (8, "dumbo-v2-cars-openneuro.org"),
        (9, "dumbo-v2-cars-mevadata-public-01"),
        (10, "dumbo-stage3-datasets.elasticmapreduce"),
        (11, "dumbo-v2-cars-allencell"),
        (12, "dumbo-v2-cars-gdelt-open-data"),
        (13, "dumbo-v2-cars-google-landmark"),
        (14, "dumbo-v2-cars-source-gutenberg"),
        (15, "dumbo-stage3-source-wikipedia"),
        (16, "dumbo-stage3-source-berkeley"),
        (17, "dumbo-v2-cars-datasets.elasticmapreduce"),
        (18, "dumbo-stage3-source-fma"),
        (19, "dumbo-v2-cars-source-gnomadv3"),
        (20, "dumbo-v2-cars-source-fma"),
        (21, "dumbo-v2-cars-openaq-fetches"),
        (22, "dumbo-v2-cars-source-wikipedia"),
        (23, "dumbo-stage3-source-gnomadv3"),
        (24, "dumbo-v2-cars-source-openstreetmaps"),
        (25, "dumbo-v2-cars-source-openaddresses"),
        (26, "dumbo-v2-cars-source-offshore"),
        (27, "dumbo-stage3-fast-ai-nlp"),
        (28, "dumbo-v2-cars-fast-ai-nlp"),
        (29, "dumbo-stage3-gdelt-open-data"),
    ])
});

/// Human-readable name of a dataset id
pub fn dataset_name(id: u8) -> Option<&'static str> {
    DATASET_NAMES.get(&id).copied()
}

/// What the catalog knows about one payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub dataset_id: u8,
    pub expected_size: u64,
    pub commitment_low: [u8; 16],
}

impl CatalogEntry {
    /// Dataset name, falling back to the numeric id for ids without a name
    pub fn dataset_label(&self) -> String {
        dataset_name(self.dataset_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("dataset-{}", self.dataset_id))
    }
}

/// Read-only lookup by the low 16 bytes of a payload CID
pub trait CatalogLookup: Send + Sync {
    fn lookup(&self, key: &[u8; 16]) -> Option<CatalogEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    entries: HashMap<[u8; 16], CatalogEntry>,
}

static INSTALLED: OnceCell<Arc<Catalog>> = OnceCell::new();

impl Catalog {
    /// Parse a catalog blob
    pub fn from_bytes(blob: &[u8]) -> Result<Self> {
        if blob.len() % RECORD_LEN != 0 {
            return Err(Error::Config(ConfigError::invalid_configuration(format!(
                "catalog of {} bytes is not a whole number of {RECORD_LEN}-byte records",
                blob.len()
            ))));
        }

        let mut entries = HashMap::with_capacity(blob.len() / RECORD_LEN);
        let mut duplicates = 0usize;
        for record in blob.chunks_exact(RECORD_LEN) {
            let mut key = [0u8; 16];
            key.copy_from_slice(&record[..16]);
            let mut size = [0u8; 4];
            size.copy_from_slice(&record[17..21]);
            let mut commitment_low = [0u8; 16];
            commitment_low.copy_from_slice(&record[21..37]);

            let entry = CatalogEntry {
                dataset_id: record[16],
                expected_size: u64::from(u32::from_be_bytes(size)),
                commitment_low,
            };
            if entries.insert(key, entry).is_some() {
                duplicates += 1;
            }
        }

        if duplicates > 0 {
            warn!("catalog contains {duplicates} duplicate keys, last record wins");
        }
        debug!("catalog loaded with {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let blob = std::fs::read(path).map_err(|e| IoError::from_std(e).with_path(path))?;
        Self::from_bytes(&blob)
    }

    /// Make this catalog the process-wide one; only the first call succeeds
    pub fn install(self) -> Result<Arc<Catalog>> {
        let catalog = Arc::new(self);
        INSTALLED
            .set(Arc::clone(&catalog))
            .map_err(|_| Error::Config(ConfigError::invalid_configuration(
                "a catalog is already installed",
            )))?;
        Ok(catalog)
    }

    pub fn installed() -> Option<Arc<Catalog>> {
        INSTALLED.get().cloned()
    }
}

impl CatalogLookup for Catalog {
    fn lookup(&self, key: &[u8; 16]) -> Option<CatalogEntry> {
        self.entries.get(key).copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: u8, dataset: u8, size: u32, commitment: u8) -> Vec<u8> {
        let mut out = vec![key; 16];
        out.push(dataset);
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&[commitment; 16]);
        out
    }

    #[test]
    fn test_parse_records() {
        let mut blob = record(1, 22, 1024, 0xaa);
        blob.extend(record(2, 99, 0xdead_beef, 0xbb));
        let catalog = Catalog::from_bytes(&blob).unwrap();

        assert_eq!(catalog.len(), 2);
        let entry = catalog.lookup(&[1u8; 16]).unwrap();
        assert_eq!(entry.dataset_id, 22);
        assert_eq!(entry.expected_size, 1024);
        assert_eq!(entry.commitment_low, [0xaa; 16]);
        assert_eq!(entry.dataset_label(), "dumbo-v2-cars-source-wikipedia");

        let entry = catalog.lookup(&[2u8; 16]).unwrap();
        assert_eq!(entry.expected_size, 0xdead_beef);
        assert_eq!(entry.dataset_label(), "dataset-99");

        assert!(catalog.lookup(&[3u8; 16]).is_none());
    }

    #[test]
    fn test_partial_record_rejected() {
        let mut blob = record(1, 1, 1, 1);
        blob.pop();
        assert!(matches!(Catalog::from_bytes(&blob), Err(Error::Config(_))));
    }

    #[test]
    fn test_dataset_names() {
        assert_eq!(dataset_name(10), Some("dumbo-stage3-datasets.elasticmapreduce"));
        assert_eq!(dataset_name(29), Some("dumbo-stage3-gdelt-open-data"));
        assert_eq!(dataset_name(0), None);
        assert_eq!(DATASET_NAMES.len(), 29);
    }
}
