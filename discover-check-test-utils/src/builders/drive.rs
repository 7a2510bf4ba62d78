//! A throwaway drive: a temporary directory of CAR files plus its catalog

use super::{BuiltCar, CatalogBuilder};
use discover_check_core::{Candidate, Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct DriveFixture {
    dir: TempDir,
    catalog: CatalogBuilder,
    candidates: Vec<Candidate>,
}

impl DriveFixture {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        std::fs::create_dir_all(dir.path().join("drive"))?;
        Ok(Self {
            dir,
            catalog: CatalogBuilder::new(),
            candidates: Vec::new(),
        })
    }

    /// Mountpoint of the fake drive
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("drive")
    }

    /// Scratch space next to the drive, for catalogs and reports
    pub fn scratch(&self) -> &Path {
        self.dir.path()
    }

    /// Write `car` under `subdir`; catalogue it when `dataset_id` is given
    pub fn add_car(
        &mut self,
        subdir: &str,
        car: &BuiltCar,
        dataset_id: Option<u8>,
    ) -> Result<PathBuf> {
        let path = car.write_into(&self.root().join(subdir))?;
        if let Some(dataset_id) = dataset_id {
            let catalog = std::mem::take(&mut self.catalog);
            self.catalog = catalog.with_car(car, dataset_id)?;
        }
        let relative_path = path
            .strip_prefix(self.root())
            .map_err(|e| Error::from(std::io::Error::other(e)))?
            .to_path_buf();
        self.candidates.push(Candidate {
            cid: car.root,
            relative_path,
            size: car.len() as u64,
        });
        Ok(path)
    }

    /// Catalogue a payload without writing it
    pub fn add_catalog_only(&mut self, car: &BuiltCar, dataset_id: u8) -> Result<()> {
        let catalog = std::mem::take(&mut self.catalog);
        self.catalog = catalog.with_car(car, dataset_id)?;
        Ok(())
    }

    /// Replace the on-disk bytes of a file added earlier
    pub fn overwrite(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::write(path, bytes)?;
        let size = bytes.len() as u64;
        let root = self.root();
        if let Some(candidate) = self
            .candidates
            .iter_mut()
            .find(|c| root.join(&c.relative_path) == path)
        {
            candidate.size = size;
        }
        Ok(())
    }

    pub fn catalog(&self) -> &CatalogBuilder {
        &self.catalog
    }

    /// Candidates as a directory walk would report them
    pub fn candidates(&self) -> Vec<Candidate> {
        self.candidates.clone()
    }

    pub fn write_catalog(&self) -> Result<PathBuf> {
        let path = self.dir.path().join("catalog.bin");
        self.catalog.write_to(&path)?;
        Ok(path)
    }
}
