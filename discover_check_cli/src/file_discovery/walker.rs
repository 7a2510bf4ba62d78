//! Streaming walk over a drive
//!
//! Yields one [`Candidate`] per CID-named archive, in file name order within
//! each directory so repeated runs list the drive identically.

use discover_check_core::{Candidate, Cid};
use log::{debug, trace};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::{CID_PREFIX, DEFAULT_EXCLUDES, DiscoveryError, Result, filter::FileFilter};

const CAR_EXTENSION: &str = ".car";

/// Options for drive discovery
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Patterns (relative to the drive root) never walked into
    pub exclude_patterns: Vec<String>,
    pub follow_links: bool,
    pub max_depth: Option<usize>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect(),
            follow_links: false,
            max_depth: None,
        }
    }
}

impl DiscoveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add patterns on top of the defaults
    pub fn with_exclude_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Iterator over the candidates of one drive
pub struct CarDiscovery {
    root: PathBuf,
    walker: Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>,
}

impl CarDiscovery {
    pub fn new(root: &Path, options: DiscoveryOptions) -> Result<Self> {
        if !root.is_dir() {
            return Err(DiscoveryError::PathNotFound(root.to_path_buf()));
        }

        let no_includes: [&str; 0] = [];
        let filter = FileFilter::new(&no_includes[..], &options.exclude_patterns[..])?;

        let mut walker = WalkDir::new(root)
            .follow_links(options.follow_links)
            .sort_by_file_name();
        if let Some(depth) = options.max_depth {
            walker = walker.max_depth(depth);
        }

        let base = root.to_path_buf();
        let walker = walker.into_iter().filter_entry(move |entry| {
            match entry.path().strip_prefix(&base) {
                Ok(relative) if !relative.as_os_str().is_empty() => !filter.is_excluded(relative),
                _ => true,
            }
        });

        Ok(Self {
            root: root.to_path_buf(),
            walker: Box::new(walker),
        })
    }

    fn candidate(&self, entry: &DirEntry) -> Result<Option<Candidate>> {
        if !entry.file_type().is_file() {
            return Ok(None);
        }

        let Some(name) = entry.file_name().to_str() else {
            trace!("Skipping non UTF-8 name {:?}", entry.path());
            return Ok(None);
        };
        let Some(cid_text) = cid_from_file_name(name) else {
            trace!("Skipping {:?}: not a CID-named archive", entry.path());
            return Ok(None);
        };

        let cid = Cid::try_from(cid_text).map_err(|source| {
            DiscoveryError::UndecodableCid {
                name: cid_text.to_string(),
                path: entry.path().to_path_buf(),
                source,
            }
        })?;

        let size = entry.metadata()?.len();
        let relative_path = entry
            .path()
            .strip_prefix(&self.root)
            .unwrap_or(entry.path())
            .to_path_buf();

        debug!("Found {cid} at {} ({size} bytes)", relative_path.display());
        Ok(Some(Candidate {
            cid,
            relative_path,
            size,
        }))
    }
}

impl Iterator for CarDiscovery {
    type Item = Result<Candidate>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            match self.candidate(&entry) {
                Ok(Some(candidate)) => return Some(Ok(candidate)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// `bafyr...` out of `bafyr....car`, when the stem is a plain alphanumeric word
pub fn cid_from_file_name(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(CAR_EXTENSION)?;
    (stem.len() > CID_PREFIX.len()
        && stem.starts_with(CID_PREFIX)
        && stem.bytes().all(|b| b.is_ascii_alphanumeric()))
    .then_some(stem)
}

/// Collect every candidate under `root`, stopping at the first error
pub fn discover_cars(root: &Path, options: DiscoveryOptions) -> Result<Vec<Candidate>> {
    CarDiscovery::new(root, options)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use discover_check_core::block::{CODEC_DAG_CBOR, CODEC_DAG_PB, MH_SHA2_256, cid_v1};
    use std::fs;
    use tempfile::TempDir;

    /// dag-cbor CIDs render as `bafyrei...`
    fn cid(seed: u8) -> Cid {
        cid_v1(CODEC_DAG_CBOR, MH_SHA2_256, &[seed; 32]).unwrap()
    }

    fn drive() -> TempDir {
        let dir = TempDir::new().unwrap();
        let base = dir.path();

        fs::create_dir_all(base.join("set-a")).unwrap();
        fs::create_dir_all(base.join("set-b/nested")).unwrap();
        fs::create_dir_all(base.join("lost+found")).unwrap();

        fs::write(base.join(format!("set-a/{}.car", cid(1))), b"12345").unwrap();
        fs::write(base.join(format!("set-b/nested/{}.car", cid(2))), b"1").unwrap();
        fs::write(base.join(format!("lost+found/{}.car", cid(3))), b"1").unwrap();
        fs::write(base.join("set-a/README.txt"), b"hello").unwrap();
        fs::write(base.join("set-a/QmNotACarName.car"), b"x").unwrap();

        dir
    }

    #[test]
    fn test_cid_from_file_name() {
        assert_eq!(cid_from_file_name("bafyrabc123.car"), Some("bafyrabc123"));
        assert_eq!(cid_from_file_name("bafyrabc123.car.part"), None);
        assert_eq!(cid_from_file_name("bafyr.car"), None);
        assert_eq!(cid_from_file_name("bafybeiabc.car"), None);
        assert_eq!(cid_from_file_name("Qmabc.car"), None);
        assert_eq!(cid_from_file_name("bafyr-abc.car"), None);
    }

    #[test]
    fn test_discovery_finds_cid_named_archives() {
        let dir = drive();
        let found = discover_cars(dir.path(), DiscoveryOptions::new()).unwrap();

        assert_eq!(found.len(), 2);
        let first = found.iter().find(|c| c.cid == cid(1)).unwrap();
        assert_eq!(first.size, 5);
        assert_eq!(
            first.relative_path,
            PathBuf::from(format!("set-a/{}.car", cid(1)))
        );
        assert!(found.iter().any(|c| c.cid == cid(2)));
        // lost+found is never entered
        assert!(!found.iter().any(|c| c.cid == cid(3)));
    }

    #[test]
    fn test_dag_pb_archives_are_skipped() {
        let dir = drive();
        let dag_pb = cid_v1(CODEC_DAG_PB, MH_SHA2_256, &[4u8; 32]).unwrap();
        assert!(dag_pb.to_string().starts_with("bafybei"));
        fs::write(dir.path().join(format!("set-a/{dag_pb}.car")), b"pb").unwrap();

        let found = discover_cars(dir.path(), DiscoveryOptions::new()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(!found.iter().any(|c| c.cid == dag_pb));
    }

    #[test]
    fn test_extra_excludes() {
        let dir = drive();
        let options = DiscoveryOptions::new().with_exclude_patterns(["set-b/**"]);
        let found = discover_cars(dir.path(), options).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cid, cid(1));
    }

    #[test]
    fn test_max_depth() {
        let dir = drive();
        let options = DiscoveryOptions::new().with_max_depth(Some(2));
        let found = discover_cars(dir.path(), options).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cid, cid(1));
    }

    #[test]
    fn test_undecodable_cid_is_fatal() {
        let dir = drive();
        fs::write(dir.path().join("set-a/bafyrzzzz1.car"), b"x").unwrap();

        let err = discover_cars(dir.path(), DiscoveryOptions::new()).unwrap_err();
        match err {
            DiscoveryError::UndecodableCid { name, path, .. } => {
                assert_eq!(name, "bafyrzzzz1");
                assert!(path.ends_with("set-a/bafyrzzzz1.car"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            CarDiscovery::new(&missing, DiscoveryOptions::new()),
            Err(DiscoveryError::PathNotFound(_))
        ));
    }
}
