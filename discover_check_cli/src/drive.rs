//! Mountpoint checks and drive identifier resolution
//!
//! A drive is identified by the serial number embedded in its
//! `/dev/disk/by-id/<model>_<serial>-part1` link. The link whose device number
//! matches the mountpoint's filesystem names the drive.

use globset::{Glob, GlobMatcher};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory holding the stable device links
pub const BY_ID_DIR: &str = "/dev/disk/by-id";

/// Partition links of the drive model shipped for the program
pub const DEFAULT_DEVICE_PATTERN: &str = "*ST8000*-part1";

const PARTITION_SUFFIX: &str = "-part1";

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("unable to resolve mountpoint '{path}': {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the supplied mountpoint '{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("mountpoint '{0}' is not the root of a mounted drive")]
    NotAFilesystemRoot(PathBuf),

    #[error("invalid device pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("mountpoint '{0}' does not correspond to any attached drive")]
    UnknownDevice(PathBuf),
}

/// A validated mountpoint and the name its reports go under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drive {
    pub mountpoint: PathBuf,
    pub identifier: String,
}

/// How strictly the mountpoint is checked
#[derive(Debug, Clone)]
pub struct DriveResolver {
    by_id_dir: PathBuf,
    device_pattern: String,
    require_mount_root: bool,
}

impl Default for DriveResolver {
    fn default() -> Self {
        Self {
            by_id_dir: PathBuf::from(BY_ID_DIR),
            device_pattern: DEFAULT_DEVICE_PATTERN.to_string(),
            require_mount_root: true,
        }
    }
}

impl DriveResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_by_id_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.by_id_dir = dir.into();
        self
    }

    pub fn with_device_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.device_pattern = pattern.into();
        self
    }

    /// Accept any directory, not only a filesystem root carrying `lost+found`
    pub fn with_require_mount_root(mut self, require: bool) -> Self {
        self.require_mount_root = require;
        self
    }

    /// Validate `mountpoint` and name the drive behind it
    ///
    /// An explicit `identifier` skips the device lookup. Otherwise the device
    /// links are searched and, when `require_mount_root` is off, the
    /// directory name is used as a last resort.
    pub fn resolve(
        &self,
        mountpoint: &Path,
        identifier: Option<&str>,
    ) -> Result<Drive, DriveError> {
        let mountpoint = fs::canonicalize(mountpoint).map_err(|source| DriveError::Resolve {
            path: mountpoint.to_path_buf(),
            source,
        })?;
        if !mountpoint.is_dir() {
            return Err(DriveError::NotADirectory(mountpoint));
        }

        if self.require_mount_root && !is_mount_root(&mountpoint) {
            return Err(DriveError::NotAFilesystemRoot(mountpoint));
        }

        if let Some(identifier) = identifier {
            return Ok(Drive {
                mountpoint,
                identifier: identifier.to_string(),
            });
        }

        if let Some(identifier) = self.serial_for(&mountpoint)? {
            return Ok(Drive {
                mountpoint,
                identifier,
            });
        }

        if self.require_mount_root {
            return Err(DriveError::UnknownDevice(mountpoint));
        }

        let identifier = mountpoint
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unidentified")
            .to_string();
        warn!(
            "No device link matches {}, reporting as '{identifier}'",
            mountpoint.display()
        );
        Ok(Drive {
            mountpoint,
            identifier,
        })
    }

    fn matcher(&self) -> Result<GlobMatcher, DriveError> {
        Glob::new(&self.device_pattern)
            .map(|glob| glob.compile_matcher())
            .map_err(|e| DriveError::InvalidPattern {
                pattern: self.device_pattern.clone(),
                message: e.to_string(),
            })
    }

    /// Device links matching the pattern, sorted by name
    pub fn device_links(&self) -> Result<Vec<PathBuf>, DriveError> {
        let matcher = self.matcher()?;
        let Ok(entries) = fs::read_dir(&self.by_id_dir) else {
            debug!("{} is not readable", self.by_id_dir.display());
            return Ok(Vec::new());
        };

        let mut links: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| matcher.is_match(entry.file_name()))
            .map(|entry| entry.path())
            .collect();
        links.sort();
        Ok(links)
    }

    #[cfg(unix)]
    fn serial_for(&self, mountpoint: &Path) -> Result<Option<String>, DriveError> {
        use std::os::unix::fs::MetadataExt;

        let dev = fs::metadata(mountpoint)
            .map_err(|source| DriveError::Resolve {
                path: mountpoint.to_path_buf(),
                source,
            })?
            .dev();

        for link in self.device_links()? {
            // stat follows the link to the block device node
            let Ok(meta) = fs::metadata(&link) else {
                continue;
            };
            if meta.rdev() == dev
                && let Some(serial) = serial_from_link(&link)
            {
                debug!("{} is backed by {}", mountpoint.display(), link.display());
                return Ok(Some(serial));
            }
        }
        Ok(None)
    }

    #[cfg(not(unix))]
    fn serial_for(&self, _mountpoint: &Path) -> Result<Option<String>, DriveError> {
        Ok(None)
    }
}

/// `ata-ST8000DM004-2CX188_ZCT0A1B2` out of `.../ata-ST8000DM004-2CX188_ZCT0A1B2-part1`
pub fn serial_from_link(link: &Path) -> Option<String> {
    let name = link.file_name()?.to_str()?;
    let serial = name.strip_suffix(PARTITION_SUFFIX)?;
    (!serial.is_empty()).then(|| serial.to_string())
}

/// A mounted filesystem root: has `lost+found` and sits on another device than its parent
#[cfg(unix)]
fn is_mount_root(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    if !path.join("lost+found").exists() {
        return false;
    }
    let (Ok(own), Ok(parent)) = (fs::metadata(path), fs::metadata(path.join(".."))) else {
        return false;
    };
    own.dev() != parent.dev()
}

#[cfg(not(unix))]
fn is_mount_root(path: &Path) -> bool {
    path.join("lost+found").exists()
}
