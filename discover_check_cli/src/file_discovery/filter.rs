//! Glob based path filtering
//!
//! Paths are matched relative to the drive root so patterns such as
//! `lost+found/**` read the same on every mountpoint.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

use super::{DiscoveryError, Result};

/// Compiled set of glob patterns
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    globset: GlobSet,
    patterns: Vec<String>,
}

impl PatternMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern)
                .map_err(|e| DiscoveryError::InvalidPattern(format!("{pattern}: {e}")))?;
            builder.add(glob);
        }

        let globset = builder
            .build()
            .map_err(|e| DiscoveryError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            globset,
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.globset.is_match(path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Include/exclude filter; excludes always win
#[derive(Debug)]
pub struct FileFilter {
    include_matcher: Option<PatternMatcher>,
    exclude_matcher: Option<PatternMatcher>,
}

impl FileFilter {
    pub fn new<I, E>(include_patterns: &[I], exclude_patterns: &[E]) -> Result<Self>
    where
        I: AsRef<str>,
        E: AsRef<str>,
    {
        let include_matcher = if include_patterns.is_empty() {
            None
        } else {
            Some(PatternMatcher::new(include_patterns)?)
        };

        let exclude_matcher = if exclude_patterns.is_empty() {
            None
        } else {
            Some(PatternMatcher::new(exclude_patterns)?)
        };

        Ok(Self {
            include_matcher,
            exclude_matcher,
        })
    }

    /// Whether the walk should descend into or report `path`
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude_matcher
            .as_ref()
            .is_some_and(|exclude| exclude.matches(path))
    }

    /// Rules:
    /// 1. excluded -> false
    /// 2. no include patterns -> true
    /// 3. otherwise the include patterns decide
    pub fn should_include(&self, path: &Path) -> bool {
        if self.is_excluded(path) {
            return false;
        }

        match self.include_matcher {
            Some(ref include) => include.matches(path),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_discovery::DEFAULT_EXCLUDES;

    #[test]
    fn test_pattern_matcher_basic() {
        let matcher = PatternMatcher::new(&["*.car"]).unwrap();

        assert!(matcher.matches(Path::new("bafyabc.car")));
        assert!(matcher.matches(Path::new("dataset/bafyabc.car")));
        assert!(!matcher.matches(Path::new("bafyabc.car.tmp")));
        assert_eq!(matcher.patterns(), ["*.car"]);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = PatternMatcher::new(&["[unterminated"]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPattern(_)));
    }

    #[test]
    fn test_default_excludes_cover_lost_and_found() {
        let filter = FileFilter::new(&["**/*.car"], DEFAULT_EXCLUDES).unwrap();

        assert!(filter.is_excluded(Path::new("lost+found")));
        assert!(filter.is_excluded(Path::new("lost+found/#1234")));
        assert!(!filter.should_include(Path::new("lost+found/bafyabc.car")));
        assert!(filter.should_include(Path::new("set-a/bafyabc.car")));
    }

    #[test]
    fn test_file_filter_exclude_overrides() {
        let filter = FileFilter::new(&["**/*.car"], &["staging/**"]).unwrap();

        assert!(filter.should_include(Path::new("a/bafyabc.car")));
        assert!(!filter.should_include(Path::new("staging/bafyabc.car")));
    }

    #[test]
    fn test_file_filter_no_patterns() {
        let empty: [&str; 0] = [];
        let filter = FileFilter::new(&empty, &empty).unwrap();

        assert!(filter.should_include(Path::new("anything.bin")));
        assert!(!filter.is_excluded(Path::new("lost+found")));
    }
}
