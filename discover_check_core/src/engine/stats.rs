//! Pass statistics and the cross-engine duplicate root registry

use crate::block::{BlockHeader, Cid};
use crate::ringbuf::RingStats;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// What one pass observed
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatSummary {
    pub bytes_seen: u64,
    pub chunks_emitted: u64,
    pub blocks_produced: u64,
    pub ring: RingStats,
    /// Flushed root of every collector, in chain order
    pub layer_roots: Vec<BlockHeader>,
    pub duplicate_root: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

static GLOBAL_SEEN: Lazy<Arc<SeenRoots>> = Lazy::new(|| Arc::new(SeenRoots::new()));

/// Thread-safe set of root identifiers produced so far
#[derive(Debug, Default)]
pub struct SeenRoots {
    roots: Mutex<HashSet<Cid>>,
}

impl SeenRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process
    pub fn global() -> Arc<SeenRoots> {
        Arc::clone(&GLOBAL_SEEN)
    }

    /// Record `cid`; returns `false` when it had been seen before
    pub fn insert(&self, cid: &Cid) -> bool {
        self.roots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*cid)
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.roots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(cid)
    }

    pub fn len(&self) -> usize {
        self.roots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
