//! Single-pass chunk-and-commit engine
//!
//! An [`Engine`] owns one chunker chain and one collector chain. It runs
//! exactly one pass over a reader, flushes the collectors into a root
//! commitment, and is then destroyed, which closes the shutdown signal and
//! waits for any background hashers the collectors started.

mod stats;

pub use stats::{SeenRoots, StatSummary};

use crate::block::BlockHeader;
use crate::chunker::ChunkerChain;
use crate::collector::{
    self, ChunkDescriptor, CollectorChain, CollectorConfig, CollectorInitializer,
};
use crate::ringbuf::{DEFAULT_QUANTUM, QuantizedRingBuffer};
use crate::workers::{ShutdownTrigger, WorkerGroup, shutdown_channel};
use crate::{Error, Result, error::InternalError};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Shortest root digest the validator can compare against a catalog
pub const MIN_ROOT_DIGEST: usize = 16;

/// Name-based engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunkers: Vec<String>,
    pub collectors: Vec<String>,
    pub async_hashers: usize,
    pub ring_quantum: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunkers: vec![format!(
                "fixed-size_{}",
                collector::fil_commp::DEFAULT_CHUNK_SIZE
            )],
            collectors: vec![collector::fil_commp::NAME.to_string()],
            async_hashers: 0,
            ring_quantum: DEFAULT_QUANTUM,
        }
    }
}

/// Lifecycle of an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Constructed,
    Running,
    Flushed,
    Destroyed,
}

struct Teardown {
    trigger: ShutdownTrigger,
    destroyed: bool,
}

pub struct Engine {
    state: EngineState,
    chunkers: Option<ChunkerChain>,
    collectors: Option<CollectorChain>,
    ring_quantum: usize,
    stats: StatSummary,
    seen_roots: Option<Arc<SeenRoots>>,
    workers: WorkerGroup,
    /// Only the destroy path locks this; the pass itself goes through `get_mut`
    teardown: Mutex<Teardown>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::builder().config(config.clone()).build()
    }

    pub fn state(&self) -> EngineState {
        if self.lock_teardown().destroyed {
            EngineState::Destroyed
        } else {
            self.state
        }
    }

    /// Counters of the finished pass
    pub fn stats(&self) -> &StatSummary {
        &self.stats
    }

    /// Background workers still running
    pub fn active_workers(&self) -> usize {
        self.workers.active()
    }

    /// Run the single pass over `reader` and return the root header
    pub fn process_reader<R: Read>(&mut self, reader: R) -> Result<BlockHeader> {
        let teardown = self
            .teardown
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if teardown.destroyed {
            return Err(Error::Internal(InternalError::lifecycle(
                "engine used after destroy",
            )));
        }
        if self.state != EngineState::Constructed {
            return Err(Error::Internal(InternalError::lifecycle(
                "engine already ran its single pass",
            )));
        }

        self.state = EngineState::Running;
        let result = self.drive(reader);
        self.state = EngineState::Flushed;
        result
    }

    fn drive<R: Read>(&mut self, reader: R) -> Result<BlockHeader> {
        let (Some(mut chunkers), Some(mut collectors)) =
            (self.chunkers.take(), self.collectors.take())
        else {
            return Err(Error::Internal(InternalError::lifecycle(
                "engine chains already consumed",
            )));
        };

        let started = Instant::now();
        let sectors = QuantizedRingBuffer::<R>::sectors_for(
            chunkers.max_region_size(),
            self.ring_quantum,
        );
        let mut ring = QuantizedRingBuffer::new(reader, self.ring_quantum, sectors)?;

        let mut offset = 0u64;
        while let Some(region) = chunkers.next_chunk(&mut ring)? {
            let len = region.len() as u64;
            let chunk = ChunkDescriptor { offset, region };
            self.stats.blocks_produced += collectors.append_chunk(&chunk)?;
            self.stats.chunks_emitted += 1;
            offset += len;
            trace!("chunk #{} at {offset}", self.stats.chunks_emitted);
        }
        self.stats.bytes_seen = offset;
        self.stats.ring = ring.stats();

        let layers = collectors.flush()?;
        self.stats.blocks_produced += layers.len() as u64;

        let Some(root) = layers.first().cloned() else {
            return Err(Error::Internal(InternalError::assertion(
                "collector chain produced no root",
            )));
        };
        if root.digest().len() < MIN_ROOT_DIGEST {
            return Err(Error::Internal(InternalError::assertion(format!(
                "root digest of {} bytes is shorter than {MIN_ROOT_DIGEST}",
                root.digest().len()
            ))));
        }

        if let (Some(seen), Some(cid)) = (&self.seen_roots, &root.content_id) {
            self.stats.duplicate_root = !seen.insert(cid);
        }
        self.stats.layer_roots = layers;
        self.stats.elapsed = started.elapsed();

        debug!(
            "pass complete: {} bytes, {} chunks, {} sectors ({} reused) in {:?}",
            self.stats.bytes_seen,
            self.stats.chunks_emitted,
            self.stats.ring.sectors_filled,
            self.stats.ring.sectors_reused,
            self.stats.elapsed
        );
        Ok(root)
    }

    /// Close the shutdown signal and wait for every background worker
    ///
    /// Fails when called a second time.
    pub fn destroy(&self) -> Result<()> {
        {
            let mut teardown = self.lock_teardown();
            if teardown.destroyed {
                return Err(Error::Internal(InternalError::lifecycle(
                    "engine destroyed twice",
                )));
            }
            teardown.trigger.close();
            teardown.destroyed = true;
        }
        self.workers.wait();
        Ok(())
    }

    fn lock_teardown(&self) -> std::sync::MutexGuard<'_, Teardown> {
        self.teardown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let destroyed = self
            .teardown
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .destroyed;
        if !destroyed {
            let _ = self.destroy();
        }
    }
}

/// Assembles an [`Engine`] from names
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    seen_roots: Option<Arc<SeenRoots>>,
    extra_collectors: HashMap<String, CollectorInitializer>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn chunkers<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.chunkers = specs.into_iter().map(Into::into).collect();
        self
    }

    pub fn collectors<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.collectors = specs.into_iter().map(Into::into).collect();
        self
    }

    pub fn async_hashers(mut self, count: usize) -> Self {
        self.config.async_hashers = count;
        self
    }

    pub fn ring_quantum(mut self, bytes: usize) -> Self {
        self.config.ring_quantum = bytes;
        self
    }

    /// Share a duplicate-root registry with other engines
    pub fn seen_roots(mut self, seen: Arc<SeenRoots>) -> Self {
        self.seen_roots = Some(seen);
        self
    }

    /// Make an extra collector available by name, taking precedence over built-ins
    pub fn register_collector(mut self, name: &str, initialize: CollectorInitializer) -> Self {
        self.extra_collectors.insert(name.to_string(), initialize);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let chunkers = ChunkerChain::from_specs(&self.config.chunkers)?;
        let (trigger, shutdown) = shutdown_channel();
        let workers = WorkerGroup::new();

        let template = CollectorConfig {
            chain_position: 0,
            async_hashers: self.config.async_hashers,
            shutdown,
            workers: workers.clone(),
            has_next: false,
            chunker_chain_max_result: chunkers.max_result_size(),
        };
        let extra = &self.extra_collectors;
        let collectors = CollectorChain::build(
            &self.config.collectors,
            |name| extra.get(name).copied().or_else(|| collector::lookup(name)),
            &template,
        )?;

        debug!(
            "engine built: chunkers {:?}, collectors {:?}, {} async hashers",
            self.config.chunkers, self.config.collectors, self.config.async_hashers
        );

        Ok(Engine {
            state: EngineState::Constructed,
            chunkers: Some(chunkers),
            collectors: Some(collectors),
            ring_quantum: self.config.ring_quantum,
            stats: StatSummary::default(),
            seen_roots: self.seen_roots,
            workers,
            teardown: Mutex::new(Teardown {
                trigger,
                destroyed: false,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::io::Cursor;

    fn small_engine() -> Engine {
        Engine::builder()
            .chunkers(["fixed-size_1016"])
            .collectors(["fil-commP"])
            .ring_quantum(512)
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.chunkers, vec!["fixed-size_1040384".to_string()]);
        assert_eq!(config.collectors, vec!["fil-commP".to_string()]);
        assert_eq!(config.ring_quantum, 1 << 20);
    }

    #[test]
    fn test_single_pass_only() {
        let mut engine = small_engine();
        assert_eq!(engine.state(), EngineState::Constructed);

        let root = engine.process_reader(Cursor::new(vec![1u8; 5000])).unwrap();
        assert!(root.content_id.is_some());
        assert_eq!(engine.state(), EngineState::Flushed);
        assert_eq!(engine.stats().bytes_seen, 5000);
        assert_eq!(engine.stats().chunks_emitted, 5);

        let err = engine
            .process_reader(Cursor::new(vec![1u8; 5000]))
            .unwrap_err();
        assert!(matches!(err, Error::Internal(InternalError::Lifecycle { .. })));
    }

    #[test]
    fn test_use_after_destroy() {
        let mut engine = small_engine();
        engine.destroy().unwrap();
        assert_eq!(engine.state(), EngineState::Destroyed);

        let err = engine.process_reader(Cursor::new(vec![0u8; 100])).unwrap_err();
        assert!(matches!(err, Error::Internal(InternalError::Lifecycle { .. })));
        assert!(engine.destroy().is_err());
    }

    #[test]
    fn test_failed_pass_still_consumes_engine() {
        let mut engine = small_engine();
        // below the commitment minimum
        assert!(engine.process_reader(Cursor::new(vec![0u8; 10])).is_err());
        assert_eq!(engine.state(), EngineState::Flushed);
    }

    #[test]
    fn test_config_errors_surface_at_build() {
        let result = Engine::builder().chunkers(["fixed-size_0"]).build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::Initialization { .. }))
        ));

        let result = Engine::builder().collectors(["nope"]).build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::UnknownCollector { .. }))
        ));
    }

    #[test]
    fn test_duplicate_roots_flagged() {
        let seen = Arc::new(SeenRoots::new());
        let run = |data: Vec<u8>| {
            let mut engine = Engine::builder()
                .chunkers(["fixed-size_1016"])
                .seen_roots(Arc::clone(&seen))
                .build()
                .unwrap();
            engine.process_reader(Cursor::new(data)).unwrap();
            engine.stats().duplicate_root
        };

        assert!(!run(vec![3u8; 2000]));
        assert!(run(vec![3u8; 2000]));
        assert!(!run(vec![4u8; 2000]));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_layer_roots_recorded() {
        let mut engine = Engine::builder()
            .chunkers(["fixed-size_1016"])
            .collectors(["fil-commP", "block-stats"])
            .build()
            .unwrap();
        let root = engine.process_reader(Cursor::new(vec![9u8; 3000])).unwrap();

        let layers = &engine.stats().layer_roots;
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0], root);
        assert_eq!(layers[1].size_raw, 3000);
        assert_eq!(layers[1].content_id, root.content_id);
    }
}
