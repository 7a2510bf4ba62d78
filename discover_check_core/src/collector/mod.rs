//! Collectors reduce a chunk stream into a single commitment
//!
//! Collectors form a chain. The head (position 0) consumes raw chunks; every
//! later position consumes the block headers forwarded by its predecessor. A
//! collector is consumed by [`Collector::flush_state`], so nothing can be
//! appended to it once its root has been produced.

pub mod accumulator;
pub mod block_stats;
pub mod fil_commp;
pub mod hasher_pool;
pub mod sha256_merkle;

use crate::block::BlockHeader;
use crate::ringbuf::ByteRegion;
use crate::workers::{ShutdownSignal, WorkerGroup};
use crate::{Error, Result, error::ConfigError};
use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub use accumulator::{Accumulator, Combiner, PaddingRule, TreeRoot};

/// A chunk as handed to the head collector
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    /// Logical offset of the first byte in the stream
    pub offset: u64,
    pub region: ByteRegion,
}

impl ChunkDescriptor {
    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }
}

/// Everything a collector instance is told about its surroundings
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub chain_position: usize,
    pub async_hashers: usize,
    pub shutdown: ShutdownSignal,
    pub workers: WorkerGroup,
    pub has_next: bool,
    pub chunker_chain_max_result: usize,
}

pub trait Collector: Send {
    /// Registered name
    fn name(&self) -> &str;

    /// Reduce one raw chunk into a leaf header (head of chain only)
    fn append_data(&mut self, chunk: &ChunkDescriptor) -> Result<BlockHeader>;

    /// Absorb a header forwarded from upstream (positions above zero only)
    fn append_block(&mut self, header: &BlockHeader) -> Result<()>;

    /// Absorb the head collector's root, forwarded once right before flushing
    ///
    /// The root summarizes leaves already passed to [`Collector::append_block`].
    fn append_root(&mut self, root: &BlockHeader) -> Result<()> {
        self.append_block(root)
    }

    /// Finalize into the root header
    fn flush_state(self: Box<Self>) -> Result<BlockHeader>;
}

/// Collector constructor as stored in the registry
pub type CollectorInitializer =
    fn(&[String], &CollectorConfig) -> std::result::Result<Box<dyn Collector>, Vec<String>>;

static COLLECTORS: Lazy<HashMap<&'static str, CollectorInitializer>> = Lazy::new(|| {
    let mut registry: HashMap<&'static str, CollectorInitializer> = HashMap::new();
    registry.insert(fil_commp::NAME, fil_commp::initialize);
    registry.insert(sha256_merkle::NAME, sha256_merkle::initialize);
    registry.insert(block_stats::NAME, block_stats::initialize);
    registry
});

/// Names of every built-in collector, sorted
pub fn available_collectors() -> Vec<&'static str> {
    let mut names: Vec<_> = COLLECTORS.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Look up a built-in collector initializer
pub fn lookup(name: &str) -> Option<CollectorInitializer> {
    COLLECTORS.get(name).copied()
}

/// Ordered collectors; forwards headers downstream and flushes head first
pub struct CollectorChain {
    collectors: Vec<Box<dyn Collector>>,
}

impl CollectorChain {
    /// Instantiate `specs` in order, resolving names through `resolve`
    pub fn build<F>(
        specs: &[String],
        resolve: F,
        template: &CollectorConfig,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<CollectorInitializer>,
    {
        if specs.is_empty() {
            return Err(Error::Config(ConfigError::invalid_configuration(
                "at least one collector is required",
            )));
        }

        let mut collectors = Vec::with_capacity(specs.len());
        for (position, spec) in specs.iter().enumerate() {
            let (name, args) = crate::chunker::split_spec(spec);
            let initialize =
                resolve(name).ok_or_else(|| Error::Config(ConfigError::unknown_collector(name)))?;
            let config = CollectorConfig {
                chain_position: position,
                has_next: position + 1 < specs.len(),
                ..template.clone()
            };
            let collector = initialize(&args, &config)
                .map_err(|errors| Error::Config(ConfigError::initialization(spec, errors)))?;
            debug!("collector #{position} '{spec}' ready");
            collectors.push(collector);
        }

        Ok(Self { collectors })
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Feed one chunk to the head and forward the resulting leaf
    ///
    /// Returns the number of headers produced along the chain.
    pub fn append_chunk(&mut self, chunk: &ChunkDescriptor) -> Result<u64> {
        let Some((head, rest)) = self.collectors.split_first_mut() else {
            return Ok(0);
        };
        let leaf = head.append_data(chunk)?;
        for downstream in rest.iter_mut() {
            downstream.append_block(&leaf)?;
        }
        Ok(1)
    }

    /// Flush every collector, head first
    ///
    /// The head's root is forwarded to all downstream collectors through
    /// [`Collector::append_root`] before they flush. Returns the per-layer
    /// roots in chain order.
    pub fn flush(self) -> Result<Vec<BlockHeader>> {
        let mut layers = Vec::with_capacity(self.collectors.len());
        let mut collectors = self.collectors.into_iter();

        let Some(head) = collectors.next() else {
            return Ok(layers);
        };
        let head_root = head.flush_state()?;

        for mut downstream in collectors {
            downstream.append_root(&head_root)?;
            layers.push(downstream.flush_state()?);
        }
        layers.insert(0, head_root);
        Ok(layers)
    }
}

/// Reject chain positions a collector cannot serve
pub(crate) fn require_position(
    config: &CollectorConfig,
    head: bool,
) -> std::result::Result<(), Vec<String>> {
    match (head, config.chain_position) {
        (true, 0) => Ok(()),
        (true, position) => Err(vec![format!(
            "consumes raw chunks and must be first in the chain, not at position {position}"
        )]),
        (false, 0) => Err(vec![
            "consumes forwarded blocks and cannot be first in the chain".to_string(),
        ]),
        (false, _) => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::workers::shutdown_channel;

    pub fn config(position: usize, async_hashers: usize) -> CollectorConfig {
        let (trigger, shutdown) = shutdown_channel();
        // keep the signal open for the lifetime of the test process
        std::mem::forget(trigger);
        CollectorConfig {
            chain_position: position,
            async_hashers,
            shutdown,
            workers: WorkerGroup::new(),
            has_next: false,
            chunker_chain_max_result: 1 << 20,
        }
    }

    pub fn chunk(offset: u64, data: &[u8]) -> ChunkDescriptor {
        ChunkDescriptor {
            offset,
            region: ByteRegion::from_vec(data.to_vec()),
        }
    }
}
