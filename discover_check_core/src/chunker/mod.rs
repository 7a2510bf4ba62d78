//! Chunking policies and the chunker chain
//!
//! A chunker decides chunk boundaries over a [`RegionSource`]. Chunkers can be
//! chained: every stage after the first re-chunks the previous stage's output
//! as if it were a fresh byte stream.

pub mod fixed_size;

use crate::ringbuf::{ByteRegion, RegionSource};
use crate::{Error, Result, error::ConfigError, error::InternalError};
use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub use fixed_size::FixedSizeChunker;

/// A chunking policy instance
pub trait Chunker: Send {
    /// Produce the next chunk, or `None` once the source is drained
    fn next_chunk(&mut self, source: &mut dyn RegionSource) -> Result<Option<ByteRegion>>;
}

/// Size bounds a chunker instance promises to honor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceConstants {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

/// Per-instance settings handed to a chunker initializer
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkerConfig {
    pub is_last_in_chain: bool,
}

/// Chunker constructor as stored in the registry
pub type ChunkerInitializer = fn(
    &[String],
    &ChunkerConfig,
) -> std::result::Result<(Box<dyn Chunker>, InstanceConstants), Vec<String>>;

static CHUNKERS: Lazy<HashMap<&'static str, ChunkerInitializer>> = Lazy::new(|| {
    let mut registry: HashMap<&'static str, ChunkerInitializer> = HashMap::new();
    registry.insert(fixed_size::NAME, fixed_size::initialize);
    registry
});

/// Names of every registered chunker, sorted
pub fn available_chunkers() -> Vec<&'static str> {
    let mut names: Vec<_> = CHUNKERS.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Split `fixed-size_1040384` into its name and argument list
pub fn split_spec(spec: &str) -> (&str, Vec<String>) {
    let mut parts = spec.split('_');
    let name = parts.next().unwrap_or_default();
    (name, parts.map(str::to_string).collect())
}

struct Stage {
    spec: String,
    chunker: Box<dyn Chunker>,
    constants: InstanceConstants,
    /// Upstream bytes not yet handed to this stage
    carry: ByteRegion,
    short_emitted: bool,
}

/// Ordered chunker stages, driven as one
pub struct ChunkerChain {
    stages: Vec<Stage>,
}

impl ChunkerChain {
    /// Resolve every spec by name and validate adjacent size bounds
    pub fn from_specs(specs: &[String]) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::Config(ConfigError::invalid_configuration(
                "at least one chunker is required",
            )));
        }

        let mut stages: Vec<Stage> = Vec::with_capacity(specs.len());
        for (position, spec) in specs.iter().enumerate() {
            let (name, args) = split_spec(spec);
            let initialize = CHUNKERS
                .get(name)
                .ok_or_else(|| Error::Config(ConfigError::unknown_chunker(name)))?;

            let config = ChunkerConfig {
                is_last_in_chain: position + 1 == specs.len(),
            };
            let (chunker, constants) = initialize(&args, &config)
                .map_err(|errors| Error::Config(ConfigError::initialization(spec, errors)))?;

            if let Some(upstream) = stages.last() {
                if constants.min_chunk_size < upstream.constants.max_chunk_size {
                    return Err(Error::Config(ConfigError::ChainBounds {
                        upstream: upstream.spec.clone(),
                        upstream_max: upstream.constants.max_chunk_size,
                        downstream: spec.clone(),
                        downstream_min: constants.min_chunk_size,
                    }));
                }
            }

            debug!(
                "chunker #{position} '{spec}' bounds {}..={}",
                constants.min_chunk_size, constants.max_chunk_size
            );
            stages.push(Stage {
                spec: spec.clone(),
                chunker,
                constants,
                carry: ByteRegion::empty(),
                short_emitted: false,
            });
        }

        Ok(Self { stages })
    }

    /// Largest chunk the final stage can produce
    pub fn max_result_size(&self) -> usize {
        self.stages
            .last()
            .map_or(0, |stage| stage.constants.max_chunk_size)
    }

    /// Largest region any stage will request from the ring
    pub fn max_region_size(&self) -> usize {
        self.stages
            .first()
            .map_or(0, |stage| stage.constants.max_chunk_size)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Pull the next chunk out of the last stage
    pub fn next_chunk(&mut self, source: &mut dyn RegionSource) -> Result<Option<ByteRegion>> {
        pull(&mut self.stages, source)
    }
}

fn pull(stages: &mut [Stage], source: &mut dyn RegionSource) -> Result<Option<ByteRegion>> {
    let Some((stage, upstream)) = stages.split_last_mut() else {
        return Ok(None);
    };

    let Stage {
        spec,
        chunker,
        constants,
        carry,
        short_emitted,
    } = stage;

    let chunk = if upstream.is_empty() {
        chunker.next_chunk(source)?
    } else {
        let mut rechunk = UpstreamSource {
            stages: upstream,
            source,
            carry,
        };
        chunker.next_chunk(&mut rechunk)?
    };

    let Some(chunk) = chunk else {
        return Ok(None);
    };

    if chunk.is_empty() {
        return Err(Error::Internal(InternalError::chunk_bounds(
            spec,
            "emitted an empty chunk",
        )));
    }
    if chunk.len() > constants.max_chunk_size {
        return Err(Error::Internal(InternalError::chunk_bounds(
            spec,
            format!(
                "chunk of {} bytes exceeds maximum {}",
                chunk.len(),
                constants.max_chunk_size
            ),
        )));
    }
    if *short_emitted {
        return Err(Error::Internal(InternalError::chunk_bounds(
            spec,
            "emitted a chunk after a short final chunk",
        )));
    }
    if chunk.len() < constants.min_chunk_size {
        *short_emitted = true;
    }

    Ok(Some(chunk))
}

/// Presents an upstream stage's chunk stream as a byte stream
struct UpstreamSource<'a> {
    stages: &'a mut [Stage],
    source: &'a mut dyn RegionSource,
    carry: &'a mut ByteRegion,
}

impl RegionSource for UpstreamSource<'_> {
    fn next_region(&mut self, _min: usize, max: usize) -> Result<Option<ByteRegion>> {
        while self.carry.len() < max {
            match pull(self.stages, self.source)? {
                Some(chunk) => self.carry.append(chunk),
                None => break,
            }
        }
        if self.carry.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.carry.split_to(max)))
    }
}
