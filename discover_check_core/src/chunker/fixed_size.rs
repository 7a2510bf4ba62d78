//! Fixed-size chunking: every chunk is exactly `size` bytes except a shorter final one

use super::{Chunker, ChunkerConfig, InstanceConstants};
use crate::Result;
use crate::ringbuf::{ByteRegion, RegionSource};

pub const NAME: &str = "fixed-size";

/// Refuse sizes that could not reasonably fit in memory as a single chunk
const MAX_SIZE: usize = 1 << 30;

#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    size: usize,
}

impl FixedSizeChunker {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Chunker for FixedSizeChunker {
    fn next_chunk(&mut self, source: &mut dyn RegionSource) -> Result<Option<ByteRegion>> {
        source.next_region(self.size, self.size)
    }
}

pub(super) fn initialize(
    args: &[String],
    _config: &ChunkerConfig,
) -> std::result::Result<(Box<dyn Chunker>, InstanceConstants), Vec<String>> {
    let size = match args {
        [size] => size
            .parse::<usize>()
            .map_err(|e| vec![format!("invalid chunk size '{size}': {e}")])?,
        [] => return Err(vec!["chunk size argument is required".to_string()]),
        [_, extra @ ..] => {
            return Err(vec![format!(
                "unexpected argument(s): {}",
                extra.join(", ")
            )]);
        }
    };

    let mut errors = Vec::new();
    if size == 0 {
        errors.push("chunk size must be positive".to_string());
    }
    if size > MAX_SIZE {
        errors.push(format!("chunk size {size} exceeds the {MAX_SIZE} byte limit"));
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok((
        Box::new(FixedSizeChunker::new(size)),
        InstanceConstants {
            min_chunk_size: size,
            max_chunk_size: size,
        },
    ))
}
