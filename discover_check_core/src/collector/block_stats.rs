//! Layering collector tallying the blocks forwarded to it
//!
//! Only leaves count towards the tallies. The head root forwarded at flush
//! time covers the same bytes, so it just names the layer.

use super::{ChunkDescriptor, Collector, CollectorConfig, require_position};
use crate::block::{BlockHeader, Cid};
use crate::{Error, Result, error::InternalError};
use log::debug;

pub const NAME: &str = "block-stats";

#[derive(Debug, Default)]
pub struct BlockStats {
    position: usize,
    blocks: u64,
    placeholders: u64,
    size_raw: u64,
    size_stored: u64,
    head_root: Option<Cid>,
}

impl Collector for BlockStats {
    fn name(&self) -> &str {
        NAME
    }

    fn append_data(&mut self, _chunk: &ChunkDescriptor) -> Result<BlockHeader> {
        Err(Error::Internal(InternalError::assertion(format!(
            "{NAME} consumes forwarded blocks only"
        ))))
    }

    fn append_block(&mut self, header: &BlockHeader) -> Result<()> {
        self.blocks += 1;
        if header.is_placeholder() {
            self.placeholders += 1;
        }
        self.size_raw += header.size_raw;
        self.size_stored += header.size_stored;
        Ok(())
    }

    fn append_root(&mut self, root: &BlockHeader) -> Result<()> {
        self.head_root = root.content_id;
        Ok(())
    }

    fn flush_state(self: Box<Self>) -> Result<BlockHeader> {
        debug!(
            "{NAME} #{}: {} blocks ({} placeholders), {} raw / {} stored bytes",
            self.position, self.blocks, self.placeholders, self.size_raw, self.size_stored
        );
        Ok(BlockHeader::new(self.head_root, self.size_raw, self.size_stored))
    }
}

pub(super) fn initialize(
    args: &[String],
    config: &CollectorConfig,
) -> std::result::Result<Box<dyn Collector>, Vec<String>> {
    require_position(config, false)?;
    if !args.is_empty() {
        return Err(vec![format!("takes no arguments, got: {}", args.join(", "))]);
    }
    Ok(Box::new(BlockStats {
        position: config.chain_position,
        ..BlockStats::default()
    }))
}
