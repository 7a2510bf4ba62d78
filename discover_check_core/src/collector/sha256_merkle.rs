//! Plain SHA-256 binary Merkle tree over chunks
//!
//! Each chunk becomes a raw-codec CIDv1 leaf; leaves pair up with SHA-256 and a
//! dangling node is promoted unchanged.

use super::accumulator::{Accumulator, Combiner, PaddingRule};
use super::{ChunkDescriptor, Collector, CollectorConfig, require_position};
use crate::block::{BlockHeader, CODEC_RAW, MH_SHA2_256, cid_v1};
use crate::{Error, Result, error::InternalError};
use sha2::{Digest, Sha256};

pub const NAME: &str = "sha256-merkle";

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Pair;

impl Combiner for Sha256Pair {
    type Node = [u8; 32];

    fn combine(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(left);
        hasher.update(right);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }
}

pub struct Sha256Merkle {
    tree: Accumulator<Sha256Pair>,
    bytes: u64,
}

impl Sha256Merkle {
    pub fn new() -> Self {
        Self {
            tree: Accumulator::new(Sha256Pair, PaddingRule::Promote),
            bytes: 0,
        }
    }
}

impl Default for Sha256Merkle {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for Sha256Merkle {
    fn name(&self) -> &str {
        NAME
    }

    fn append_data(&mut self, chunk: &ChunkDescriptor) -> Result<BlockHeader> {
        let mut hasher = Sha256::new();
        for slice in chunk.region.slices() {
            hasher.update(slice);
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());

        self.tree.push_leaf(digest)?;
        let size = chunk.len() as u64;
        self.bytes += size;
        Ok(BlockHeader::new(
            Some(cid_v1(CODEC_RAW, MH_SHA2_256, &digest)?),
            size,
            size,
        ))
    }

    fn append_block(&mut self, _header: &BlockHeader) -> Result<()> {
        Err(Error::Internal(InternalError::assertion(format!(
            "{NAME} consumes raw chunks only"
        ))))
    }

    fn flush_state(self: Box<Self>) -> Result<BlockHeader> {
        let bytes = self.bytes;
        // empty input hashes like an empty chunk
        let node = match self.tree.finish() {
            Some(root) => root.node,
            None => {
                let mut empty = [0u8; 32];
                empty.copy_from_slice(&Sha256::digest(b""));
                empty
            }
        };
        Ok(BlockHeader::new(
            Some(cid_v1(CODEC_RAW, MH_SHA2_256, &node)?),
            bytes,
            bytes,
        ))
    }
}

pub(super) fn initialize(
    args: &[String],
    config: &CollectorConfig,
) -> std::result::Result<Box<dyn Collector>, Vec<String>> {
    require_position(config, true)?;
    if !args.is_empty() {
        return Err(vec![format!("takes no arguments, got: {}", args.join(", "))]);
    }
    Ok(Box::new(Sha256Merkle::new()))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{chunk, config};
    use super::*;

    fn run(pieces: &[&[u8]]) -> (Vec<BlockHeader>, BlockHeader) {
        let mut collector = initialize(&[], &config(0, 0)).unwrap();
        let mut offset = 0;
        let leaves = pieces
            .iter()
            .map(|piece| {
                let leaf = collector.append_data(&chunk(offset, piece)).unwrap();
                offset += piece.len() as u64;
                leaf
            })
            .collect();
        (leaves, collector.flush_state().unwrap())
    }

    #[test]
    fn test_single_leaf_root_equals_leaf() {
        let (leaves, root) = run(&[b"only chunk"]);
        assert_eq!(leaves[0].content_id, root.content_id);
    }

    #[test]
    fn test_three_leaves_promote_dangling() {
        let (leaves, root) = run(&[b"a", b"b", b"c"]);
        let digest = |h: &BlockHeader| -> [u8; 32] { h.digest().try_into().unwrap() };

        let ab = Sha256Pair.combine(&digest(&leaves[0]), &digest(&leaves[1]));
        let expected = Sha256Pair.combine(&ab, &digest(&leaves[2]));
        assert_eq!(root.digest(), &expected);
        assert_eq!(root.size_raw, 3);
    }

    #[test]
    fn test_empty_input() {
        let (_, root) = run(&[]);
        assert_eq!(root.digest(), Sha256::digest(b"").as_slice());
        assert_eq!(root.size_raw, 0);
    }

    #[test]
    fn test_same_bytes_same_root() {
        let (_, first) = run(&[b"abc", b"def"]);
        let (_, second) = run(&[b"abc", b"def"]);
        assert_eq!(first, second);
    }
}
