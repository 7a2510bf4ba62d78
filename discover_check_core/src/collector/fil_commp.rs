//! Filecoin unsealed piece commitment (commP)
//!
//! Every 127 input bytes are Fr32-expanded into 128 bytes (four 32-byte leaves
//! whose top two bits are always clear). Leaves are combined with SHA-256,
//! truncated to 254 bits, and the tree is completed with all-zero subtrees up
//! to the next power of two. A trailing partial quad is zero-filled first.

use super::accumulator::{Accumulator, Combiner, PaddingRule, aligned_runs};
use super::hasher_pool::HasherPool;
use super::{ChunkDescriptor, Collector, CollectorConfig, require_position};
use crate::block::{
    BlockHeader, CODEC_FIL_COMMITMENT_UNSEALED, MH_SHA2_256_TRUNC254_PADDED, cid_v1,
};
use crate::{Error, Result, error::InternalError};
use log::debug;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const NAME: &str = "fil-commP";

/// Unpadded bytes per Fr32 quad
pub const QUAD_IN: usize = 127;
/// Padded bytes per Fr32 quad
pub const QUAD_OUT: usize = 128;
pub const LEAF_SIZE: usize = 32;
const LEAVES_PER_QUAD: u64 = (QUAD_OUT / LEAF_SIZE) as u64;

/// Smallest payload a piece commitment is defined for
pub const MIN_PAYLOAD: u64 = 65;

/// Chunk size that keeps every chunk a single aligned subtree: 127 * 8192
pub const DEFAULT_CHUNK_SIZE: usize = 1_040_384;

/// Largest chunk accepted from the chunker chain
const MAX_CHUNK: usize = 256 << 20;

const MAX_LEVELS: usize = 64;

pub type Node = [u8; LEAF_SIZE];

/// Roots of the all-zero subtrees, indexed by level
static ZERO_SUBTREES: Lazy<Vec<Node>> = Lazy::new(|| {
    let mut zeros = Vec::with_capacity(MAX_LEVELS);
    let mut node = [0u8; LEAF_SIZE];
    for _ in 0..MAX_LEVELS {
        zeros.push(node);
        node = trunc254_pair(&node, &node);
    }
    zeros
});

/// SHA-256 of `left || right` with the two most significant bits of the last byte cleared
pub fn trunc254_pair(left: &Node, right: &Node) -> Node {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let mut out = [0u8; LEAF_SIZE];
    out.copy_from_slice(&hasher.finalize());
    out[31] &= 0x3f;
    out
}

/// Spread 127 bytes over 128 so each 32-byte word stays below the field modulus
pub fn fr32_expand(input: &[u8], out: &mut [u8]) {
    debug_assert_eq!(input.len(), QUAD_IN);
    debug_assert_eq!(out.len(), QUAD_OUT);

    out[..32].copy_from_slice(&input[..32]);
    out[31] &= 0x3f;

    for i in 31..63 {
        out[i + 1] = (input[i + 1] << 2) | (input[i] >> 6);
    }
    out[63] &= 0x3f;

    for i in 63..95 {
        out[i + 1] = (input[i + 1] << 4) | (input[i] >> 4);
    }
    out[95] &= 0x3f;

    for i in 95..126 {
        out[i + 1] = (input[i + 1] << 6) | (input[i] >> 2);
    }
    out[127] = input[126] >> 2;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Trunc254;

impl Combiner for Trunc254 {
    type Node = Node;

    fn combine(&self, left: &Node, right: &Node) -> Node {
        trunc254_pair(left, right)
    }

    fn zero(&self, level: u32) -> Option<Node> {
        ZERO_SUBTREES.get(level as usize).copied()
    }
}

/// Hash expanded leaves starting at `start_leaf` into aligned subtree roots
fn hash_runs(start_leaf: u64, expanded: &[u8]) -> Result<Vec<(u32, Node)>> {
    let leaves = (expanded.len() / LEAF_SIZE) as u64;
    let mut offset = 0usize;
    let mut roots = Vec::new();

    for (level, width) in aligned_runs(start_leaf, leaves) {
        let mut run = Accumulator::new(Trunc254, PaddingRule::Promote);
        for _ in 0..width {
            let mut leaf = [0u8; LEAF_SIZE];
            leaf.copy_from_slice(&expanded[offset..offset + LEAF_SIZE]);
            run.push_leaf(leaf)?;
            offset += LEAF_SIZE;
        }
        if let Some(root) = run.finish() {
            roots.push((level, root.node));
        }
    }
    Ok(roots)
}

struct HashJob {
    sequence: u64,
    start_leaf: u64,
    expanded: Vec<u8>,
}

struct HashResult {
    sequence: u64,
    subtrees: Result<Vec<(u32, Node)>>,
}

fn run_job(job: HashJob) -> HashResult {
    HashResult {
        sequence: job.sequence,
        subtrees: hash_runs(job.start_leaf, &job.expanded),
    }
}

pub struct FilCommP {
    tree: Accumulator<Trunc254>,
    /// Input bytes short of a full quad
    carry: Vec<u8>,
    payload: u64,
    /// Leaves handed out so far, applied or not
    leaves_issued: u64,
    pool: Option<HasherPool<HashJob, HashResult>>,
    next_sequence: u64,
    next_apply: u64,
    reorder: BTreeMap<u64, Vec<(u32, Node)>>,
}

impl FilCommP {
    pub fn new() -> Self {
        Self {
            tree: Accumulator::new(Trunc254, PaddingRule::ZeroSubtree),
            carry: Vec::with_capacity(QUAD_IN),
            payload: 0,
            leaves_issued: 0,
            pool: None,
            next_sequence: 0,
            next_apply: 0,
            reorder: BTreeMap::new(),
        }
    }

    fn with_pool(config: &CollectorConfig) -> Result<Self> {
        let mut collector = Self::new();
        collector.pool = Some(HasherPool::spawn(
            NAME,
            config.async_hashers,
            &config.shutdown,
            &config.workers,
            run_job,
        )?);
        Ok(collector)
    }

    /// Fr32-expand the carry plus `chunk`, keeping any incomplete quad for later
    fn expand(&mut self, chunk: &ChunkDescriptor) -> Vec<u8> {
        let quads = (self.carry.len() + chunk.len()) / QUAD_IN;
        let mut expanded = vec![0u8; quads * QUAD_OUT];
        let mut written = 0;

        for mut slice in chunk.region.slices() {
            if !self.carry.is_empty() {
                let take = (QUAD_IN - self.carry.len()).min(slice.len());
                self.carry.extend_from_slice(&slice[..take]);
                slice = &slice[take..];
                if self.carry.len() < QUAD_IN {
                    continue;
                }
                fr32_expand(&self.carry, &mut expanded[written..written + QUAD_OUT]);
                written += QUAD_OUT;
                self.carry.clear();
            }

            let mut quads_in_slice = slice.chunks_exact(QUAD_IN);
            for quad in &mut quads_in_slice {
                fr32_expand(quad, &mut expanded[written..written + QUAD_OUT]);
                written += QUAD_OUT;
            }
            self.carry.extend_from_slice(quads_in_slice.remainder());
        }

        debug_assert_eq!(written, expanded.len());
        expanded
    }

    fn apply(&mut self, subtrees: Vec<(u32, Node)>) -> Result<()> {
        for (level, node) in subtrees {
            self.tree.push_subtree(level, node)?;
        }
        Ok(())
    }

    /// Apply queued async results that are next in sequence
    fn apply_ready(&mut self) -> Result<()> {
        while let Some(subtrees) = self.reorder.remove(&self.next_apply) {
            self.apply(subtrees)?;
            self.next_apply += 1;
        }
        Ok(())
    }

    fn collect_ready(&mut self) -> Result<()> {
        if let Some(pool) = &self.pool {
            for result in pool.ready() {
                let result = result?;
                self.reorder.insert(result.sequence, result.subtrees?);
            }
        }
        self.apply_ready()
    }

    /// Block until every submitted job has been applied
    fn drain_pool(&mut self) -> Result<()> {
        self.collect_ready()?;
        while self.next_apply < self.next_sequence {
            let Some(pool) = &self.pool else {
                break;
            };
            let result = pool.recv()?;
            self.reorder.insert(result.sequence, result.subtrees?);
            self.apply_ready()?;
        }
        if let Some(pool) = &mut self.pool {
            pool.close();
        }
        Ok(())
    }
}

impl Default for FilCommP {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for FilCommP {
    fn name(&self) -> &str {
        NAME
    }

    fn append_data(&mut self, chunk: &ChunkDescriptor) -> Result<BlockHeader> {
        self.payload += chunk.len() as u64;
        let expanded = self.expand(chunk);
        let size_raw = chunk.len() as u64;

        if expanded.is_empty() {
            return Ok(BlockHeader::placeholder(size_raw));
        }

        let start_leaf = self.leaves_issued;
        self.leaves_issued += (expanded.len() / LEAF_SIZE) as u64;
        let size_stored = expanded.len() as u64;

        if self.pool.is_some() {
            let job = HashJob {
                sequence: self.next_sequence,
                start_leaf,
                expanded,
            };
            self.next_sequence += 1;
            if let Some(pool) = &self.pool {
                pool.submit(job)?;
            }
            self.collect_ready()?;
            return Ok(BlockHeader::new(None, size_raw, size_stored));
        }

        let subtrees = hash_runs(start_leaf, &expanded)?;
        // a chunk covering exactly one aligned subtree has an identity of its own
        let content_id = match subtrees.as_slice() {
            [(_, node)] => Some(cid_v1(
                CODEC_FIL_COMMITMENT_UNSEALED,
                MH_SHA2_256_TRUNC254_PADDED,
                node,
            )?),
            _ => None,
        };
        self.apply(subtrees)?;
        Ok(BlockHeader::new(content_id, size_raw, size_stored))
    }

    fn append_block(&mut self, _header: &BlockHeader) -> Result<()> {
        Err(Error::Internal(InternalError::commitment(
            NAME,
            "forwarded blocks cannot be committed, raw chunks are required",
        )))
    }

    fn flush_state(mut self: Box<Self>) -> Result<BlockHeader> {
        self.drain_pool()?;

        if self.payload < MIN_PAYLOAD {
            return Err(Error::Internal(InternalError::commitment(
                NAME,
                format!(
                    "payload of {} bytes is below the {MIN_PAYLOAD} byte minimum",
                    self.payload
                ),
            )));
        }

        if !self.carry.is_empty() {
            let mut last = [0u8; QUAD_IN];
            last[..self.carry.len()].copy_from_slice(&self.carry);
            let mut expanded = [0u8; QUAD_OUT];
            fr32_expand(&last, &mut expanded);
            let start_leaf = self.leaves_issued;
            self.leaves_issued += LEAVES_PER_QUAD;
            let subtrees = hash_runs(start_leaf, &expanded)?;
            self.apply(subtrees)?;
        }

        let payload = self.payload;
        let root = self
            .tree
            .finish()
            .ok_or_else(|| Error::Internal(InternalError::commitment(NAME, "no leaves")))?;
        let padded_size = (LEAF_SIZE as u64) << root.level;

        debug!(
            "{NAME}: payload {payload} bytes, {} leaves, padded piece size {padded_size}",
            root.leaves
        );

        Ok(BlockHeader::new(
            Some(cid_v1(
                CODEC_FIL_COMMITMENT_UNSEALED,
                MH_SHA2_256_TRUNC254_PADDED,
                &root.node,
            )?),
            payload,
            padded_size,
        ))
    }
}

pub(super) fn initialize(
    args: &[String],
    config: &CollectorConfig,
) -> std::result::Result<Box<dyn Collector>, Vec<String>> {
    require_position(config, true)?;

    let mut errors = Vec::new();
    if !args.is_empty() {
        errors.push(format!("takes no arguments, got: {}", args.join(", ")));
    }
    if config.chunker_chain_max_result > MAX_CHUNK {
        errors.push(format!(
            "chunks of up to {} bytes exceed the {MAX_CHUNK} byte limit",
            config.chunker_chain_max_result
        ));
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    if config.async_hashers == 0 {
        return Ok(Box::new(FilCommP::new()));
    }
    FilCommP::with_pool(config)
        .map(|collector| Box::new(collector) as Box<dyn Collector>)
        .map_err(|e| vec![e.to_string()])
}
