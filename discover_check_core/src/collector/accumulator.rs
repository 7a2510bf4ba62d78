//! Streaming binary Merkle accumulator
//!
//! Keeps a logarithmic stack of partial subtree roots. Two siblings on the same
//! level are combined as soon as both exist, so memory stays proportional to
//! the tree height no matter how many leaves stream through.

use crate::{Error, Result, error::InternalError};

/// How a dangling partial subtree is completed at flush time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddingRule {
    /// Carry the partial upward unchanged
    #[default]
    Promote,
    /// Pair the partial with the all-zero subtree of its level
    ZeroSubtree,
}

/// Node combination function of a tree
pub trait Combiner {
    type Node: Clone;

    fn combine(&self, left: &Self::Node, right: &Self::Node) -> Self::Node;

    /// Root of the all-zero subtree at `level`, if the scheme defines one
    fn zero(&self, _level: u32) -> Option<Self::Node> {
        None
    }
}

/// Root of a finished tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRoot<N> {
    pub node: N,
    /// Height of the tree; the padded leaf count is `2^level`
    pub level: u32,
    pub leaves: u64,
}

pub struct Accumulator<C: Combiner> {
    combiner: C,
    rule: PaddingRule,
    /// Levels strictly decrease from bottom to top
    stack: Vec<(u32, C::Node)>,
    leaves: u64,
}

impl<C: Combiner> Accumulator<C> {
    pub fn new(combiner: C, rule: PaddingRule) -> Self {
        Self {
            combiner,
            rule,
            stack: Vec::with_capacity(64),
            leaves: 0,
        }
    }

    pub fn combiner(&self) -> &C {
        &self.combiner
    }

    /// Leaves accounted for so far
    pub fn leaves(&self) -> u64 {
        self.leaves
    }

    pub fn push_leaf(&mut self, node: C::Node) -> Result<()> {
        self.push_subtree(0, node)
    }

    /// Insert a complete subtree of `2^level` leaves at the current position
    ///
    /// The position must be a multiple of the subtree width.
    pub fn push_subtree(&mut self, level: u32, node: C::Node) -> Result<()> {
        let width = 1u64
            .checked_shl(level)
            .ok_or_else(|| misaligned(level, self.leaves))?;
        if self.leaves % width != 0 {
            return Err(misaligned(level, self.leaves));
        }
        let leaves = self
            .leaves
            .checked_add(width)
            .ok_or_else(|| misaligned(level, self.leaves))?;

        let mut current = (level, node);
        while let Some((top_level, _)) = self.stack.last() {
            if *top_level != current.0 {
                break;
            }
            if let Some((_, left)) = self.stack.pop() {
                current = (current.0 + 1, self.combiner.combine(&left, &current.1));
            }
        }
        self.stack.push(current);
        self.leaves = leaves;
        Ok(())
    }

    /// Collapse the stack into the root; `None` when nothing was pushed
    pub fn finish(mut self) -> Option<TreeRoot<C::Node>> {
        let (mut level, mut node) = self.stack.pop()?;

        while let Some((left_level, left)) = self.stack.pop() {
            if self.rule == PaddingRule::ZeroSubtree {
                while level < left_level {
                    match self.combiner.zero(level) {
                        Some(zero) => node = self.combiner.combine(&node, &zero),
                        None => break,
                    }
                    level += 1;
                }
            }
            node = self.combiner.combine(&left, &node);
            level = left_level + 1;
        }

        Some(TreeRoot {
            node,
            level,
            leaves: self.leaves,
        })
    }
}

fn misaligned(level: u32, position: u64) -> Error {
    Error::Internal(InternalError::assertion(format!(
        "subtree of level {level} pushed at unaligned leaf position {position}"
    )))
}

/// Split `count` leaves starting at `start` into maximal aligned power-of-two runs
///
/// Returns `(level, leaves)` pairs in stream order.
pub fn aligned_runs(start: u64, count: u64) -> Vec<(u32, u64)> {
    let mut runs = Vec::new();
    let mut position = start;
    let mut remaining = count;
    while remaining > 0 {
        let align = if position == 0 {
            63
        } else {
            position.trailing_zeros()
        };
        let fit = 63 - remaining.leading_zeros();
        let level = align.min(fit);
        let width = 1u64 << level;
        runs.push((level, width));
        position += width;
        remaining -= width;
    }
    runs
}
