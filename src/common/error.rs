//! Invariant violations surfaced by the optimizer.
//!
//! Any of these indicates a bug in the graph builder or in a pass, not a
//! property of the input program. The pass driver validates the graph and
//! aborts the method with the first violation it finds; the scheduler treats
//! that as fatal for the compilation unit.

use thiserror::Error;

use crate::ir::graph::BlockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OptError {
    /// A successor edge exists without the matching predecessor edge (or
    /// with a different multiplicity).
    #[error("edge {from} -> {to} is not recorded symmetrically")]
    EdgeAsymmetry { from: BlockId, to: BlockId },

    /// A live non-sentinel block cannot be reached from the entry sentinel.
    #[error("block {0} is not reachable from the entry sentinel")]
    UnreachableBlock(BlockId),

    /// The entry or exit sentinel carries an edge it must never have
    /// (predecessors of entry, successors of exit, or elements on either).
    #[error("sentinel block {0} violates its shape constraints")]
    MalformedSentinel(BlockId),

    /// A sentinel showed up as a member of a signature group. Sentinels are
    /// never registered, so this means the index was corrupted.
    #[error("sentinel block {0} appeared in a merge group")]
    SentinelInGroup(BlockId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_blocks() {
        let e = OptError::EdgeAsymmetry { from: BlockId(4), to: BlockId(7) };
        assert_eq!(e.to_string(), "edge b4 -> b7 is not recorded symmetrically");
        let e = OptError::UnreachableBlock(BlockId(3));
        assert_eq!(e.to_string(), "block b3 is not reachable from the entry sentinel");
    }
}
