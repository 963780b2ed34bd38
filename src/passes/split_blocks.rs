//! Maximal block splitting.
//!
//! Rewrites every multi-element block into a chain of single-element blocks
//! so that duplicate detection works at element granularity. The first
//! element stays in the original block (keeping its incoming edges intact);
//! the rest move into freshly created blocks wired in a fall-through chain
//! ending on the original successors. Only the last piece can carry a
//! terminator, so every piece before it is a simple block.

use crate::ir::graph::{BlockId, BlockKind, ControlFlowGraph, EdgeList};

/// Split all blocks, returning the number of blocks created. Also
/// reclassifies any non-sentinel block with one successor and no terminator
/// as `Simple`, which is what makes it absorbable later.
pub fn split_method(cfg: &mut ControlFlowGraph) -> usize {
    let mut created = 0;
    let ids: Vec<BlockId> = cfg.live_blocks().collect();
    for id in ids {
        created += split_block(cfg, id);
        reclassify(cfg, id);
    }
    created
}

fn split_block(cfg: &mut ControlFlowGraph, id: BlockId) -> usize {
    if cfg.block(id).elements.len() <= 1 {
        return 0;
    }
    let rest = cfg.block_mut(id).elements.split_off(1);
    let tail_succs: EdgeList = cfg.block(id).succs.clone();
    let tail_kind = cfg.block(id).kind;

    // Build the chain back to front so each new block can name its successor.
    let mut next: Vec<BlockId> = tail_succs.to_vec();
    let mut kind = tail_kind;
    let mut created = 0;
    for element in rest.into_iter().rev() {
        let piece = cfg.add_block(kind, vec![element], &next);
        next = vec![piece];
        kind = BlockKind::Simple;
        created += 1;
    }

    cfg.set_successors(id, &next);
    cfg.block_mut(id).kind = BlockKind::Simple;
    created
}

fn reclassify(cfg: &mut ControlFlowGraph, id: BlockId) {
    let block = cfg.block(id);
    if block.kind == BlockKind::Normal
        && block.succs.len() == 1
        && !block.elements.iter().any(|e| e.is_terminator())
    {
        cfg.block_mut(id).kind = BlockKind::Simple;
    }
}
