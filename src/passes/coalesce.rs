//! Final chain coalescing.
//!
//! Merging leaves the graph full of single-element blocks from the split
//! phase. Once the signature worklist drains, any simple block whose sole
//! successor has it as its sole predecessor folds forward into one maximal
//! block again. Runs to a fixpoint so whole chains collapse in one call.

use tracing::trace;

use crate::ir::graph::{BlockId, ControlFlowGraph};

/// Fold straight-line chains, returning the number of blocks eliminated.
pub fn coalesce_method(cfg: &mut ControlFlowGraph) -> usize {
    let mut folded = 0;
    loop {
        let mut changed = false;
        let ids: Vec<BlockId> = cfg.live_blocks().collect();
        for head in ids {
            if !cfg.is_live(head) || !cfg.block(head).is_simple() {
                continue;
            }
            let tail = cfg.successors(head)[0];
            if ControlFlowGraph::is_sentinel(tail) || tail == head {
                continue;
            }
            if cfg.predecessors(tail).len() != 1 {
                continue;
            }
            trace!(%head, %tail, "coalescing chain link");
            cfg.merge_linear(head, tail);
            folded += 1;
            changed = true;
        }
        if !changed {
            return folded;
        }
    }
}
