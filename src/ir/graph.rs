//! The per-method control-flow graph.
//!
//! Blocks live in an arena (`Vec<Option<BasicBlock>>`) so that `BlockId`s
//! stay stable across removals; a removed block leaves a dead slot behind.
//! Two sentinel blocks exist from construction: entry (`BlockId(0)`) and
//! exit (`BlockId(1)`). Sentinels carry no elements and are never merged,
//! split, or removed.
//!
//! Edges are stored symmetrically with multiplicity: if a branch block lists
//! the same target twice in its successors, the target lists the branch
//! block twice in its predecessors. Every mutator here maintains that
//! invariant; `validate` checks it.

use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;

use crate::common::error::OptError;

use super::element::Element;
use super::locals::LocalTable;

/// Index into the graph's block arena. Stable for the life of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Most blocks have one or two edges on each side.
pub type EdgeList = SmallVec<[BlockId; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// The entry sentinel. Exactly one per graph, no predecessors.
    Entry,
    /// The exit sentinel. Exactly one per graph, no successors.
    Exit,
    /// Straight-line block: a single fall-through successor and no
    /// terminator element. Only simple blocks are absorbable.
    Simple,
    /// Anything else: branch heads, switch heads, returns, throws.
    Normal,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub kind: BlockKind,
    pub elements: Vec<Element>,
    /// Predecessors, with multiplicity, in edge-creation order.
    pub preds: EdgeList,
    /// Ordered successors. For a branch block the order is semantic
    /// (taken target first, fall-through second); it is never permuted.
    pub succs: EdgeList,
}

impl BasicBlock {
    fn sentinel(kind: BlockKind) -> Self {
        BasicBlock { kind, elements: Vec::new(), preds: EdgeList::new(), succs: EdgeList::new() }
    }

    /// A simple block eligible for absorption: `Simple` kind with exactly
    /// one outgoing edge.
    pub fn is_simple(&self) -> bool {
        self.kind == BlockKind::Simple && self.succs.len() == 1
    }
}

#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    blocks: Vec<Option<BasicBlock>>,
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        ControlFlowGraph::new()
    }
}

impl ControlFlowGraph {
    pub const ENTRY: BlockId = BlockId(0);
    pub const EXIT: BlockId = BlockId(1);

    pub fn new() -> Self {
        ControlFlowGraph {
            blocks: vec![
                Some(BasicBlock::sentinel(BlockKind::Entry)),
                Some(BasicBlock::sentinel(BlockKind::Exit)),
            ],
        }
    }

    #[inline]
    pub fn is_sentinel(id: BlockId) -> bool {
        id == Self::ENTRY || id == Self::EXIT
    }

    /// Append a block and wire its outgoing edges. Successors must already
    /// exist; forward references are created by adding blocks in reverse
    /// order or by wiring with `add_edge` afterwards.
    pub fn add_block(&mut self, kind: BlockKind, elements: Vec<Element>, succs: &[BlockId]) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(BasicBlock {
            kind,
            elements,
            preds: EdgeList::new(),
            succs: EdgeList::from_slice(succs),
        }));
        for &s in succs {
            self.block_mut(s).preds.push(id);
        }
        id
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).succs.push(to);
        self.block_mut(to).preds.push(from);
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks[id.index()].as_ref().expect("accessed a removed block")
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks[id.index()].as_mut().expect("accessed a removed block")
    }

    pub fn try_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index()).and_then(|slot| slot.as_ref())
    }

    #[inline]
    pub fn is_live(&self, id: BlockId) -> bool {
        self.try_block(id).is_some()
    }

    pub fn successors(&self, id: BlockId) -> &[BlockId] {
        &self.block(id).succs
    }

    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        &self.block(id).preds
    }

    /// Live non-sentinel blocks in arena order.
    pub fn live_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .skip(2)
            .filter_map(|(i, slot)| slot.as_ref().map(|_| BlockId(i as u32)))
    }

    /// Number of live non-sentinel blocks.
    pub fn block_count(&self) -> usize {
        self.live_blocks().count()
    }

    /// Rewrite every `pred -> from` edge as `pred -> to`, keeping successor
    /// order and multiplicity. Predecessor lists on both ends are updated
    /// to match.
    pub fn redirect_successor(&mut self, pred: BlockId, from: BlockId, to: BlockId) {
        let mut rewired = 0;
        for s in self.block_mut(pred).succs.iter_mut() {
            if *s == from {
                *s = to;
                rewired += 1;
            }
        }
        for _ in 0..rewired {
            self.unlink_pred(from, pred);
            self.block_mut(to).preds.push(pred);
        }
    }

    /// Replace a block's successor list wholesale.
    pub fn set_successors(&mut self, id: BlockId, succs: &[BlockId]) {
        let old = std::mem::take(&mut self.block_mut(id).succs);
        for &s in &old {
            self.unlink_pred(s, id);
        }
        self.block_mut(id).succs = EdgeList::from_slice(succs);
        for &s in succs {
            self.block_mut(s).preds.push(id);
        }
    }

    /// Remove a block whose predecessors have already been redirected away.
    /// Its outgoing edges are unlinked; the arena slot goes dead.
    pub fn remove_block(&mut self, id: BlockId) {
        debug_assert!(!Self::is_sentinel(id), "tried to remove a sentinel");
        let block = self.blocks[id.index()].take().expect("removed a dead block");
        debug_assert!(block.preds.is_empty(), "removed block {id} still has predecessors");
        for &s in &block.succs {
            self.unlink_pred(s, id);
        }
    }

    /// Fold `tail` into `head`. Caller guarantees `head`'s only successor is
    /// `tail` and `tail`'s only predecessor is `head`. `head` takes over
    /// `tail`'s elements, successors, and kind.
    pub fn merge_linear(&mut self, head: BlockId, tail: BlockId) {
        debug_assert_eq!(self.successors(head), [tail]);
        debug_assert_eq!(self.predecessors(tail), [head]);
        let mut t = self.blocks[tail.index()].take().expect("merged a dead block");
        for &s in &t.succs {
            // One occurrence per edge; self-references through `tail` are
            // impossible here since tail's only predecessor is head.
            if let Some(slot) = self.blocks[s.index()].as_mut() {
                if let Some(pos) = slot.preds.iter().position(|&p| p == tail) {
                    slot.preds[pos] = head;
                }
            }
        }
        let h = self.block_mut(head);
        h.elements.append(&mut t.elements);
        h.succs = t.succs;
        h.kind = t.kind;
    }

    fn unlink_pred(&mut self, block: BlockId, pred: BlockId) {
        let preds = &mut self.block_mut(block).preds;
        if let Some(pos) = preds.iter().position(|&p| p == pred) {
            preds.remove(pos);
        }
    }

    /// Check the structural invariants: sentinel shape, symmetric edges with
    /// matching multiplicity, and reachability of every live block from the
    /// entry sentinel. Violations are compiler bugs, not input errors.
    pub fn validate(&self) -> Result<(), OptError> {
        let entry = self.try_block(Self::ENTRY).ok_or(OptError::MalformedSentinel(Self::ENTRY))?;
        if entry.kind != BlockKind::Entry || !entry.preds.is_empty() || !entry.elements.is_empty() {
            return Err(OptError::MalformedSentinel(Self::ENTRY));
        }
        let exit = self.try_block(Self::EXIT).ok_or(OptError::MalformedSentinel(Self::EXIT))?;
        if exit.kind != BlockKind::Exit || !exit.succs.is_empty() || !exit.elements.is_empty() {
            return Err(OptError::MalformedSentinel(Self::EXIT));
        }

        for (i, slot) in self.blocks.iter().enumerate() {
            let Some(block) = slot else { continue };
            let id = BlockId(i as u32);
            for &s in &block.succs {
                let other = self.try_block(s).ok_or(OptError::EdgeAsymmetry { from: id, to: s })?;
                let fwd = block.succs.iter().filter(|&&x| x == s).count();
                let back = other.preds.iter().filter(|&&x| x == id).count();
                if fwd != back {
                    return Err(OptError::EdgeAsymmetry { from: id, to: s });
                }
            }
            for &p in &block.preds {
                let other = self.try_block(p).ok_or(OptError::EdgeAsymmetry { from: p, to: id })?;
                let back = block.preds.iter().filter(|&&x| x == p).count();
                let fwd = other.succs.iter().filter(|&&x| x == id).count();
                if fwd != back {
                    return Err(OptError::EdgeAsymmetry { from: p, to: id });
                }
            }
        }

        // BFS from entry. The exit sentinel is exempt (a method that never
        // returns legitimately leaves it unreached).
        let mut reached = vec![false; self.blocks.len()];
        reached[Self::ENTRY.index()] = true;
        let mut queue = VecDeque::from([Self::ENTRY]);
        while let Some(b) = queue.pop_front() {
            for &s in self.successors(b) {
                if !reached[s.index()] {
                    reached[s.index()] = true;
                    queue.push_back(s);
                }
            }
        }
        for id in self.live_blocks() {
            if !reached[id.index()] {
                return Err(OptError::UnreachableBlock(id));
            }
        }
        Ok(())
    }
}

/// A method body: name, locals, and the block graph.
#[derive(Debug, Clone)]
pub struct MethodBody {
    pub name: String,
    pub locals: LocalTable,
    pub cfg: ControlFlowGraph,
}

impl MethodBody {
    pub fn new(name: &str) -> Self {
        MethodBody { name: name.to_string(), locals: LocalTable::new(), cfg: ControlFlowGraph::new() }
    }
}

/// A compilation unit: the methods of one class (or dex file slice).
#[derive(Debug, Clone, Default)]
pub struct Unit {
    pub methods: Vec<MethodBody>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::element::{Element, ElementKind};

    fn ret() -> Element {
        Element::new(ElementKind::Return(None))
    }

    #[test]
    fn add_block_wires_edges() {
        let mut cfg = ControlFlowGraph::new();
        let b = cfg.add_block(BlockKind::Normal, vec![ret()], &[ControlFlowGraph::EXIT]);
        cfg.add_edge(ControlFlowGraph::ENTRY, b);
        assert_eq!(cfg.successors(ControlFlowGraph::ENTRY), [b]);
        assert_eq!(cfg.predecessors(b), [ControlFlowGraph::ENTRY]);
        assert_eq!(cfg.successors(b), [ControlFlowGraph::EXIT]);
        assert_eq!(cfg.predecessors(ControlFlowGraph::EXIT), [b]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.block_count(), 1);
    }

    #[test]
    fn redirect_keeps_multiplicity() {
        let mut cfg = ControlFlowGraph::new();
        let x = cfg.add_block(BlockKind::Normal, vec![ret()], &[ControlFlowGraph::EXIT]);
        let y = cfg.add_block(BlockKind::Normal, vec![ret()], &[ControlFlowGraph::EXIT]);
        // A two-way branch with both arms on x.
        let b = cfg.add_block(BlockKind::Normal, vec![], &[x, x]);
        cfg.add_edge(ControlFlowGraph::ENTRY, b);
        cfg.add_edge(ControlFlowGraph::ENTRY, y);

        cfg.redirect_successor(b, x, y);
        assert_eq!(cfg.successors(b), [y, y]);
        assert_eq!(cfg.predecessors(y).iter().filter(|&&p| p == b).count(), 2);
        assert!(cfg.predecessors(x).is_empty());
        cfg.remove_block(x);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn merge_linear_folds_chain() {
        let mut cfg = ControlFlowGraph::new();
        let tail = cfg.add_block(BlockKind::Normal, vec![ret()], &[ControlFlowGraph::EXIT]);
        let head = cfg.add_block(BlockKind::Simple, vec![], &[tail]);
        cfg.add_edge(ControlFlowGraph::ENTRY, head);

        cfg.merge_linear(head, tail);
        assert!(!cfg.is_live(tail));
        assert_eq!(cfg.successors(head), [ControlFlowGraph::EXIT]);
        assert_eq!(cfg.predecessors(ControlFlowGraph::EXIT), [head]);
        assert_eq!(cfg.block(head).kind, BlockKind::Normal);
        assert_eq!(cfg.block(head).elements.len(), 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_asymmetry() {
        let mut cfg = ControlFlowGraph::new();
        let b = cfg.add_block(BlockKind::Normal, vec![ret()], &[ControlFlowGraph::EXIT]);
        cfg.add_edge(ControlFlowGraph::ENTRY, b);
        // Sever the backward half of the edge by hand.
        cfg.block_mut(ControlFlowGraph::EXIT).preds.clear();
        assert_eq!(
            cfg.validate(),
            Err(OptError::EdgeAsymmetry { from: b, to: ControlFlowGraph::EXIT })
        );
    }

    #[test]
    fn validate_rejects_unreachable_island() {
        let mut cfg = ControlFlowGraph::new();
        let b = cfg.add_block(BlockKind::Normal, vec![ret()], &[ControlFlowGraph::EXIT]);
        cfg.add_edge(ControlFlowGraph::ENTRY, b);
        // Two blocks looping to each other, disconnected from entry.
        let i1 = cfg.add_block(BlockKind::Normal, vec![], &[]);
        let i2 = cfg.add_block(BlockKind::Normal, vec![], &[i1]);
        cfg.add_edge(i1, i2);
        assert_eq!(cfg.validate(), Err(OptError::UnreachableBlock(i1)));
    }

    #[test]
    fn validate_rejects_edges_on_sentinels() {
        let mut cfg = ControlFlowGraph::new();
        let b = cfg.add_block(BlockKind::Normal, vec![ret()], &[ControlFlowGraph::EXIT]);
        cfg.add_edge(ControlFlowGraph::ENTRY, b);
        cfg.add_edge(ControlFlowGraph::EXIT, b);
        assert_eq!(cfg.validate(), Err(OptError::MalformedSentinel(ControlFlowGraph::EXIT)));
    }
}
