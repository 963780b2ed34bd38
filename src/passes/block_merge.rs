//! Basic-block deduplication.
//!
//! The pass runs per method in four phases:
//!
//! 1. **Split**: every block becomes a chain of single-element blocks
//!    (`split_blocks`), so duplicates are found at element granularity.
//! 2. **Index**: blocks are grouped by their ordered successor signature.
//!    Only blocks with identical signatures can be behaviorally identical.
//! 3. **Process**: a FIFO worklist of groups. Within a group, blocks of
//!    equal element count are compared pairwise; equal blocks merge by
//!    redirecting the candidate's predecessors to the replacement. When a
//!    group has no more matches at the current length, members grow by
//!    absorbing a trivial predecessor, enabling matches one element longer.
//! 4. **Coalesce**: surviving straight-line chains fold back into maximal
//!    blocks (`coalesce`).
//!
//! Comparison tolerates renaming between *isolated* locals (values that
//! never cross a block boundary), bounded by `VariableMergeScope`. The
//! renaming is only ever consulted, never applied: because mapped locals are
//! isolated and live in disjoint blocks, deleting the candidate block is
//! already semantics-preserving.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::common::error::OptError;
use crate::common::fx_hash::{FxHashMap, FxHashSet};
use crate::common::stats::OptStats;
use crate::ir::element::{Element, ElementKind, Operand, Rvalue};
use crate::ir::graph::{BlockId, ControlFlowGraph, MethodBody};
use crate::ir::locals::{LocalId, LocalTable};

use super::{coalesce, split_blocks, Capability, MergeOptions, PassDescriptor, VariableMergeScope};

/// Scheduler contract: rewrites the CFG, needs three-address form, and does
/// not invalidate it.
pub const DESCRIPTOR: PassDescriptor = PassDescriptor {
    name: "block-merge",
    reads: &[Capability::Cfg, Capability::ThreeAddressForm],
    writes: &[Capability::Cfg],
    requires: &[Capability::ThreeAddressForm],
};

/// A deep copy of a block's ordered successor list. Keying groups on the
/// copied sequence (rather than anything identity-based) means a group key
/// can never go stale while edges are rewritten underneath it.
type Signature = Box<[BlockId]>;

/// Groups live blocks by successor signature and keeps a FIFO worklist of
/// groups that gained a second member or changed membership.
#[derive(Debug, Default)]
struct SignatureIndex {
    groups: FxHashMap<Signature, Vec<BlockId>>,
    /// Each registered block's current signature, so edge rewrites can move
    /// it between groups without rescanning the graph.
    by_block: FxHashMap<BlockId, Signature>,
    queue: VecDeque<Signature>,
    queued: FxHashSet<Signature>,
}

impl SignatureIndex {
    fn signature_of(cfg: &ControlFlowGraph, block: BlockId) -> Signature {
        Signature::from(cfg.successors(block))
    }

    /// Add a block under its current signature. Groups reaching two members
    /// become work.
    fn register(&mut self, cfg: &ControlFlowGraph, block: BlockId) {
        if ControlFlowGraph::is_sentinel(block) {
            return;
        }
        let sig = Self::signature_of(cfg, block);
        self.by_block.insert(block, sig.clone());
        let group = self.groups.entry(sig.clone()).or_default();
        group.push(block);
        if group.len() >= 2 {
            self.enqueue(sig);
        }
    }

    /// A block's successor list was rewritten: move it to its new group and
    /// requeue both groups whose membership changed.
    fn on_successors_changed(&mut self, cfg: &ControlFlowGraph, block: BlockId) {
        if !cfg.is_live(block) {
            return;
        }
        self.unregister(block);
        self.register(cfg, block);
    }

    /// Remove a block, requeueing its old group if it is still mergeable.
    fn unregister(&mut self, block: BlockId) {
        let Some(sig) = self.by_block.remove(&block) else { return };
        if let Some(group) = self.groups.get_mut(&sig) {
            group.retain(|&b| b != block);
            if group.is_empty() {
                self.groups.remove(&sig);
            } else if group.len() >= 2 {
                self.enqueue(sig);
            }
        }
    }

    /// Remove a block that is being deleted from the graph. Unlike
    /// `unregister` this never requeues: the shrinking group is exactly the
    /// one being processed.
    fn drop_block(&mut self, block: BlockId) {
        let Some(sig) = self.by_block.remove(&block) else { return };
        if let Some(group) = self.groups.get_mut(&sig) {
            group.retain(|&b| b != block);
            if group.is_empty() {
                self.groups.remove(&sig);
            }
        }
    }

    fn enqueue(&mut self, sig: Signature) {
        if self.queued.insert(sig.clone()) {
            self.queue.push_back(sig);
        }
    }

    /// Next group worth processing, skipping entries that shrank below two
    /// members since they were queued.
    fn pop_group(&mut self) -> Option<Signature> {
        while let Some(sig) = self.queue.pop_front() {
            self.queued.remove(&sig);
            if self.groups.get(&sig).is_some_and(|g| g.len() >= 2) {
                return Some(sig);
            }
        }
        None
    }

    fn members(&self, sig: &Signature) -> Vec<BlockId> {
        self.groups.get(sig).cloned().unwrap_or_default()
    }

    fn is_queued(&self, sig: &Signature) -> bool {
        self.queued.contains(sig)
    }

    /// Requeue the group holding `block`, if it is still mergeable. Called
    /// when a block loses a predecessor: a member left with a lone simple
    /// predecessor becomes absorbable, which its group's last scan could not
    /// have seen.
    fn requeue_group_of(&mut self, block: BlockId) {
        let Some(sig) = self.by_block.get(&block).cloned() else { return };
        if self.groups.get(&sig).is_some_and(|g| g.len() >= 2) {
            self.enqueue(sig);
        }
    }
}

/// Per-round facts about locals. A local is *isolated* when every read of it
/// is preceded by a write in the same block, i.e. its value never crosses a
/// block boundary. Only isolated locals may be renamed by the comparator.
#[derive(Debug)]
struct IsolationAnalysis {
    isolated: Vec<bool>,
    /// Blocks referencing each local, sorted ascending (graph walk order).
    referencing_blocks: Vec<Vec<BlockId>>,
}

impl IsolationAnalysis {
    fn compute(body: &MethodBody) -> Self {
        let n = body.locals.len();
        let mut isolated = vec![true; n];
        let mut referencing_blocks: Vec<Vec<BlockId>> = vec![Vec::new(); n];
        let mut written: FxHashSet<LocalId> = FxHashSet::default();
        for id in body.cfg.live_blocks() {
            written.clear();
            for element in &body.cfg.block(id).elements {
                element.for_each_read(|l| {
                    if !written.contains(&l) {
                        isolated[l.index()] = false;
                    }
                    note_reference(&mut referencing_blocks, l, id);
                });
                if let Some(dest) = element.written_local() {
                    written.insert(dest);
                    note_reference(&mut referencing_blocks, dest, id);
                }
            }
        }
        IsolationAnalysis { isolated, referencing_blocks }
    }

    fn is_isolated(&self, l: LocalId) -> bool {
        self.isolated[l.index()]
    }

    /// True when both locals are isolated and no block references both.
    /// Independence matters because a merged block stands in for both
    /// originals: a block using the two locals together could otherwise
    /// conflate their values.
    fn are_isolated_and_independent(&self, a: LocalId, b: LocalId) -> bool {
        self.is_isolated(a) && self.is_isolated(b) && !self.share_a_block(a, b)
    }

    fn share_a_block(&self, a: LocalId, b: LocalId) -> bool {
        let (mut xs, mut ys) = (
            self.referencing_blocks[a.index()].iter().peekable(),
            self.referencing_blocks[b.index()].iter().peekable(),
        );
        while let (Some(&&x), Some(&&y)) = (xs.peek(), ys.peek()) {
            if x == y {
                return true;
            }
            if x < y {
                xs.next();
            } else {
                ys.next();
            }
        }
        false
    }
}

fn note_reference(refs: &mut [Vec<BlockId>], l: LocalId, block: BlockId) {
    let list = &mut refs[l.index()];
    // Blocks are visited in ascending order, so the list stays sorted.
    if list.last() != Some(&block) {
        list.push(block);
    }
}

/// Pairwise structural comparison with a consistent variable renaming.
/// Mappings accumulate over one block comparison: once two locals pair up
/// (including a local with itself), neither may pair with anything else.
struct BlockComparator<'a> {
    locals: &'a LocalTable,
    isolation: &'a IsolationAnalysis,
    options: &'a MergeOptions,
    forward: FxHashMap<LocalId, LocalId>,
    reverse: FxHashMap<LocalId, LocalId>,
}

impl<'a> BlockComparator<'a> {
    fn new(locals: &'a LocalTable, isolation: &'a IsolationAnalysis, options: &'a MergeOptions) -> Self {
        BlockComparator {
            locals,
            isolation,
            options,
            forward: FxHashMap::default(),
            reverse: FxHashMap::default(),
        }
    }

    fn blocks_equal(&mut self, cfg: &ControlFlowGraph, a: BlockId, b: BlockId) -> bool {
        self.forward.clear();
        self.reverse.clear();
        // The caller compares within one signature group, so successor lists
        // already match.
        debug_assert_eq!(cfg.successors(a), cfg.successors(b));
        let (ba, bb) = (cfg.block(a), cfg.block(b));
        ba.elements.len() == bb.elements.len()
            && ba.elements.iter().zip(&bb.elements).all(|(ea, eb)| self.elements_equal(ea, eb))
    }

    fn elements_equal(&mut self, a: &Element, b: &Element) -> bool {
        if self.options.preserve_source_info && a.pos != b.pos {
            return false;
        }
        match (&a.kind, &b.kind) {
            (
                ElementKind::Assign { dest: da, rvalue: ra },
                ElementKind::Assign { dest: db, rvalue: rb },
            ) => self.locals_match(*da, *db) && self.rvalues_equal(ra, rb),
            (ElementKind::Eval(ra), ElementKind::Eval(rb)) => self.rvalues_equal(ra, rb),
            (ElementKind::Branch(oa), ElementKind::Branch(ob))
            | (ElementKind::Switch(oa), ElementKind::Switch(ob))
            | (ElementKind::Throw(oa), ElementKind::Throw(ob))
            | (ElementKind::Return(Some(oa)), ElementKind::Return(Some(ob))) => {
                self.operands_match(oa, ob)
            }
            (ElementKind::Return(None), ElementKind::Return(None)) => true,
            _ => false,
        }
    }

    fn rvalues_equal(&mut self, a: &Rvalue, b: &Rvalue) -> bool {
        match (a, b) {
            (Rvalue::Use(oa), Rvalue::Use(ob)) => self.operands_match(oa, ob),
            (Rvalue::Unary { op: xa, src: sa }, Rvalue::Unary { op: xb, src: sb }) => {
                xa == xb && self.operands_match(sa, sb)
            }
            (
                Rvalue::Binary { op: xa, lhs: la, rhs: ra },
                Rvalue::Binary { op: xb, lhs: lb, rhs: rb },
            ) => xa == xb && self.operands_match(la, lb) && self.operands_match(ra, rb),
            (
                Rvalue::Invoke { method: ma, args: aa },
                Rvalue::Invoke { method: mb, args: ab },
            ) => {
                ma == mb
                    && aa.len() == ab.len()
                    && aa.iter().zip(ab).all(|(oa, ob)| self.operands_match(oa, ob))
            }
            _ => false,
        }
    }

    fn operands_match(&mut self, a: &Operand, b: &Operand) -> bool {
        match (a, b) {
            (Operand::Local(la), Operand::Local(lb)) => self.locals_match(*la, *lb),
            (Operand::Const(ca), Operand::Const(cb)) => ca == cb,
            _ => false,
        }
    }

    fn locals_match(&mut self, a: LocalId, b: LocalId) -> bool {
        if let Some(&partner) = self.forward.get(&a) {
            return partner == b;
        }
        if self.reverse.contains_key(&b) {
            return false;
        }
        if a != b && !self.renaming_allowed(a, b) {
            return false;
        }
        self.forward.insert(a, b);
        self.reverse.insert(b, a);
        true
    }

    fn renaming_allowed(&self, a: LocalId, b: LocalId) -> bool {
        let (la, lb) = (self.locals.get(a), self.locals.get(b));
        if la.ty != lb.ty {
            return false;
        }
        match self.options.variable_merge_scope {
            VariableMergeScope::None => return false,
            VariableMergeScope::SyntheticOnly => {
                if !(la.synthetic && lb.synthetic) {
                    return false;
                }
            }
            VariableMergeScope::All => {}
        }
        self.isolation.are_isolated_and_independent(a, b)
    }
}

/// Run the full pipeline on one method. Returns the number of duplicate
/// blocks merged away (splits, absorptions, and coalesced chains count
/// separately in `stats`).
pub fn run_method(
    body: &mut MethodBody,
    options: &MergeOptions,
    stats: &OptStats,
) -> Result<usize, OptError> {
    body.cfg.validate()?;

    let created = split_blocks::split_method(&mut body.cfg);
    OptStats::add(&stats.blocks_split, created as u64);

    let mut index = SignatureIndex::default();
    let ids: Vec<BlockId> = body.cfg.live_blocks().collect();
    for id in ids {
        index.register(&body.cfg, id);
    }

    let mut merged = 0;
    let mut iso_cache: Option<IsolationAnalysis> = None;
    while let Some(sig) = index.pop_group() {
        merged += process_group(body, &mut index, &sig, options, stats, &mut iso_cache)?;
    }

    let folded = coalesce::coalesce_method(&mut body.cfg);
    OptStats::add(&stats.blocks_coalesced, folded as u64);

    body.cfg.validate()?;
    debug!(method = %body.name, split = created, merged, coalesced = folded, "block merge finished");
    Ok(merged)
}

/// Exhaust one signature group: merge equal pairs at increasing element
/// lengths, growing members through their trivial predecessors between
/// lengths. Bails out (leaving the group queued) as soon as a merge feeds
/// new members back into this group, so the scan never works from a stale
/// snapshot.
fn process_group(
    body: &mut MethodBody,
    index: &mut SignatureIndex,
    sig: &Signature,
    options: &MergeOptions,
    stats: &OptStats,
    iso_cache: &mut Option<IsolationAnalysis>,
) -> Result<usize, OptError> {
    let mut merged = 0;
    let mut len = 1;
    loop {
        // Merge phase at the current element length.
        loop {
            let members = index.members(sig);
            if members.len() < 2 {
                return Ok(merged);
            }
            for &m in &members {
                if ControlFlowGraph::is_sentinel(m) {
                    return Err(OptError::SentinelInGroup(m));
                }
            }
            let candidates: Vec<BlockId> = members
                .into_iter()
                .filter(|&b| body.cfg.is_live(b) && body.cfg.block(b).elements.len() == len)
                .collect();
            let mut merged_this_scan = false;
            for i in 0..candidates.len() {
                for j in (i + 1)..candidates.len() {
                    let (replacement, candidate) = (candidates[i], candidates[j]);
                    if !body.cfg.is_live(replacement) || !body.cfg.is_live(candidate) {
                        continue;
                    }
                    let isolation = iso_cache.get_or_insert_with(|| IsolationAnalysis::compute(body));
                    let mut comparator = BlockComparator::new(&body.locals, isolation, options);
                    if !comparator.blocks_equal(&body.cfg, replacement, candidate) {
                        continue;
                    }
                    merge_blocks(body, index, replacement, candidate, stats);
                    *iso_cache = None;
                    merged += 1;
                    merged_this_scan = true;
                    if index.is_queued(sig) {
                        // The merge pushed new members into this very group;
                        // revisit it from the worklist.
                        return Ok(merged);
                    }
                }
            }
            if !merged_this_scan {
                break;
            }
        }

        // Grow phase: absorb trivial predecessors to unlock the next length.
        let members = index.members(sig);
        let mut grew = false;
        for &m in &members {
            if try_absorb_predecessor(body, index, m, options, stats, iso_cache) {
                grew = true;
            }
        }
        if grew {
            len += 1;
            continue;
        }
        // A rescan of a requeued group starts back at length one, but some
        // members may already be longer; jump to the next length present
        // rather than give up with those pairs uncompared.
        let next = index
            .members(sig)
            .into_iter()
            .filter(|&b| body.cfg.is_live(b))
            .map(|b| body.cfg.block(b).elements.len())
            .filter(|&n| n > len)
            .min();
        match next {
            Some(n) => len = n,
            None => return Ok(merged),
        }
    }
}

/// Delete `candidate`, redirecting all of its incoming edges (in place, with
/// multiplicity) to the equivalent `replacement`. The replacement's own
/// successor list is untouched unless it was itself a predecessor of the
/// candidate.
fn merge_blocks(
    body: &mut MethodBody,
    index: &mut SignatureIndex,
    replacement: BlockId,
    candidate: BlockId,
    stats: &OptStats,
) {
    trace!(%candidate, %replacement, "merging duplicate block");
    index.drop_block(candidate);
    let succs: Vec<BlockId> = body.cfg.successors(candidate).to_vec();
    let mut seen: FxHashSet<BlockId> = FxHashSet::default();
    for p in body.cfg.predecessors(candidate).to_vec() {
        if !seen.insert(p) {
            continue;
        }
        body.cfg.redirect_successor(p, candidate, replacement);
        if p != candidate && !ControlFlowGraph::is_sentinel(p) {
            index.on_successors_changed(&body.cfg, p);
        }
    }
    body.cfg.remove_block(candidate);
    // Each successor just lost an incoming edge. Their groups need another
    // look: a shrunken predecessor set can newly enable absorption there.
    for s in succs {
        index.requeue_group_of(s);
    }
    OptStats::add(&stats.blocks_merged, 1);
}

/// Fold a member's sole predecessor into it if that predecessor is a simple
/// block, prepending its elements. With `preserve_source_info` the
/// predecessor must have no unknown-position elements, since moving those
/// would leave them unattributable after later merges.
fn try_absorb_predecessor(
    body: &mut MethodBody,
    index: &mut SignatureIndex,
    member: BlockId,
    options: &MergeOptions,
    stats: &OptStats,
    iso_cache: &mut Option<IsolationAnalysis>,
) -> bool {
    if !body.cfg.is_live(member) {
        return false;
    }
    let preds = body.cfg.predecessors(member);
    if preds.len() != 1 {
        return false;
    }
    let pred = preds[0];
    if pred == member || ControlFlowGraph::is_sentinel(pred) {
        return false;
    }
    {
        let pb = body.cfg.block(pred);
        if !pb.is_simple() {
            return false;
        }
        if options.preserve_source_info && pb.elements.iter().any(|e| e.has_unknown_position()) {
            return false;
        }
    }

    trace!(%pred, %member, "absorbing trivial predecessor");
    let moved = std::mem::take(&mut body.cfg.block_mut(pred).elements);
    body.cfg.block_mut(member).elements.splice(0..0, moved);

    let mut seen: FxHashSet<BlockId> = FxHashSet::default();
    for q in body.cfg.predecessors(pred).to_vec() {
        if !seen.insert(q) {
            continue;
        }
        body.cfg.redirect_successor(q, pred, member);
        if !ControlFlowGraph::is_sentinel(q) {
            index.on_successors_changed(&body.cfg, q);
        }
    }
    index.drop_block(pred);
    body.cfg.remove_block(pred);
    // The member's predecessor set changed shape; make sure its group gets
    // another look even if the current scan stops early.
    index.requeue_group_of(member);
    // Moving elements across blocks changes which values cross boundaries.
    *iso_cache = None;
    OptStats::add(&stats.blocks_absorbed, 1);
    true
}
