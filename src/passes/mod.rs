//! Optimization passes over method bodies.
//!
//! The only pass in this crate is block merging (with its splitting and
//! coalescing phases). The surrounding toolchain schedules passes through
//! the declarative `PassDescriptor` contract rather than by calling into
//! pass internals, so everything a scheduler needs lives here.

pub mod block_merge;
pub mod coalesce;
pub mod split_blocks;

use rayon::prelude::*;

use crate::common::error::OptError;
use crate::common::stats::OptStats;
use crate::ir::graph::Unit;

/// An analysis or representation property a pass can read, write, or require.
/// Closed on purpose: the scheduler matches capabilities structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The control-flow graph (blocks and edges).
    Cfg,
    /// Elements are in three-address form: one write per element, operand
    /// reads only.
    ThreeAddressForm,
}

/// What a pass touches, declared up front so the scheduler can order passes
/// and invalidate analyses without inspecting pass internals.
#[derive(Debug, Clone, Copy)]
pub struct PassDescriptor {
    pub name: &'static str,
    pub reads: &'static [Capability],
    pub writes: &'static [Capability],
    pub requires: &'static [Capability],
}

/// Which locals the comparator may pair up when two blocks differ only in
/// variable names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariableMergeScope {
    /// Never rename; blocks must match local-for-local.
    None,
    /// Only compiler-synthesized temporaries may be paired.
    SyntheticOnly,
    /// Any two same-typed locals may be paired.
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Refuse merges that would misattribute debug positions: elements must
    /// carry identical positions to compare equal, and a predecessor with
    /// unknown-position elements is never absorbed.
    pub preserve_source_info: bool,
    pub variable_merge_scope: VariableMergeScope,
}

/// Run block merging over every method of the unit. Methods are independent,
/// so they fan out across the rayon pool; `stats` accumulates atomically.
/// Returns the total number of merges, or the first invariant violation.
pub fn run_unit(unit: &mut Unit, options: &MergeOptions, stats: &OptStats) -> Result<usize, OptError> {
    unit.methods
        .par_iter_mut()
        .map(|method| block_merge::run_method(method, options, stats))
        .try_reduce(|| 0, |a, b| Ok(a + b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::element::{Const, Element, ElementKind, Operand};
    use crate::ir::graph::{BlockKind, ControlFlowGraph, MethodBody};

    fn return_method(name: &str, value: i32) -> MethodBody {
        let mut body = MethodBody::new(name);
        let b = body.cfg.add_block(
            BlockKind::Normal,
            vec![Element::new(ElementKind::Return(Some(Operand::Const(Const::Int(value)))))],
            &[ControlFlowGraph::EXIT],
        );
        body.cfg.add_edge(ControlFlowGraph::ENTRY, b);
        body
    }

    #[test]
    fn unit_driver_sums_per_method_merges() {
        let mut unit = Unit::default();
        for i in 0..4 {
            unit.methods.push(return_method(&format!("m{i}"), i));
        }
        let stats = OptStats::new();
        let merged = run_unit(&mut unit, &MergeOptions::default(), &stats).unwrap();
        // Each method has a single block; nothing to merge, nothing to fail.
        assert_eq!(merged, 0);
        assert_eq!(stats.merged(), 0);
        for method in &unit.methods {
            assert!(method.cfg.validate().is_ok());
        }
    }

    #[test]
    fn descriptor_names_the_pass() {
        let d = block_merge::DESCRIPTOR;
        assert_eq!(d.name, "block-merge");
        assert!(d.writes.contains(&Capability::Cfg));
        assert!(d.requires.contains(&Capability::ThreeAddressForm));
    }
}
