//! Method-level basic-block deduplication for a Java-to-dex compiler.
//!
//! The optimizer works on a per-method control-flow graph of three-address
//! elements. It splits every block into single-element pieces, groups blocks
//! by their ordered successor signature, merges structurally identical blocks
//! within a group (allowing a bounded renaming of isolated locals), and
//! finally coalesces the surviving straight-line chains back into maximal
//! blocks. See `passes::block_merge` for the driver.

pub mod common;
pub mod ir;
pub mod passes;

pub use common::error::OptError;
pub use common::stats::OptStats;
pub use passes::{MergeOptions, VariableMergeScope};
