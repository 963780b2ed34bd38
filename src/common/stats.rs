//! Counters reported back to the compilation driver.
//!
//! The driver hands one `OptStats` to the whole unit; methods are optimized
//! in parallel, so the counters are atomic. Relaxed ordering is enough since
//! nothing synchronizes through them.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct OptStats {
    /// Blocks created by the splitting phase.
    pub blocks_split: AtomicU64,
    /// Duplicate blocks eliminated by signature-group merging. This is the
    /// counter the driver reports as "blocks merged".
    pub blocks_merged: AtomicU64,
    /// Trivial predecessors folded into a group member to enable longer
    /// comparisons.
    pub blocks_absorbed: AtomicU64,
    /// Straight-line chains folded by the final coalescing phase.
    pub blocks_coalesced: AtomicU64,
}

impl OptStats {
    pub fn new() -> Self {
        OptStats::default()
    }

    pub fn merged(&self) -> u64 {
        self.blocks_merged.load(Ordering::Relaxed)
    }

    pub fn split(&self) -> u64 {
        self.blocks_split.load(Ordering::Relaxed)
    }

    pub fn absorbed(&self) -> u64 {
        self.blocks_absorbed.load(Ordering::Relaxed)
    }

    pub fn coalesced(&self) -> u64 {
        self.blocks_coalesced.load(Ordering::Relaxed)
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}
