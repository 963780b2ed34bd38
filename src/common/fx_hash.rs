//! FxHash-based maps and sets for pass-internal indexing. The keys are
//! small integers or short id sequences, where FxHash beats SipHash by a
//! wide margin and HashDoS is not a concern.

pub use rustc_hash::{FxHashMap, FxHashSet};
