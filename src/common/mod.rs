//! Shared infrastructure: source positions, error taxonomy, pass statistics.

pub mod error;
pub mod fx_hash;
pub mod source;
pub mod stats;
