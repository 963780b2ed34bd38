//! The method-body IR the optimizer runs on: a local-variable table,
//! three-address elements, and a control-flow graph of basic blocks.

pub mod element;
pub mod graph;
pub mod locals;
