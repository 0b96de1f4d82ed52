//! Application layer orchestrating the order lifecycle.
//!
//! `OrderEngine` is the entry point: it serializes work per order, stages
//! collaborator side effects and commits them atomically through the
//! injected `OrderStore`.

pub mod config;
pub mod engine;
pub mod locks;
pub(crate) mod policy;
