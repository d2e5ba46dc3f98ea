//! VITAE state-machine interpreter
//!
//! A generic table-driven executor for hierarchical interview machines:
//! - States carry their transition tables as data
//! - Guards and actions are named functions in lookup registries
//! - Actions return context patches and emit commands; they never touch
//!   stores directly
//! - Unconditional "always" transitions realize transient states

pub mod interpreter;

pub use interpreter::*;
