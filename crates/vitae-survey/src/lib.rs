//! VITAE survey profile
//!
//! The concrete biographical interview built on the generic interpreter:
//! - Survey context and its durable snapshot
//! - Amendable answer history
//! - Default group catalog (themes, trajectories, attributes)
//! - The interview script: states, guards, actions, emitted commands

pub mod answers;
pub mod context;
pub mod groups;
pub mod script;

pub use answers::*;
pub use context::*;
pub use groups::*;
pub use script::*;
