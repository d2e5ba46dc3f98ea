//! VITAE session node
//!
//! One session per device. The node owns the interpreter, the episode
//! store, the consistency detector, the answer history, and the
//! persistence and transport collaborators, and funnels every mutation -
//! local answers and inbound peer messages alike - through a single
//! synchronous apply path.

pub mod node;
pub mod telemetry;

pub use node::*;
pub use telemetry::*;
