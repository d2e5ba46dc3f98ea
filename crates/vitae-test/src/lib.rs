//! VITAE test harness
//!
//! Two full sessions wired back-to-back over in-memory queues:
//! - Deterministic FIFO delivery with `pump()`
//! - Silent in-flight loss to simulate reconnects
//! - End-to-end protocol tests (convergence, authority, idempotence)

pub mod harness;

pub use harness::*;
