//! VITAE peer synchronization protocol
//!
//! Keeps two linked devices consistent without a server:
//! - Message taxonomy (survey events, item merges, bulk resync, reset)
//! - Transport collaborator contract
//! - Authority rules: host-only forward progress, amend conversion

pub mod authority;
pub mod message;
pub mod transport;

pub use authority::*;
pub use message::*;
pub use transport::*;
