//! Error types for the interview core
//!
//! Only conditions that flow as values live here. The spec-level
//! conditions handled by control flow stay out of the enum: a guest
//! forward attempt is silently rejected (false return), an inactive
//! transport makes `send` return false, and an import id collision is
//! resolved by rekeying instead of failing.

use thiserror::Error;

use crate::{EpisodeId, GroupId};

/// Core errors. Every variant is handled at the boundary where it is
/// detected; none escapes through the interpreter's transition loop.
#[derive(Error, Debug)]
pub enum VitaeError {
    // Input errors
    #[error("unparseable time value: {0}")]
    InvalidTime(String),

    // Store errors
    #[error("episode not found: {0}")]
    EpisodeNotFound(EpisodeId),

    #[error("group not found: {0}")]
    GroupNotFound(GroupId),
}

/// Result type for interview-core operations
pub type VitaeResult<T> = Result<T, VitaeError>;
