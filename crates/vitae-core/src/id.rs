//! Identity types for the interview core
//!
//! Episode and group identifiers are string-backed: imported items keep
//! their original id where possible, and collisions are resolved by
//! appending a disambiguating suffix rather than by renumbering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Episode identity - unique within one linked session
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub String);

impl EpisodeId {
    pub fn new(id: impl Into<String>) -> Self {
        EpisodeId(id.into())
    }

    /// Locally assigned id from the store's sequence counter
    pub fn from_seq(seq: u64) -> Self {
        EpisodeId(format!("ep-{seq}"))
    }

    /// Rekeyed variant used when a bulk import collides with an existing id
    pub fn with_suffix(&self, n: u32) -> Self {
        EpisodeId(format!("{}-{n}", self.0))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Episode({})", self.0)
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EpisodeId {
    fn from(s: &str) -> Self {
        EpisodeId(s.to_string())
    }
}

/// Group identity - one of the category-hierarchy nodes
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        GroupId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        GroupId(s.to_string())
    }
}

/// The two paired-session roles. Fixed for the lifetime of a session.
///
/// The host is authoritative over forward interview progress; the guest
/// observes and may only amend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Host,
    Guest,
}

impl PeerRole {
    /// The role on the other end of the channel
    pub fn other(self) -> PeerRole {
        match self {
            PeerRole::Host => PeerRole::Guest,
            PeerRole::Guest => PeerRole::Host,
        }
    }

    #[inline]
    pub fn is_host(self) -> bool {
        matches!(self, PeerRole::Host)
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Host => f.write_str("host"),
            PeerRole::Guest => f.write_str("guest"),
        }
    }
}
