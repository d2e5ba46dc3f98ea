//! Peer transport collaborator
//!
//! The core depends on four operations only: send, activity, role, and an
//! inbound delivery path (the owner feeds received messages into the
//! session's single apply entry point). Signaling and connection
//! establishment live outside the core.

use crate::message::SyncMessage;
use vitae_core::PeerRole;

/// The channel to the other device.
///
/// `send` returns `false` when the message could not be handed to the
/// channel (inactive, buffer gone); the caller decides whether to queue,
/// resync later, or drop.
pub trait PeerTransport {
    fn send(&mut self, message: &SyncMessage) -> bool;
    fn is_active(&self) -> bool;
    fn role(&self) -> PeerRole;
}

/// A transport with nobody on the other end. Used before pairing and in
/// single-device tests; every send reports failure.
#[derive(Debug)]
pub struct NullTransport {
    role: PeerRole,
}

impl NullTransport {
    pub fn new(role: PeerRole) -> Self {
        NullTransport { role }
    }
}

impl PeerTransport for NullTransport {
    fn send(&mut self, _message: &SyncMessage) -> bool {
        false
    }

    fn is_active(&self) -> bool {
        false
    }

    fn role(&self) -> PeerRole {
        self.role
    }
}
