//! Authority rules
//!
//! Exactly one host may move the interview forward. Everything else is
//! either an amend (allowed from both roles) or rejected. The
//! anti-double-submission rule lives here: a forward event whose kind does
//! not match the question the sender currently occupies is converted into
//! a non-advancing amend carrying the same key and value, so correcting
//! history can never re-trigger forward progress.

use tracing::debug;

use vitae_core::{InterviewEvent, PeerRole};
use vitae_survey::{expected_state, Expectation};

/// What to do with a locally originated event
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundDecision {
    /// Apply and replicate as-is
    Forward,
    /// The sender is answering a past question: apply and replicate this
    /// amend instead
    ConvertToAmend(InterviewEvent),
    /// Silently rejected (guest attempting forward progress)
    Reject,
}

/// Classify an event a local user is trying to send.
///
/// The kind->expected-state table is a coarse heuristic: kinds consumed by
/// several states map to one canonical state, and `YES`/`NO`/`NEXT` are
/// wildcard. Concurrent edits of two similarly-shaped questions are not
/// disambiguated by kind alone.
pub fn classify_outbound(
    role: PeerRole,
    current_state: &str,
    event: &InterviewEvent,
) -> OutboundDecision {
    if event.is_amend() {
        return OutboundDecision::Forward;
    }

    if !role.is_host() {
        debug!(kind = %event.kind, "guest forward event rejected");
        return OutboundDecision::Reject;
    }

    match expected_state(&event.kind) {
        Expectation::Any => OutboundDecision::Forward,
        Expectation::State(expected) if expected == current_state => OutboundDecision::Forward,
        Expectation::State(expected) => {
            debug!(
                kind = %event.kind,
                expected,
                current = current_state,
                "forward event converted to amend"
            );
            OutboundDecision::ConvertToAmend(InterviewEvent::amend(expected, event.value.clone()))
        }
        // Unknown kinds pass through; the interpreter drops them silently.
        Expectation::Unknown => OutboundDecision::Forward,
    }
}

/// May a received survey event be applied locally? Forward progress is
/// only accepted from the host; amends are accepted from either role.
pub fn inbound_allowed(sender: PeerRole, event: &InterviewEvent) -> bool {
    event.is_amend() || sender.is_host()
}
