//! Linked-pair harness
//!
//! A host and a guest session joined by two in-memory FIFO queues. The
//! channel mirrors the transport contract: ordered, reliable while
//! active, and able to drop everything in flight to simulate a
//! reconnect.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use vitae_core::PeerRole;
use vitae_session::Session;
use vitae_store::MemoryBackend;
use vitae_sync::{PeerTransport, SyncMessage};

type Queue = Arc<Mutex<VecDeque<SyncMessage>>>;

/// One end of the in-memory channel
pub struct QueueTransport {
    role: PeerRole,
    outbound: Queue,
    active: Arc<Mutex<bool>>,
}

impl PeerTransport for QueueTransport {
    fn send(&mut self, message: &SyncMessage) -> bool {
        if !self.is_active() {
            return false;
        }
        self.outbound.lock().push_back(message.clone());
        true
    }

    fn is_active(&self) -> bool {
        *self.active.lock()
    }

    fn role(&self) -> PeerRole {
        self.role
    }
}

/// Two sessions and the queues between them
pub struct LinkedPair {
    pub host: Session<MemoryBackend, QueueTransport>,
    pub guest: Session<MemoryBackend, QueueTransport>,
    host_to_guest: Queue,
    guest_to_host: Queue,
    active: Arc<Mutex<bool>>,
}

impl LinkedPair {
    pub fn new() -> Self {
        let host_to_guest: Queue = Arc::new(Mutex::new(VecDeque::new()));
        let guest_to_host: Queue = Arc::new(Mutex::new(VecDeque::new()));
        let active = Arc::new(Mutex::new(true));

        let host_transport = QueueTransport {
            role: PeerRole::Host,
            outbound: Arc::clone(&host_to_guest),
            active: Arc::clone(&active),
        };
        let guest_transport = QueueTransport {
            role: PeerRole::Guest,
            outbound: Arc::clone(&guest_to_host),
            active: Arc::clone(&active),
        };

        LinkedPair {
            host: Session::new(PeerRole::Host, MemoryBackend::new(), host_transport),
            guest: Session::new(PeerRole::Guest, MemoryBackend::new(), guest_transport),
            host_to_guest,
            guest_to_host,
            active,
        }
    }

    /// Deliver queued messages in arrival order, both directions, until
    /// the channel is drained. Returns how many messages were delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let to_guest = self.host_to_guest.lock().pop_front();
            if let Some(message) = to_guest {
                self.guest.handle_message(message);
                delivered += 1;
                continue;
            }
            let to_host = self.guest_to_host.lock().pop_front();
            if let Some(message) = to_host {
                self.host.handle_message(message);
                delivered += 1;
                continue;
            }
            break;
        }
        delivered
    }

    /// Silently drop everything in flight (a reconnect happened)
    pub fn drop_in_flight(&mut self) -> usize {
        let mut dropped = self.host_to_guest.lock().len();
        dropped += self.guest_to_host.lock().len();
        self.host_to_guest.lock().clear();
        self.guest_to_host.lock().clear();
        dropped
    }

    /// Toggle the channel. While inactive every send reports failure.
    pub fn set_active(&mut self, active: bool) {
        *self.active.lock() = active;
    }
}

impl Default for LinkedPair {
    fn default() -> Self {
        LinkedPair::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vitae_core::{kinds, InterviewEvent};
    use vitae_survey::states;
    use vitae_sync::SyncBody;

    /// Drive the host through a complete two-commune interview, pumping
    /// the channel after every answer like a live session would.
    fn run_interview(pair: &mut LinkedPair) {
        let script: Vec<(&str, serde_json::Value)> = vec![
            (kinds::NEXT, json!(null)),
            (kinds::BIRTH_YEAR, json!(1956)),
            (kinds::BIRTH_PLACE, json!("Nantes")),
            (kinds::CURRENT_COMMUNE, json!("Lyon")),
            (kinds::NO, json!(null)),
            (kinds::COMMUNES_LIST, json!(["Nantes", "Lyon"])),
            (kinds::COMMUNE_ARRIVAL, json!(1956)),
            (kinds::COMMUNE_DEPARTURE, json!(1980)),
            (kinds::NO, json!(null)),
            (kinds::OCCUPANCY_ENTRY, json!("tenant")),
            (kinds::OCCUPANCY_EXIT, json!("tenant")),
            (kinds::COMMUNE_ARRIVAL, json!(1980)),
            (kinds::COMMUNE_DEPARTURE, json!(2020)),
            (kinds::NO, json!(null)),
            (kinds::OCCUPANCY_ENTRY, json!("owner")),
            (kinds::OCCUPANCY_EXIT, json!("owner")),
        ];
        for (kind, value) in script {
            assert!(pair.host.answer(InterviewEvent::new(kind, value)));
            pair.pump();
        }
    }

    #[test]
    fn test_interview_converges_on_both_devices() {
        let mut pair = LinkedPair::new();
        run_interview(&mut pair);

        assert_eq!(pair.host.state(), states::COMPLETE);
        assert_eq!(pair.guest.state(), states::COMPLETE);

        // Replayed commands are deterministic: both stores hold identical
        // content, down to the assigned ids.
        assert_eq!(pair.host.store().all(), pair.guest.store().all());
        assert_eq!(pair.host.answers().len(), pair.guest.answers().len());
    }

    #[test]
    fn test_guest_forward_event_changes_neither_peer() {
        let mut pair = LinkedPair::new();
        assert!(!pair.guest.answer(InterviewEvent::bare(kinds::NEXT)));
        pair.pump();

        assert_eq!(pair.host.state(), states::WELCOME);
        assert_eq!(pair.guest.state(), states::WELCOME);
    }

    #[test]
    fn test_guest_amend_applies_on_both_peers() {
        let mut pair = LinkedPair::new();
        pair.host.answer(InterviewEvent::bare(kinds::NEXT));
        pair.host.answer(InterviewEvent::new(kinds::BIRTH_YEAR, json!(1956)));
        pair.pump();

        assert!(pair.guest.amend(states::BIRTH_YEAR, json!(1957)));
        pair.pump();

        assert_eq!(pair.host.context().birth_year, Some(1957));
        assert_eq!(pair.guest.context().birth_year, Some(1957));
        // Neither machine moved.
        assert_eq!(pair.host.state(), states::BIRTH_PLACE);
        assert_eq!(pair.guest.state(), states::BIRTH_PLACE);
    }

    #[test]
    fn test_host_late_answer_amends_instead_of_advancing() {
        let mut pair = LinkedPair::new();
        pair.host.answer(InterviewEvent::bare(kinds::NEXT));
        pair.host.answer(InterviewEvent::new(kinds::BIRTH_YEAR, json!(1956)));
        pair.host.answer(InterviewEvent::new(kinds::BIRTH_PLACE, json!("Nantes")));
        pair.pump();

        // The birth-year widget fires again while the machine sits at
        // current_commune: history correction, not forward progress.
        pair.host.answer(InterviewEvent::new(kinds::BIRTH_YEAR, json!(1957)));
        pair.pump();

        for session in [&pair.host, &pair.guest] {
            assert_eq!(session.state(), states::CURRENT_COMMUNE);
            assert_eq!(session.context().birth_year, Some(1957));
            assert_eq!(
                session.answers().get(states::BIRTH_YEAR).unwrap().payload,
                json!(1957)
            );
        }
    }

    #[test]
    fn test_update_items_replay_is_idempotent() {
        let mut pair = LinkedPair::new();
        run_interview(&mut pair);

        let mut edited = pair.host.store().all()[1].clone();
        edited.content = "Nantes nord".to_string();
        pair.host.update_items(vec![edited]);
        pair.pump();
        let after_once = pair.guest.store().all().to_vec();

        // The channel duplicated the message.
        let message = vitae_sync::SyncMessage::new(
            SyncBody::UpdateItems {
                items: vec![pair.host.store().all()[1].clone()],
            },
            vitae_core::TimePoint::ZERO,
            PeerRole::Host,
        );
        pair.guest.handle_message(message.clone());
        pair.guest.handle_message(message);

        assert_eq!(pair.guest.store().all(), &after_once[..]);
    }

    #[test]
    fn test_load_items_collision_inserts_under_new_id() {
        let mut pair = LinkedPair::new();
        run_interview(&mut pair);

        let before = pair.guest.store().len();
        // A full resync arrives although the guest already has every id.
        pair.host.resync_peer();
        pair.pump();

        // Nothing was overwritten; colliding items landed under fresh ids.
        assert_eq!(pair.guest.store().len(), before * 2);
        for episode in pair.host.store().all() {
            assert!(pair.guest.store().get(&episode.id).is_some());
        }
        assert_eq!(pair.guest.stats().imports_rekeyed, before as u64);
    }

    #[test]
    fn test_resync_recovers_from_in_flight_loss() {
        let mut pair = LinkedPair::new();
        pair.host.answer(InterviewEvent::bare(kinds::NEXT));
        pair.host.answer(InterviewEvent::new(kinds::BIRTH_YEAR, json!(1956)));
        // Reconnect: everything in flight silently vanishes.
        let dropped = pair.drop_in_flight();
        assert!(dropped > 0);
        assert!(pair.guest.store().is_empty());

        pair.host.resync_peer();
        pair.pump();

        assert_eq!(pair.guest.store().len(), pair.host.store().len());
    }

    #[test]
    fn test_inactive_channel_send_returns_false() {
        let mut pair = LinkedPair::new();
        pair.set_active(false);
        // The local apply still happens; only replication fails.
        assert!(pair.host.answer(InterviewEvent::bare(kinds::NEXT)));
        assert_eq!(pair.host.state(), states::BIRTH_YEAR);
        assert_eq!(pair.pump(), 0);
        assert_eq!(pair.guest.state(), states::WELCOME);
        assert!(!pair.host.resync_peer());
    }

    #[test]
    fn test_reset_propagates_to_peer() {
        let mut pair = LinkedPair::new();
        run_interview(&mut pair);
        assert!(!pair.guest.store().is_empty());

        pair.host.reset_all();
        pair.pump();

        for session in [&pair.host, &pair.guest] {
            assert_eq!(session.state(), states::WELCOME);
            assert!(session.store().is_empty());
            assert!(session.answers().is_empty());
        }
    }

    #[test]
    fn test_gap_visible_on_both_devices() {
        let mut pair = LinkedPair::new();
        pair.host.answer(InterviewEvent::bare(kinds::NEXT));
        pair.host.answer(InterviewEvent::new(kinds::BIRTH_YEAR, json!(1950)));
        pair.host.answer(InterviewEvent::new(kinds::BIRTH_PLACE, json!("Brest")));
        pair.host.answer(InterviewEvent::new(kinds::CURRENT_COMMUNE, json!("Paris")));
        pair.host.answer(InterviewEvent::bare(kinds::NO));
        pair.host.answer(InterviewEvent::new(kinds::COMMUNES_LIST, json!(["A", "B"])));
        pair.host.answer(InterviewEvent::new(kinds::COMMUNE_ARRIVAL, json!(2001)));
        pair.host.answer(InterviewEvent::new(kinds::COMMUNE_DEPARTURE, json!(2010)));
        pair.host.answer(InterviewEvent::bare(kinds::NO));
        pair.host.answer(InterviewEvent::new(kinds::OCCUPANCY_ENTRY, json!("owner")));
        pair.host.answer(InterviewEvent::new(kinds::OCCUPANCY_EXIT, json!("owner")));
        pair.host.answer(InterviewEvent::new(kinds::COMMUNE_ARRIVAL, json!(2012)));
        pair.host.answer(InterviewEvent::new(kinds::COMMUNE_DEPARTURE, json!(2020)));
        pair.pump();

        for session in [&pair.host, &pair.guest] {
            let communes_markers: Vec<_> = session
                .store()
                .markers()
                .iter()
                .filter(|m| m.group().as_str() == "communes")
                .collect();
            assert_eq!(communes_markers.len(), 1, "exactly one gap expected");
        }
    }
}
