//! Session node - per-device orchestration
//!
//! Every mutation entry point (a local answer, an inbound peer message, a
//! manual timeline edit) runs to completion before the next is admitted.
//! Inbound messages are applied in arrival order through the same path as
//! local events. Persistence is debounced through a dirty-key set drained
//! by [`Session::flush`]; a failed save is logged and never fatal.

use std::collections::HashSet;

use serde_json::{json, Value};
use tracing::{debug, warn};

use vitae_core::{Episode, InterviewEvent, PeerRole, TimePoint};
use vitae_machine::{Interpreter, Snapshot};
use vitae_store::{
    ConsistencyDetector, EpisodePatch, EpisodeSpec, EpisodeStore, Persistence, StorageKey,
    StoreChange,
};
use vitae_survey::{
    default_groups, survey_machine, AnswerHistory, ContextPatch, EpisodeTarget, SurveyCommand,
    SurveyContext,
};
use vitae_sync::{
    classify_outbound, inbound_allowed, OutboundDecision, PeerTransport, SyncBody, SyncMessage,
};

/// Counters mirroring what the node has seen
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    pub events_applied: u64,
    pub events_rejected: u64,
    pub amends_converted: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub imports_rekeyed: u64,
    pub flushes: u64,
}

type Clock = Box<dyn Fn() -> TimePoint>;
type StoreListener = Box<dyn FnMut(&[StoreChange])>;

fn wall_clock() -> TimePoint {
    TimePoint::from_millis(chrono::Utc::now().timestamp_millis())
}

/// One device's interview session
pub struct Session<P: Persistence, T: PeerTransport> {
    interpreter: Interpreter<SurveyContext, SurveyCommand>,
    store: EpisodeStore,
    detector: ConsistencyDetector,
    answers: AnswerHistory,
    persistence: P,
    transport: T,
    role: PeerRole,
    store_ready: bool,
    /// The single buffered bulk import awaiting store readiness
    pending_import: Vec<Episode>,
    dirty: HashSet<StorageKey>,
    render_listener: Option<StoreListener>,
    clock: Clock,
    stats: SessionStats,
}

impl<P: Persistence, T: PeerTransport> Session<P, T> {
    /// Build a session and restore whatever the backend holds. The store
    /// is ready immediately; a restored pending import drains at once.
    pub fn new(role: PeerRole, persistence: P, transport: T) -> Self {
        let mut session = Self::build(role, persistence, transport, Box::new(wall_clock), true);
        session.drain_pending_import();
        session
    }

    /// Build a session whose store is not yet ready: bulk imports queue
    /// in the pending buffer until [`Session::mark_store_ready`].
    pub fn new_deferred(role: PeerRole, persistence: P, transport: T) -> Self {
        Self::build(role, persistence, transport, Box::new(wall_clock), false)
    }

    /// Inject a deterministic clock (tests)
    pub fn with_clock(mut self, clock: impl Fn() -> TimePoint + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    fn build(role: PeerRole, persistence: P, transport: T, clock: Clock, ready: bool) -> Self {
        let mut interpreter = Interpreter::new(survey_machine(), SurveyContext::default());

        let groups = persistence
            .load(StorageKey::Groups)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(default_groups);
        let mut store = EpisodeStore::with_groups(groups);
        if let Some(items) = persistence.load(StorageKey::Items) {
            store.restore_items(items);
        }

        let saved_state = persistence
            .load(StorageKey::MachineState)
            .and_then(|v| v.as_str().map(String::from));
        let saved_context = persistence
            .load(StorageKey::Context)
            .and_then(|v| serde_json::from_value::<SurveyContext>(v).ok());
        if let (Some(state), Some(context)) = (saved_state, saved_context) {
            if !interpreter.restore(&state, context) {
                warn!(%state, "machine snapshot unusable: starting fresh");
            }
        }

        let answers = persistence
            .load(StorageKey::Answers)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let pending_import = persistence
            .load(StorageKey::PendingImport)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        Session {
            interpreter,
            store,
            detector: ConsistencyDetector::new(),
            answers,
            persistence,
            transport,
            role,
            store_ready: ready,
            pending_import,
            // Catalog and options land on the first flush of every session.
            dirty: HashSet::from([StorageKey::Groups, StorageKey::Options]),
            render_listener: None,
            clock,
            stats: SessionStats::default(),
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn state(&self) -> &'static str {
        self.interpreter.state()
    }

    pub fn context(&self) -> &SurveyContext {
        self.interpreter.context()
    }

    pub fn store(&self) -> &EpisodeStore {
        &self.store
    }

    pub fn answers(&self) -> &AnswerHistory {
        &self.answers
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn is_complete(&self) -> bool {
        self.interpreter.is_terminal()
    }

    // -- collaborators ------------------------------------------------------

    /// Rendering hook: settled machine snapshots
    pub fn subscribe_machine(&mut self, callback: impl FnMut(&Snapshot<'_, SurveyContext>) + 'static) {
        self.interpreter.subscribe(callback);
    }

    /// Rendering hook: store change batches, markers included
    pub fn on_store_changes(&mut self, callback: impl FnMut(&[StoreChange]) + 'static) {
        self.render_listener = Some(Box::new(callback));
    }

    /// Notification hook for freshly detected timeline inconsistencies
    pub fn on_inconsistency(&mut self, callback: impl FnMut(&vitae_core::Marker) + 'static) {
        self.detector.on_fresh(callback);
    }

    // -- local answers ------------------------------------------------------

    /// Submit an answer from this device's user.
    ///
    /// Guest forward attempts return false without touching any state. A
    /// host answering a question it no longer occupies is transparently
    /// converted into an amend.
    pub fn answer(&mut self, event: InterviewEvent) -> bool {
        match classify_outbound(self.role, self.interpreter.state(), &event) {
            OutboundDecision::Reject => {
                self.stats.events_rejected += 1;
                false
            }
            OutboundDecision::ConvertToAmend(amend) => {
                self.stats.amends_converted += 1;
                self.apply_local(&amend);
                self.send_to_peer(SyncBody::SurveyEvent { event: amend });
                true
            }
            OutboundDecision::Forward => {
                self.apply_local(&event);
                self.send_to_peer(SyncBody::SurveyEvent { event });
                true
            }
        }
    }

    /// Correct a past answer without moving the interview forward
    pub fn amend(&mut self, key: &str, value: Value) -> bool {
        self.answer(InterviewEvent::amend(key, value))
    }

    // -- inbound messages ---------------------------------------------------

    /// Apply one message from the peer. Called in arrival order; each call
    /// runs to completion before the next is admitted.
    pub fn handle_message(&mut self, message: SyncMessage) {
        self.stats.messages_in += 1;
        match message.body {
            SyncBody::SurveyEvent { event } => {
                if !inbound_allowed(message.sender, &event) {
                    debug!(sender = %message.sender, kind = %event.kind, "inbound forward event rejected");
                    self.stats.events_rejected += 1;
                    return;
                }
                self.apply_local(&event);
            }
            SyncBody::AddItems { items } | SyncBody::UpdateItems { items } => {
                self.store.upsert_many(items);
                self.process_store_changes();
            }
            SyncBody::LoadItems { items } => {
                if self.store_ready {
                    let rekeyed = self.store.import(items);
                    self.stats.imports_rekeyed += u64::from(rekeyed);
                    self.process_store_changes();
                } else {
                    debug!(count = items.len(), "store not ready: import buffered");
                    self.pending_import = items;
                    self.dirty.insert(StorageKey::PendingImport);
                }
            }
            SyncBody::ResetAllData => {
                self.reset_local();
            }
        }
    }

    // -- manual timeline edits ----------------------------------------------

    /// Merge locally edited items and replicate them to the peer
    pub fn add_items(&mut self, items: Vec<Episode>) {
        self.store.upsert_many(items.clone());
        self.process_store_changes();
        self.send_to_peer(SyncBody::AddItems { items });
    }

    pub fn update_items(&mut self, items: Vec<Episode>) {
        self.store.upsert_many(items.clone());
        self.process_store_changes();
        self.send_to_peer(SyncBody::UpdateItems { items });
    }

    /// Push the full local timeline to the peer (reconnect recovery)
    pub fn resync_peer(&mut self) -> bool {
        let items = self.store.all().to_vec();
        self.send_to_peer(SyncBody::LoadItems { items })
    }

    /// Clear everything on both devices
    pub fn reset_all(&mut self) {
        self.send_to_peer(SyncBody::ResetAllData);
        self.reset_local();
    }

    // -- store readiness ----------------------------------------------------

    pub fn mark_store_ready(&mut self) {
        self.store_ready = true;
        self.drain_pending_import();
    }

    fn drain_pending_import(&mut self) {
        if !self.store_ready || self.pending_import.is_empty() {
            return;
        }
        let items = std::mem::take(&mut self.pending_import);
        let rekeyed = self.store.import(items);
        self.stats.imports_rekeyed += u64::from(rekeyed);
        self.process_store_changes();
        self.dirty.insert(StorageKey::PendingImport);
    }

    // -- persistence --------------------------------------------------------

    /// Drain the dirty-key set into the backend. Best-effort: failures are
    /// logged and the session keeps going.
    pub fn flush(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let keys: Vec<StorageKey> = self.dirty.drain().collect();
        for key in keys {
            let value = self.snapshot_for(key);
            if let Err(err) = self.persistence.save(key, value) {
                warn!(key = key.name(), %err, "persistence save failed");
            }
        }
        self.stats.flushes += 1;
    }

    fn snapshot_for(&self, key: StorageKey) -> Value {
        match key {
            StorageKey::Context => {
                serde_json::to_value(self.interpreter.context()).unwrap_or(Value::Null)
            }
            StorageKey::MachineState => Value::String(self.interpreter.state().to_string()),
            StorageKey::Answers => serde_json::to_value(&self.answers).unwrap_or(Value::Null),
            StorageKey::Items => self.store.snapshot_items(),
            StorageKey::Groups => self.store.snapshot_groups(),
            StorageKey::Options => json!({ "role": self.role }),
            StorageKey::PendingImport => {
                serde_json::to_value(&self.pending_import).unwrap_or(Value::Null)
            }
        }
    }

    // -- internals ----------------------------------------------------------

    /// The single apply path shared by local and remote survey events
    fn apply_local(&mut self, event: &InterviewEvent) {
        let state_before = self.interpreter.state();
        let commands = self.interpreter.send(event);
        let progressed = state_before != self.interpreter.state() || !commands.is_empty();

        if event.is_amend() {
            if let (Some(key), Some(value)) = (event.amend_key(), event.amend_value()) {
                let key = key.to_string();
                let value = value.clone();
                let now = (self.clock)();
                self.answers.record(&key, value, now);
            }
        } else if progressed {
            let now = (self.clock)();
            self.answers.record(state_before, event.value.clone(), now);
        }

        for command in commands {
            self.apply_command(command);
        }
        self.process_store_changes();

        if progressed || event.is_amend() {
            self.stats.events_applied += 1;
            self.dirty.insert(StorageKey::Context);
            self.dirty.insert(StorageKey::MachineState);
            self.dirty.insert(StorageKey::Answers);
        }
    }

    fn apply_command(&mut self, command: SurveyCommand) {
        match command {
            SurveyCommand::CreateEpisode {
                content,
                group,
                kind,
                start,
                end,
            } => {
                let spec = EpisodeSpec {
                    content,
                    kind,
                    group,
                    start,
                    end,
                    icon: None,
                };
                match self.store.create(spec) {
                    Ok(id) => self.interpreter.patch_context(ContextPatch {
                        last_episode: Some(Some(id)),
                        ..Default::default()
                    }),
                    Err(err) => debug!(%err, "episode creation skipped"),
                }
            }
            SurveyCommand::AmendEpisode {
                target,
                content,
                start,
                end,
            } => {
                let id = match target {
                    EpisodeTarget::LastCreated => self.store.last_episode().cloned(),
                    EpisodeTarget::ById(id) => Some(id),
                };
                match id {
                    Some(id) => {
                        let patch = EpisodePatch {
                            content,
                            start,
                            end,
                            icon: None,
                        };
                        if let Err(err) = self.store.modify(&id, patch) {
                            debug!(%err, "episode amend skipped");
                        }
                    }
                    None => warn!("episode amend dropped: no target"),
                }
            }
            SurveyCommand::ClearGroup { group } => {
                self.store.remove_group(&group);
            }
        }
    }

    /// Drain store notifications, feed the detector, and mark items dirty.
    /// The loop also drains the detector's own marker notification so
    /// rendering sees it, while the latch keeps the pass from re-entering.
    fn process_store_changes(&mut self) {
        loop {
            let changes = self.store.drain_changes();
            if changes.is_empty() {
                break;
            }
            self.detector.on_changes(&mut self.store, &changes);
            if changes
                .iter()
                .any(|c| !matches!(c, StoreChange::MarkersChanged))
            {
                self.dirty.insert(StorageKey::Items);
            }
            if let Some(callback) = &mut self.render_listener {
                callback(&changes);
            }
        }
    }

    fn send_to_peer(&mut self, body: SyncBody) -> bool {
        if !self.transport.is_active() {
            debug!("send skipped: transport inactive");
            return false;
        }
        let message = SyncMessage::new(body, (self.clock)(), self.role);
        let sent = self.transport.send(&message);
        if sent {
            self.stats.messages_out += 1;
        }
        sent
    }

    fn reset_local(&mut self) {
        for key in StorageKey::ALL {
            self.persistence.remove(key);
        }
        self.store.clear();
        self.store.set_groups(default_groups());
        self.detector.clear();
        self.answers.clear();
        self.pending_import.clear();
        self.interpreter.reset(SurveyContext::default());
        self.dirty.clear();
        self.process_store_changes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vitae_core::kinds;
    use vitae_store::{FailingBackend, MemoryBackend};
    use vitae_survey::states;
    use vitae_sync::NullTransport;

    fn host() -> Session<MemoryBackend, NullTransport> {
        Session::new(
            PeerRole::Host,
            MemoryBackend::new(),
            NullTransport::new(PeerRole::Host),
        )
        .with_clock(|| TimePoint::from_millis(1_000))
    }

    fn run_full_interview(session: &mut Session<MemoryBackend, NullTransport>) {
        session.answer(InterviewEvent::bare(kinds::NEXT));
        session.answer(InterviewEvent::new(kinds::BIRTH_YEAR, json!(1956)));
        session.answer(InterviewEvent::new(kinds::BIRTH_PLACE, json!("Nantes")));
        session.answer(InterviewEvent::new(kinds::CURRENT_COMMUNE, json!("Lyon")));
        session.answer(InterviewEvent::bare(kinds::NO));
        session.answer(InterviewEvent::new(kinds::COMMUNES_LIST, json!(["Nantes", "Lyon"])));
        for (arrival, departure) in [(1956, 1980), (1980, 2020)] {
            session.answer(InterviewEvent::new(kinds::COMMUNE_ARRIVAL, json!(arrival)));
            session.answer(InterviewEvent::new(kinds::COMMUNE_DEPARTURE, json!(departure)));
            session.answer(InterviewEvent::bare(kinds::NO));
            session.answer(InterviewEvent::new(kinds::OCCUPANCY_ENTRY, json!("tenant")));
            session.answer(InterviewEvent::new(kinds::OCCUPANCY_EXIT, json!("tenant")));
        }
    }

    #[test]
    fn test_full_interview_builds_timeline() {
        let mut session = host();
        run_full_interview(&mut session);

        assert_eq!(session.state(), states::COMPLETE);
        assert!(session.is_complete());
        // 1 birth point + 2 communes + 2 housings + 2 occupancy ranges.
        assert_eq!(session.store().len(), 7);
        // Housing bounds came positionally from the communes.
        let housings = session.store().by_group(&"housings".into());
        assert_eq!(housings.len(), 2);
        assert_eq!(housings[0].start.year(), 1956);
        assert_eq!(housings[1].start.year(), 1980);
        assert!(housings.iter().all(|e| e.valid_range()));
    }

    #[test]
    fn test_guest_forward_rejected_locally() {
        let mut session = Session::new(
            PeerRole::Guest,
            MemoryBackend::new(),
            NullTransport::new(PeerRole::Guest),
        );
        assert!(!session.answer(InterviewEvent::bare(kinds::NEXT)));
        assert_eq!(session.state(), states::WELCOME);
        assert_eq!(session.stats().events_rejected, 1);
    }

    #[test]
    fn test_guest_amend_applies() {
        let mut session = Session::new(
            PeerRole::Guest,
            MemoryBackend::new(),
            NullTransport::new(PeerRole::Guest),
        );
        assert!(session.amend(states::BIRTH_YEAR, json!(1957)));
        assert_eq!(session.context().birth_year, Some(1957));
        assert_eq!(session.state(), states::WELCOME);
    }

    #[test]
    fn test_host_mismatched_forward_becomes_amend() {
        let mut session = host();
        session.answer(InterviewEvent::bare(kinds::NEXT));
        session.answer(InterviewEvent::new(kinds::BIRTH_YEAR, json!(1956)));
        assert_eq!(session.state(), states::BIRTH_PLACE);

        // Re-answering the birth year from the past question's widget.
        assert!(session.answer(InterviewEvent::new(kinds::BIRTH_YEAR, json!(1957))));
        // No forward progress, but the context and history updated.
        assert_eq!(session.state(), states::BIRTH_PLACE);
        assert_eq!(session.context().birth_year, Some(1957));
        assert_eq!(
            session.answers().get(states::BIRTH_YEAR).unwrap().payload,
            json!(1957)
        );
        assert_eq!(session.stats().amends_converted, 1);
    }

    #[test]
    fn test_flush_restore_roundtrip() {
        let mut session = host();
        run_full_interview(&mut session);
        session.flush();

        // Steal the backend and restart.
        let backend = std::mem::take(&mut session.persistence);
        let restored = Session::new(
            PeerRole::Host,
            backend,
            NullTransport::new(PeerRole::Host),
        );

        assert_eq!(restored.state(), states::COMPLETE);
        assert_eq!(restored.context().communes, session.context().communes);
        assert_eq!(restored.store().len(), session.store().len());
        assert_eq!(restored.answers().len(), session.answers().len());
    }

    #[test]
    fn test_failing_backend_is_not_fatal() {
        let mut session = Session::new(
            PeerRole::Host,
            FailingBackend,
            NullTransport::new(PeerRole::Host),
        );
        session.answer(InterviewEvent::bare(kinds::NEXT));
        session.flush();
        assert_eq!(session.state(), states::BIRTH_YEAR);
        assert_eq!(session.stats().flushes, 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = host();
        run_full_interview(&mut session);
        session.flush();
        session.reset_all();

        assert_eq!(session.state(), states::WELCOME);
        assert!(session.store().is_empty());
        assert!(session.answers().is_empty());
        assert_eq!(session.persistence.load(StorageKey::Items), None);
    }

    #[test]
    fn test_pending_import_drains_on_readiness() {
        let mut session = Session::new_deferred(
            PeerRole::Guest,
            MemoryBackend::new(),
            NullTransport::new(PeerRole::Guest),
        );

        let items = vec![Episode {
            id: "remote-1".into(),
            kind: vitae_core::EpisodeKind::Range,
            content: "Lyon".to_string(),
            start: TimePoint::from_year(2001).unwrap(),
            end: Some(TimePoint::from_year(2010).unwrap()),
            group: "communes".into(),
            class_name: "residence".to_string(),
            icon: None,
        }];
        session.handle_message(SyncMessage::new(
            SyncBody::LoadItems { items },
            TimePoint::ZERO,
            PeerRole::Host,
        ));
        assert!(session.store().is_empty());

        session.mark_store_ready();
        assert_eq!(session.store().len(), 1);

        // The buffer drains exactly once.
        session.mark_store_ready();
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn test_detector_runs_after_survey_mutations() {
        let mut session = host();
        session.answer(InterviewEvent::bare(kinds::NEXT));
        session.answer(InterviewEvent::new(kinds::BIRTH_YEAR, json!(1950)));
        session.answer(InterviewEvent::new(kinds::BIRTH_PLACE, json!("Brest")));
        session.answer(InterviewEvent::new(kinds::CURRENT_COMMUNE, json!("Paris")));
        session.answer(InterviewEvent::bare(kinds::NO));
        session.answer(InterviewEvent::new(kinds::COMMUNES_LIST, json!(["A", "B"])));
        // A: 1950-1960, B: 1962-1970 -> one gap in the communes group.
        session.answer(InterviewEvent::new(kinds::COMMUNE_ARRIVAL, json!(1950)));
        session.answer(InterviewEvent::new(kinds::COMMUNE_DEPARTURE, json!(1960)));
        session.answer(InterviewEvent::bare(kinds::NO));
        session.answer(InterviewEvent::new(kinds::OCCUPANCY_ENTRY, json!("owner")));
        session.answer(InterviewEvent::new(kinds::OCCUPANCY_EXIT, json!("owner")));
        session.answer(InterviewEvent::new(kinds::COMMUNE_ARRIVAL, json!(1962)));
        session.answer(InterviewEvent::new(kinds::COMMUNE_DEPARTURE, json!(1970)));

        let gaps: Vec<_> = session
            .store()
            .markers()
            .iter()
            .filter(|m| m.group() == &"communes".into())
            .collect();
        assert_eq!(gaps.len(), 1);
    }
}
