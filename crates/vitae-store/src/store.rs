//! Episode store - the local timeline
//!
//! The store exclusively owns episodes. Everything entering it goes
//! through normalization: bare years, date strings and instants all become
//! [`TimePoint`]s, and the range invariant `start < end` is repaired (one
//! year is added or subtracted) rather than rejected.
//!
//! Change notifications accumulate in an internal queue the owner drains
//! after each mutation entry point; detectors, persistence and rendering
//! all consume the same stream.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, warn};

use vitae_core::{
    Episode, EpisodeId, EpisodeKind, Group, GroupId, Marker, TimePoint, VitaeError, VitaeResult,
};

/// A change the store wants observers to see
#[derive(Clone, Debug, PartialEq)]
pub enum StoreChange {
    Added(Vec<EpisodeId>),
    Updated(Vec<EpisodeId>),
    Removed(Vec<EpisodeId>),
    /// The marker side table was regenerated
    MarkersChanged,
}

/// Request to create one episode from interview answers.
///
/// Times are raw answer payloads; absent times fall back to the
/// dependent-group rule and then to the +1-year default.
#[derive(Clone, Debug)]
pub struct EpisodeSpec {
    pub content: String,
    pub kind: EpisodeKind,
    pub group: GroupId,
    pub start: Option<Value>,
    pub end: Option<Value>,
    pub icon: Option<String>,
}

/// Partial update applied by `modify`
#[derive(Clone, Debug, Default)]
pub struct EpisodePatch {
    pub content: Option<String>,
    pub start: Option<Value>,
    pub end: Option<Value>,
    pub icon: Option<String>,
}

/// The episode store
#[derive(Default)]
pub struct EpisodeStore {
    episodes: Vec<Episode>,
    groups: Vec<Group>,
    markers: Vec<Marker>,
    /// Non-owning reference to the most recently created episode
    last_episode: Option<EpisodeId>,
    next_seq: u64,
    changes: VecDeque<StoreChange>,
}

impl EpisodeStore {
    pub fn new() -> Self {
        EpisodeStore::default()
    }

    pub fn with_groups(groups: Vec<Group>) -> Self {
        EpisodeStore {
            groups,
            ..Default::default()
        }
    }

    // -- groups -------------------------------------------------------------

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| &g.id == id)
    }

    pub fn set_groups(&mut self, groups: Vec<Group>) {
        self.groups = groups;
    }

    // -- reads --------------------------------------------------------------

    pub fn get(&self, id: &EpisodeId) -> Option<&Episode> {
        self.episodes.iter().find(|e| &e.id == id)
    }

    /// Episodes of one group, in insertion order
    pub fn by_group(&self, group: &GroupId) -> Vec<&Episode> {
        self.episodes.iter().filter(|e| &e.group == group).collect()
    }

    pub fn all(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn last_episode(&self) -> Option<&EpisodeId> {
        self.last_episode.as_ref()
    }

    // -- creation -----------------------------------------------------------

    /// Create an episode from interview answers. Returns the assigned id;
    /// an unknown group or an unresolvable start drops the answer with an
    /// error the caller logs, never a panic.
    pub fn create(&mut self, spec: EpisodeSpec) -> VitaeResult<EpisodeId> {
        let Some(group) = self.group(&spec.group).cloned() else {
            warn!(group = %spec.group, "create dropped: unknown group");
            return Err(VitaeError::GroupNotFound(spec.group));
        };

        // Positional defaults: the i-th segment of a dependent group
        // inherits bounds from the i-th segment of its parent group. A
        // point binds to the segment it annotates, i.e. the latest one.
        let positional = group.depends_on.as_ref().and_then(|parent| {
            let segments = self
                .by_group(&spec.group)
                .iter()
                .filter(|e| e.is_range())
                .count();
            let index = match spec.kind {
                EpisodeKind::Range => segments,
                EpisodeKind::Point => segments.checked_sub(1)?,
            };
            self.by_group(parent)
                .into_iter()
                .filter(|e| e.is_range())
                .nth(index)
                .cloned()
        });

        let supplied_start = spec.start.as_ref().and_then(|v| {
            let t = TimePoint::normalize(v);
            if t.is_none() {
                warn!(value = %v, "start dropped: unparseable");
            }
            t
        });
        let supplied_end = spec.end.as_ref().and_then(|v| {
            let t = TimePoint::normalize(v);
            if t.is_none() {
                warn!(value = %v, "end dropped: unparseable");
            }
            t
        });

        let start = supplied_start.or_else(|| match spec.kind {
            // A dependent point marks the moment its parent segment ends.
            EpisodeKind::Point => positional
                .as_ref()
                .and_then(|p| p.end.or(Some(p.start))),
            EpisodeKind::Range => positional.as_ref().map(|p| p.start),
        });
        let Some(start) = start else {
            warn!(group = %spec.group, "create dropped: no usable start");
            let raw = spec
                .start
                .map(|v| v.to_string())
                .unwrap_or_else(|| "missing".to_string());
            return Err(VitaeError::InvalidTime(raw));
        };

        let end = match spec.kind {
            EpisodeKind::Point => None,
            EpisodeKind::Range => {
                let end = supplied_end
                    .or_else(|| positional.as_ref().and_then(|p| p.end))
                    .unwrap_or_else(|| start.plus_years(1));
                // Repair inverted or empty ranges.
                Some(if end > start { end } else { start.plus_years(1) })
            }
        };

        let id = self.fresh_id();
        let episode = Episode {
            id: id.clone(),
            kind: spec.kind,
            content: spec.content,
            start,
            end,
            group: spec.group,
            class_name: group.family.class_name().to_string(),
            icon: spec.icon,
        };
        self.episodes.push(episode);
        self.last_episode = Some(id.clone());
        self.changes.push_back(StoreChange::Added(vec![id.clone()]));
        Ok(id)
    }

    fn fresh_id(&mut self) -> EpisodeId {
        loop {
            self.next_seq += 1;
            let id = EpisodeId::from_seq(self.next_seq);
            if self.get(&id).is_none() {
                return id;
            }
        }
    }

    // -- modification -------------------------------------------------------

    /// Apply a partial update. A missing target is a logged no-op
    /// surfaced as an error the caller may inspect, never a failure that
    /// propagates.
    pub fn modify(&mut self, id: &EpisodeId, patch: EpisodePatch) -> VitaeResult<()> {
        let Some(index) = self.episodes.iter().position(|e| &e.id == id) else {
            warn!(%id, "modify on unknown episode: no-op");
            return Err(VitaeError::EpisodeNotFound(id.clone()));
        };

        let new_start = patch.start.as_ref().and_then(TimePoint::normalize);
        let new_end = patch.end.as_ref().and_then(TimePoint::normalize);

        let episode = &mut self.episodes[index];
        if let Some(content) = patch.content {
            episode.content = content;
        }
        if let Some(icon) = patch.icon {
            episode.icon = Some(icon);
        }

        match episode.kind {
            EpisodeKind::Point => {
                if let Some(start) = new_start {
                    episode.start = start;
                }
                // Points carry no end; an end-only patch changes nothing.
            }
            EpisodeKind::Range => {
                Self::apply_range_patch(episode, new_start, new_end);
            }
        }

        self.changes.push_back(StoreChange::Updated(vec![id.clone()]));
        Ok(())
    }

    /// Range repair rules: a start pushed to or past the end drags the end
    /// one year forward; an end pushed to or before the start drags the
    /// start one year back.
    fn apply_range_patch(
        episode: &mut Episode,
        new_start: Option<TimePoint>,
        new_end: Option<TimePoint>,
    ) {
        match (new_start, new_end) {
            (Some(start), Some(end)) => {
                episode.start = start;
                episode.end = Some(if end > start { end } else { start.plus_years(1) });
            }
            (Some(start), None) => {
                episode.start = start;
                match episode.end {
                    Some(end) if end > start => {}
                    _ => episode.end = Some(start.plus_years(1)),
                }
            }
            (None, Some(end)) => {
                if end <= episode.start {
                    episode.start = end.plus_years(-1);
                }
                episode.end = Some(end);
            }
            (None, None) => {}
        }
    }

    // -- merge (sync) -------------------------------------------------------

    /// Id-matched merge: a matching id updates in place, an unmatched id
    /// appends. Replaying the same items is idempotent.
    pub fn upsert_many(&mut self, items: Vec<Episode>) {
        let mut added = Vec::new();
        let mut updated = Vec::new();

        for item in items {
            match self.episodes.iter_mut().find(|e| e.id == item.id) {
                Some(existing) => {
                    if *existing != item {
                        *existing = item.clone();
                        updated.push(item.id);
                    }
                }
                None => {
                    added.push(item.id.clone());
                    self.episodes.push(item);
                }
            }
        }

        if !added.is_empty() {
            self.changes.push_back(StoreChange::Added(added));
        }
        if !updated.is_empty() {
            self.changes.push_back(StoreChange::Updated(updated));
        }
    }

    /// Bulk import. A colliding id is rekeyed with a disambiguating
    /// suffix before insertion; the import never fails. Returns the number
    /// of rekeyed items.
    pub fn import(&mut self, items: Vec<Episode>) -> u32 {
        let mut collisions = 0;
        let mut added = Vec::new();

        for mut item in items {
            if self.get(&item.id).is_some() {
                let mut n = 2;
                let mut candidate = item.id.with_suffix(n);
                while self.get(&candidate).is_some() {
                    n += 1;
                    candidate = item.id.with_suffix(n);
                }
                debug!(from = %item.id, to = %candidate, "import collision rekeyed");
                item.id = candidate;
                collisions += 1;
            }
            added.push(item.id.clone());
            self.episodes.push(item);
        }

        if !added.is_empty() {
            self.changes.push_back(StoreChange::Added(added));
        }
        collisions
    }

    // -- removal ------------------------------------------------------------

    pub fn remove(&mut self, ids: &[EpisodeId]) {
        let mut removed = Vec::new();
        self.episodes.retain(|e| {
            if ids.contains(&e.id) {
                removed.push(e.id.clone());
                false
            } else {
                true
            }
        });
        if let Some(last) = &self.last_episode {
            if removed.contains(last) {
                self.last_episode = None;
            }
        }
        if !removed.is_empty() {
            self.changes.push_back(StoreChange::Removed(removed));
        }
    }

    /// Drop every episode of one group (a list answer was replaced)
    pub fn remove_group(&mut self, group: &GroupId) {
        let ids: Vec<EpisodeId> = self
            .by_group(group)
            .iter()
            .map(|e| e.id.clone())
            .collect();
        self.remove(&ids);
    }

    /// Clear everything, including markers and the sequence counter
    pub fn clear(&mut self) {
        let ids: Vec<EpisodeId> = self.episodes.iter().map(|e| e.id.clone()).collect();
        self.episodes.clear();
        self.markers.clear();
        self.last_episode = None;
        self.next_seq = 0;
        if !ids.is_empty() {
            self.changes.push_back(StoreChange::Removed(ids));
        }
    }

    // -- markers ------------------------------------------------------------

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Replace the marker side table (full-rescan semantics)
    pub fn set_markers(&mut self, markers: Vec<Marker>) {
        if self.markers != markers {
            self.markers = markers;
            self.changes.push_back(StoreChange::MarkersChanged);
        }
    }

    // -- notifications ------------------------------------------------------

    /// Take the accumulated change notifications, in mutation order
    pub fn drain_changes(&mut self) -> Vec<StoreChange> {
        self.changes.drain(..).collect()
    }

    // -- snapshots ----------------------------------------------------------

    /// Episodes as a persistable value (markers are never included)
    pub fn snapshot_items(&self) -> Value {
        serde_json::to_value(&self.episodes).unwrap_or(Value::Null)
    }

    pub fn snapshot_groups(&self) -> Value {
        serde_json::to_value(&self.groups).unwrap_or(Value::Null)
    }

    /// Restore episodes from a persisted snapshot, resetting the sequence
    /// counter past every restored local id
    pub fn restore_items(&mut self, value: Value) {
        let Ok(items) = serde_json::from_value::<Vec<Episode>>(value) else {
            warn!("items snapshot unreadable: starting empty");
            return;
        };
        self.next_seq = items
            .iter()
            .filter_map(|e| e.id.as_str().strip_prefix("ep-"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        self.episodes = items;
    }

    pub fn restore_groups(&mut self, value: Value) {
        match serde_json::from_value::<Vec<Group>>(value) {
            Ok(groups) => self.groups = groups,
            Err(_) => warn!("groups snapshot unreadable: keeping defaults"),
        }
    }
}
