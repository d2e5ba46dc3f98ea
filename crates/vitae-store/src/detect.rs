//! Gap and overlap detection
//!
//! Pure recomputation passes over the store: per group, range episodes are
//! sorted by start and adjacent pairs compared. Passes are full-rescan
//! (clear, recompute, re-add) since groups hold tens of episodes at most.
//!
//! The detector is latched while it writes markers so its own
//! `MarkersChanged` notifications cannot re-trigger it, and fresh
//! inconsistencies are announced once per stable key across passes.

use std::collections::HashSet;

use tracing::info;

use vitae_core::{Episode, GapMarker, Marker, OverlapMarker, TimePoint};

use crate::store::{EpisodeStore, StoreChange};

type FreshMarkerFn = Box<dyn FnMut(&Marker)>;

/// Timeline consistency detector
#[derive(Default)]
pub struct ConsistencyDetector {
    /// Held during a pass; its own marker writes must not re-trigger it
    latched: bool,
    /// Dedup keys already announced
    seen: HashSet<String>,
    on_fresh: Option<FreshMarkerFn>,
}

impl ConsistencyDetector {
    pub fn new() -> Self {
        ConsistencyDetector::default()
    }

    /// Register a callback for newly detected inconsistencies
    pub fn on_fresh(&mut self, callback: impl FnMut(&Marker) + 'static) {
        self.on_fresh = Some(Box::new(callback));
    }

    /// React to drained store changes: episode mutations trigger a pass,
    /// marker-only change sets do not (and a latched detector never
    /// re-enters).
    pub fn on_changes(&mut self, store: &mut EpisodeStore, changes: &[StoreChange]) {
        if self.latched {
            return;
        }
        let episodes_changed = changes
            .iter()
            .any(|c| !matches!(c, StoreChange::MarkersChanged));
        if !episodes_changed {
            return;
        }
        self.run(store);
    }

    /// One full detection pass
    pub fn run(&mut self, store: &mut EpisodeStore) {
        self.latched = true;
        let markers = Self::scan(store);

        for marker in &markers {
            if self.seen.insert(marker.dedup_key()) {
                match marker {
                    Marker::Gap(g) => {
                        info!(group = %g.group, start = %g.start, end = %g.end, "timeline gap detected");
                    }
                    Marker::Overlap(o) => {
                        info!(group = %o.group, start = %o.start, end = %o.end, "timeline overlap detected");
                    }
                }
                if let Some(callback) = &mut self.on_fresh {
                    callback(marker);
                }
            }
        }

        store.set_markers(markers);
        self.latched = false;
    }

    /// Recompute all markers from scratch
    fn scan(store: &EpisodeStore) -> Vec<Marker> {
        let mut markers = Vec::new();
        for group in store.groups() {
            let mut episodes: Vec<&Episode> = store
                .by_group(&group.id)
                .into_iter()
                .filter(|e| e.is_range() && e.end.is_some())
                .collect();
            episodes.sort_by_key(|e| e.start);

            for pair in episodes.windows(2) {
                let (prev, cur) = (pair[0], pair[1]);
                let Some(prev_end) = prev.end else { continue };

                if cur.start > prev_end {
                    markers.push(Marker::Gap(GapMarker {
                        group: group.id.clone(),
                        start: prev_end,
                        end: cur.start,
                    }));
                } else if cur.start < prev_end {
                    let Some(cur_end) = cur.end else { continue };
                    markers.push(Marker::Overlap(OverlapMarker {
                        group: group.id.clone(),
                        start: cur.start,
                        end: TimePoint::min(prev_end, cur_end),
                        episodes: (prev.id.clone(), cur.id.clone()),
                    }));
                }
            }
        }
        markers
    }

    /// Forget announced keys (used on reset)
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
