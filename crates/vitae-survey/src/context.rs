//! Survey context - the durable working memory of the interview
//!
//! The context is everything the machine needs to resume after a restart:
//! answers that drive branching, the two loop counters, and the active
//! group pointer. The last-episode reference is deliberately excluded from
//! serialization; snapshots must never carry a live episode reference.

use serde::{Deserialize, Serialize};

use vitae_core::{EpisodeId, GroupId};
use vitae_machine::MachineContext;

/// Working memory of one interview session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyContext {
    pub birth_year: Option<i32>,
    pub birth_place: Option<String>,
    /// Commune and department the interviewee lives in today
    pub current_commune: Option<String>,
    /// Ordered list of communes lived in, oldest first
    pub communes: Vec<String>,
    /// Housing labels for the commune currently under iteration
    pub housings: Vec<String>,
    /// Index of the commune being placed (first bounded loop)
    pub commune_index: usize,
    /// Index of the housing being placed (second, nested loop)
    pub housing_index: usize,
    /// Group receiving the episodes of the current question
    pub active_group: Option<GroupId>,
    /// Occupancy status given at housing entry, pending the exit answer
    pub entry_status: Option<String>,
    /// Most recently created episode. Non-owning, never serialized.
    #[serde(skip)]
    pub last_episode: Option<EpisodeId>,
    /// True while the interview is underway
    pub live: bool,
}

/// Patch merged into the context by interpreter actions.
///
/// `None` leaves a field untouched; `last_episode` uses a double Option so
/// an action can clear the reference.
#[derive(Debug, Default)]
pub struct ContextPatch {
    pub birth_year: Option<i32>,
    pub birth_place: Option<String>,
    pub current_commune: Option<String>,
    pub communes: Option<Vec<String>>,
    pub housings: Option<Vec<String>>,
    pub commune_index: Option<usize>,
    pub housing_index: Option<usize>,
    pub active_group: Option<GroupId>,
    pub entry_status: Option<Option<String>>,
    pub last_episode: Option<Option<EpisodeId>>,
    pub live: Option<bool>,
}

impl MachineContext for SurveyContext {
    type Patch = ContextPatch;

    fn apply(&mut self, patch: ContextPatch) {
        if let Some(v) = patch.birth_year {
            self.birth_year = Some(v);
        }
        if let Some(v) = patch.birth_place {
            self.birth_place = Some(v);
        }
        if let Some(v) = patch.current_commune {
            self.current_commune = Some(v);
        }
        if let Some(v) = patch.communes {
            self.communes = v;
        }
        if let Some(v) = patch.housings {
            self.housings = v;
        }
        if let Some(v) = patch.commune_index {
            self.commune_index = v;
        }
        if let Some(v) = patch.housing_index {
            self.housing_index = v;
        }
        if let Some(v) = patch.active_group {
            self.active_group = Some(v);
        }
        if let Some(v) = patch.entry_status {
            self.entry_status = v;
        }
        if let Some(v) = patch.last_episode {
            self.last_episode = v;
        }
        if let Some(v) = patch.live {
            self.live = v;
        }
    }
}

impl SurveyContext {
    /// The commune label under iteration, if the index is in bounds
    pub fn current_commune_label(&self) -> Option<&str> {
        self.communes.get(self.commune_index).map(String::as_str)
    }

    /// The housing label under iteration, if the index is in bounds
    pub fn current_housing_label(&self) -> Option<&str> {
        self.housings.get(self.housing_index).map(String::as_str)
    }
}
