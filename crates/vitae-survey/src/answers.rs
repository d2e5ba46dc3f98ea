//! Amendable answer history
//!
//! Every applied interview event leaves one entry keyed by the state that
//! asked the question. A later edit of the same question replaces the
//! entry in place, preserving first-answer order; history never grows from
//! corrections.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use vitae_core::{AnsweredQuestion, TimePoint};

/// Ordered, amendable record of given answers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerHistory {
    entries: Vec<AnsweredQuestion>,
}

impl AnswerHistory {
    pub fn new() -> Self {
        AnswerHistory::default()
    }

    /// Record an answer for a state. Replaces any previous answer to the
    /// same question.
    pub fn record(&mut self, state: &str, payload: Value, timestamp: TimePoint) {
        if let Some(existing) = self.entries.iter_mut().find(|a| a.state == state) {
            existing.payload = payload;
            existing.timestamp = timestamp;
            return;
        }
        self.entries.push(AnsweredQuestion {
            state: state.to_string(),
            payload,
            timestamp,
        });
    }

    pub fn get(&self, state: &str) -> Option<&AnsweredQuestion> {
        self.entries.iter().find(|a| a.state == state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnsweredQuestion> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
