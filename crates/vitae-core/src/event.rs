//! Interview event definitions
//!
//! Events are the only way the interview machine moves. Each event carries
//! a kind (the table key the interpreter dispatches on) and a JSON payload
//! holding the answer value. The same shape travels inside sync messages,
//! so a remote event replays exactly like a local one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kinds understood by the interview script.
///
/// Kinds are table keys, not a closed enum: the interpreter treats any
/// unknown kind as a silent no-op, which is what keeps cross-version peers
/// from crashing each other.
pub mod kinds {
    /// State-agnostic advance
    pub const NEXT: &str = "NEXT";
    /// State-agnostic affirmative branch
    pub const YES: &str = "YES";
    /// State-agnostic negative branch
    pub const NO: &str = "NO";

    pub const BIRTH_YEAR: &str = "BIRTH_YEAR";
    pub const BIRTH_PLACE: &str = "BIRTH_PLACE";
    pub const CURRENT_COMMUNE: &str = "CURRENT_COMMUNE";
    pub const COMMUNES_LIST: &str = "COMMUNES_LIST";
    pub const COMMUNE_ARRIVAL: &str = "COMMUNE_ARRIVAL";
    pub const COMMUNE_DEPARTURE: &str = "COMMUNE_DEPARTURE";
    pub const HOUSINGS_LIST: &str = "HOUSINGS_LIST";
    pub const HOUSING_ARRIVAL: &str = "HOUSING_ARRIVAL";
    pub const HOUSING_DEPARTURE: &str = "HOUSING_DEPARTURE";
    pub const OCCUPANCY_ENTRY: &str = "OCCUPANCY_ENTRY";
    pub const OCCUPANCY_EXIT: &str = "OCCUPANCY_EXIT";

    /// Non-advancing correction of a past answer; accepted in every state
    pub const AMEND: &str = "AMEND";
}

/// An event dispatched at the interview machine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterviewEvent {
    /// Table key the interpreter dispatches on
    pub kind: String,
    /// Answer payload; `Value::Null` for bare events
    #[serde(default)]
    pub value: Value,
}

impl InterviewEvent {
    pub fn new(kind: impl Into<String>, value: Value) -> Self {
        InterviewEvent {
            kind: kind.into(),
            value,
        }
    }

    /// An event with no payload (NEXT, YES, NO)
    pub fn bare(kind: impl Into<String>) -> Self {
        InterviewEvent {
            kind: kind.into(),
            value: Value::Null,
        }
    }

    /// An amend event correcting the answer previously given in `key`.
    ///
    /// The key is the state name of the question being corrected; the
    /// value is the replacement answer.
    pub fn amend(key: &str, value: Value) -> Self {
        InterviewEvent {
            kind: kinds::AMEND.to_string(),
            value: serde_json::json!({ "key": key, "value": value }),
        }
    }

    #[inline]
    pub fn is_amend(&self) -> bool {
        self.kind == kinds::AMEND
    }

    /// The corrected question's state name, if this is an amend event
    pub fn amend_key(&self) -> Option<&str> {
        if !self.is_amend() {
            return None;
        }
        self.value.get("key")?.as_str()
    }

    /// The replacement answer carried by an amend event
    pub fn amend_value(&self) -> Option<&Value> {
        if !self.is_amend() {
            return None;
        }
        self.value.get("value")
    }
}
