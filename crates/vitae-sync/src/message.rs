//! Sync message taxonomy
//!
//! Every byte crossing the peer channel is one [`SyncMessage`]: a tagged
//! body plus timestamp and sender role. The channel only promises ordered
//! delivery within one connection; cross-reconnect loss is recovered by a
//! full `LOAD_ITEMS` resync, not by retries.

use serde::{Deserialize, Serialize};

use vitae_core::{Episode, InterviewEvent, PeerRole, TimePoint};

/// Message body variants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncBody {
    /// Replicate a state-machine event (forward progress or amend)
    SurveyEvent { event: InterviewEvent },
    /// Merge items: matching ids update in place, unmatched append
    AddItems { items: Vec<Episode> },
    /// Same merge rule as `AddItems`; kept distinct for intent
    UpdateItems { items: Vec<Episode> },
    /// Bulk import; colliding ids are rekeyed on the receiving side
    LoadItems { items: Vec<Episode> },
    /// Clear all local persisted state and restart
    ResetAllData,
}

/// One message on the peer channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    #[serde(flatten)]
    pub body: SyncBody,
    pub timestamp: TimePoint,
    pub sender: PeerRole,
}

impl SyncMessage {
    pub fn new(body: SyncBody, timestamp: TimePoint, sender: PeerRole) -> Self {
        SyncMessage {
            body,
            timestamp,
            sender,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vitae_core::kinds;

    #[test]
    fn test_wire_tag_names() {
        let msg = SyncMessage::new(
            SyncBody::SurveyEvent {
                event: InterviewEvent::new(kinds::BIRTH_YEAR, json!(1956)),
            },
            TimePoint::from_millis(42),
            PeerRole::Host,
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "SURVEY_EVENT");
        assert_eq!(value["sender"], "host");
        assert_eq!(value["payload"]["event"]["kind"], "BIRTH_YEAR");

        let reset = SyncMessage::new(SyncBody::ResetAllData, TimePoint::ZERO, PeerRole::Guest);
        let value = serde_json::to_value(&reset).unwrap();
        assert_eq!(value["type"], "RESET_ALL_DATA");
    }

    #[test]
    fn test_roundtrip() {
        let msg = SyncMessage::new(
            SyncBody::LoadItems { items: Vec::new() },
            TimePoint::from_millis(7),
            PeerRole::Guest,
        );
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: SyncMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }
}
