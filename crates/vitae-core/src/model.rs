//! Episode and group data model
//!
//! Episodes are the timed entities the interview produces; groups are the
//! 3-level category hierarchy (theme, trajectory, attribute) they attach
//! to. Markers are synthetic display records produced by the consistency
//! detectors and never persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EpisodeId, GroupId, TimePoint};

/// Whether an episode spans an interval or marks a single instant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeKind {
    Range,
    Point,
}

/// A timed life-history entity attached to a group.
///
/// Invariant: `Range` episodes satisfy `start < end` strictly. The store
/// repairs violating input rather than rejecting it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub kind: EpisodeKind,
    /// Display label (commune name, housing label, status, ...)
    pub content: String,
    pub start: TimePoint,
    /// Absent on point episodes
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<TimePoint>,
    pub group: GroupId,
    /// Display class derived from the owning group's family
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub icon: Option<String>,
}

impl Episode {
    #[inline]
    pub fn is_range(&self) -> bool {
        self.kind == EpisodeKind::Range
    }

    /// True when the range invariant holds (points are trivially valid)
    pub fn valid_range(&self) -> bool {
        match (self.kind, self.end) {
            (EpisodeKind::Range, Some(end)) => self.start < end,
            (EpisodeKind::Range, None) => false,
            (EpisodeKind::Point, _) => true,
        }
    }
}

/// Level of a group in the category hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupLevel {
    /// Top-level life-history dimension
    Theme,
    /// A sequence of episodes within a theme
    Trajectory,
    /// Qualifies episodes of its parent trajectory
    Attribute,
}

/// Top-level family a group belongs to; drives episode display classes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupFamily {
    Residence,
    Housing,
    Occupancy,
    Education,
    Employment,
    Milestone,
}

impl GroupFamily {
    /// CSS-style class name stamped on episodes of this family
    pub fn class_name(self) -> &'static str {
        match self {
            GroupFamily::Residence => "residence",
            GroupFamily::Housing => "housing",
            GroupFamily::Occupancy => "occupancy",
            GroupFamily::Education => "education",
            GroupFamily::Employment => "employment",
            GroupFamily::Milestone => "milestone",
        }
    }
}

/// A node in the category hierarchy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub label: String,
    pub level: GroupLevel,
    pub family: GroupFamily,
    /// Attribute groups derive default episode bounds positionally from
    /// the i-th episode of this parent group
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub depends_on: Option<GroupId>,
    /// Whether episodes of this group show as landmarks on the timeline
    #[serde(default)]
    pub landmark: bool,
}

/// One answered question, keyed by the state that asked it.
///
/// A later edit of the same question replaces the entry rather than
/// appending a duplicate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    /// State name of the question
    pub state: String,
    pub payload: Value,
    pub timestamp: TimePoint,
}

/// An uncovered interval between two consecutive episodes of one group
#[derive(Clone, Debug, PartialEq)]
pub struct GapMarker {
    pub group: GroupId,
    pub start: TimePoint,
    pub end: TimePoint,
}

/// An interval covered by two episodes of one group
#[derive(Clone, Debug, PartialEq)]
pub struct OverlapMarker {
    pub group: GroupId,
    pub start: TimePoint,
    pub end: TimePoint,
    /// The two episodes whose ranges intersect
    pub episodes: (EpisodeId, EpisodeId),
}

/// A detected timeline inconsistency, as stored in the marker side table
#[derive(Clone, Debug, PartialEq)]
pub enum Marker {
    Gap(GapMarker),
    Overlap(OverlapMarker),
}

impl Marker {
    pub fn group(&self) -> &GroupId {
        match self {
            Marker::Gap(g) => &g.group,
            Marker::Overlap(o) => &o.group,
        }
    }

    /// Stable key used to deduplicate notifications across detection passes
    pub fn dedup_key(&self) -> String {
        match self {
            Marker::Gap(g) => format!("gap:{}:{}:{}", g.group, g.start.as_millis(), g.end.as_millis()),
            Marker::Overlap(o) => format!(
                "overlap:{}:{}:{}",
                o.group,
                o.start.as_millis(),
                o.end.as_millis()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: i32, end: i32) -> Episode {
        Episode {
            id: EpisodeId::from_seq(1),
            kind: EpisodeKind::Range,
            content: "test".to_string(),
            start: TimePoint::from_year(start).unwrap(),
            end: Some(TimePoint::from_year(end).unwrap()),
            group: GroupId::from("communes"),
            class_name: "residence".to_string(),
            icon: None,
        }
    }

    #[test]
    fn test_valid_range() {
        assert!(range(2001, 2010).valid_range());
        assert!(!range(2010, 2001).valid_range());
        assert!(!range(2010, 2010).valid_range());
    }

    #[test]
    fn test_point_episode_always_valid() {
        let mut ep = range(2001, 2010);
        ep.kind = EpisodeKind::Point;
        ep.end = None;
        assert!(ep.valid_range());
    }

    #[test]
    fn test_episode_serde_skips_absent_end() {
        let mut ep = range(2001, 2010);
        ep.kind = EpisodeKind::Point;
        ep.end = None;
        let encoded = serde_json::to_value(&ep).unwrap();
        assert!(encoded.get("end").is_none());
        let decoded: Episode = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, ep);
    }

    #[test]
    fn test_marker_dedup_key_stable() {
        let g = Marker::Gap(GapMarker {
            group: GroupId::from("communes"),
            start: TimePoint::from_year(2010).unwrap(),
            end: TimePoint::from_year(2012).unwrap(),
        });
        assert_eq!(g.dedup_key(), g.clone().dedup_key());
    }
}
