//! Default group catalog
//!
//! The 3-level category hierarchy the interview writes into: a theme, the
//! residential trajectories, and the occupancy attribute. Attribute and
//! dependent-trajectory groups declare `depends_on`, which lets their
//! episodes auto-bound themselves to the matching episode of the parent
//! group.

use vitae_core::{Group, GroupFamily, GroupId, GroupLevel};

pub const GROUP_LIFE: &str = "life_course";
pub const GROUP_COMMUNES: &str = "communes";
pub const GROUP_HOUSINGS: &str = "housings";
pub const GROUP_OCCUPANCY: &str = "occupancy";
pub const GROUP_MILESTONES: &str = "milestones";

/// The groups every fresh session starts with
pub fn default_groups() -> Vec<Group> {
    vec![
        Group {
            id: GroupId::from(GROUP_LIFE),
            label: "Life course".to_string(),
            level: GroupLevel::Theme,
            family: GroupFamily::Residence,
            depends_on: None,
            landmark: false,
        },
        Group {
            id: GroupId::from(GROUP_COMMUNES),
            label: "Communes".to_string(),
            level: GroupLevel::Trajectory,
            family: GroupFamily::Residence,
            depends_on: None,
            landmark: true,
        },
        Group {
            id: GroupId::from(GROUP_HOUSINGS),
            label: "Housings".to_string(),
            level: GroupLevel::Trajectory,
            family: GroupFamily::Housing,
            depends_on: Some(GroupId::from(GROUP_COMMUNES)),
            landmark: false,
        },
        Group {
            id: GroupId::from(GROUP_OCCUPANCY),
            label: "Occupancy status".to_string(),
            level: GroupLevel::Attribute,
            family: GroupFamily::Occupancy,
            depends_on: Some(GroupId::from(GROUP_HOUSINGS)),
            landmark: false,
        },
        Group {
            id: GroupId::from(GROUP_MILESTONES),
            label: "Milestones".to_string(),
            level: GroupLevel::Trajectory,
            family: GroupFamily::Milestone,
            depends_on: None,
            landmark: true,
        },
    ]
}
