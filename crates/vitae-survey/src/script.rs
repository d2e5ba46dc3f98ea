//! The interview script
//!
//! ~17 states covering the residential life-course interview: birth,
//! current residence, the commune loop, and the nested housing loop with
//! occupancy questions. Two bounded counters drive the repetition; the
//! transient `place_communes` / `place_housings` states decide
//! loop-continue vs advance through guarded "always" transitions.
//!
//! Actions are pure: they read `{context, event}` and return a context
//! patch plus episode commands. The session applies commands to the store,
//! so replaying an event log reproduces episode state exactly.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use vitae_core::{kinds, EpisodeId, EpisodeKind, GroupId, InterviewEvent};
use vitae_machine::{ActionFn, ActionOutput, GuardFn, MachineDef, StateNode, TransitionDef};

use crate::context::{ContextPatch, SurveyContext};
use crate::groups::{GROUP_COMMUNES, GROUP_HOUSINGS, GROUP_MILESTONES, GROUP_OCCUPANCY};

/// State names of the interview machine. These double as answer-history
/// keys and as the expected-state table entries used by the sync layer.
pub mod states {
    pub const WELCOME: &str = "welcome";
    pub const BIRTH_YEAR: &str = "birth_year";
    pub const BIRTH_PLACE: &str = "birth_place";
    pub const CURRENT_COMMUNE: &str = "current_commune";
    pub const ALWAYS_LIVED: &str = "always_lived";
    pub const COMMUNES_LIST: &str = "communes_list";
    pub const PLACE_COMMUNES: &str = "place_communes";
    pub const COMMUNE_ARRIVAL: &str = "commune_arrival";
    pub const COMMUNE_DEPARTURE: &str = "commune_departure";
    pub const HOUSING_COUNT: &str = "housing_count";
    pub const HOUSINGS_LIST: &str = "housings_list";
    pub const PLACE_HOUSINGS: &str = "place_housings";
    pub const HOUSING_ARRIVAL: &str = "housing_arrival";
    pub const HOUSING_DEPARTURE: &str = "housing_departure";
    pub const OCCUPANCY_ENTRY: &str = "occupancy_entry";
    pub const OCCUPANCY_EXIT: &str = "occupancy_exit";
    pub const COMPLETE: &str = "complete";
}

/// Which episode an amend command applies to
#[derive(Clone, Debug, PartialEq)]
pub enum EpisodeTarget {
    /// The episode most recently created by the store
    LastCreated,
    ById(EpisodeId),
}

/// Episode mutations emitted by interview actions.
///
/// Times travel as raw answer payloads; the store normalizes them. A
/// `CreateEpisode` without times relies on the store's dependent-group
/// rule to bound itself to the matching parent episode.
#[derive(Clone, Debug, PartialEq)]
pub enum SurveyCommand {
    CreateEpisode {
        content: String,
        group: GroupId,
        kind: EpisodeKind,
        start: Option<Value>,
        end: Option<Value>,
    },
    AmendEpisode {
        target: EpisodeTarget,
        content: Option<String>,
        start: Option<Value>,
        end: Option<Value>,
    },
    /// Drop a group's derived episodes (a list question was re-answered)
    ClearGroup { group: GroupId },
}

/// Where the sync layer expects a forward event kind to be consumed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    /// Exactly one state consumes this kind first
    State(&'static str),
    /// State-agnostic: valid wherever the machine is
    Any,
    /// Not a forward kind this script knows
    Unknown,
}

/// Static event-kind -> expected-state table.
///
/// Each forward kind maps to the single state that consumes it;
/// `YES`/`NO`/`NEXT` are wildcard. A mismatch means the sender is
/// amending a past answer, not advancing. Kind alone cannot tell two
/// structurally identical questions apart, so the mapping stays coarse.
pub fn expected_state(kind: &str) -> Expectation {
    match kind {
        kinds::BIRTH_YEAR => Expectation::State(states::BIRTH_YEAR),
        kinds::BIRTH_PLACE => Expectation::State(states::BIRTH_PLACE),
        kinds::CURRENT_COMMUNE => Expectation::State(states::CURRENT_COMMUNE),
        kinds::COMMUNES_LIST => Expectation::State(states::COMMUNES_LIST),
        kinds::COMMUNE_ARRIVAL => Expectation::State(states::COMMUNE_ARRIVAL),
        kinds::COMMUNE_DEPARTURE => Expectation::State(states::COMMUNE_DEPARTURE),
        kinds::HOUSINGS_LIST => Expectation::State(states::HOUSINGS_LIST),
        kinds::HOUSING_ARRIVAL => Expectation::State(states::HOUSING_ARRIVAL),
        kinds::HOUSING_DEPARTURE => Expectation::State(states::HOUSING_DEPARTURE),
        kinds::OCCUPANCY_ENTRY => Expectation::State(states::OCCUPANCY_ENTRY),
        kinds::OCCUPANCY_EXIT => Expectation::State(states::OCCUPANCY_EXIT),
        kinds::YES | kinds::NO | kinds::NEXT => Expectation::Any,
        _ => Expectation::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

fn more_communes_to_process(ctx: &SurveyContext, _event: &InterviewEvent) -> bool {
    ctx.commune_index < ctx.communes.len()
}

fn more_housings_to_process(ctx: &SurveyContext, _event: &InterviewEvent) -> bool {
    ctx.housing_index < ctx.housings.len()
}

// ---------------------------------------------------------------------------
// Payload readers
// ---------------------------------------------------------------------------

fn value_as_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().map(|y| y as i32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn value_as_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

type Output = ActionOutput<ContextPatch, SurveyCommand>;

fn begin_session(_ctx: &SurveyContext, _event: &InterviewEvent) -> Output {
    ActionOutput::patch(ContextPatch {
        live: Some(true),
        ..Default::default()
    })
}

fn record_birth_year(_ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    let Some(year) = value_as_year(&event.value) else {
        debug!(value = %event.value, "birth year dropped: unparseable");
        return ActionOutput::none();
    };
    ActionOutput::patch(ContextPatch {
        birth_year: Some(year),
        ..Default::default()
    })
    .with_command(SurveyCommand::CreateEpisode {
        content: "Birth".to_string(),
        group: GroupId::from(GROUP_MILESTONES),
        kind: EpisodeKind::Point,
        start: Some(event.value.clone()),
        end: None,
    })
}

fn record_birth_place(_ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    match value_as_string(&event.value) {
        Some(place) => ActionOutput::patch(ContextPatch {
            birth_place: Some(place),
            ..Default::default()
        }),
        None => ActionOutput::none(),
    }
}

fn record_current_commune(_ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    match value_as_string(&event.value) {
        Some(commune) => ActionOutput::patch(ContextPatch {
            current_commune: Some(commune),
            ..Default::default()
        }),
        None => ActionOutput::none(),
    }
}

/// YES on "always lived here": the commune list collapses to the current
/// commune and the normal placement loop runs over it.
fn single_commune(ctx: &SurveyContext, _event: &InterviewEvent) -> Output {
    let communes = ctx
        .current_commune
        .clone()
        .map(|c| vec![c])
        .unwrap_or_default();
    ActionOutput::patch(ContextPatch {
        communes: Some(communes),
        commune_index: Some(0),
        ..Default::default()
    })
}

fn set_communes(_ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    ActionOutput::patch(ContextPatch {
        communes: Some(value_as_string_list(&event.value)),
        commune_index: Some(0),
        ..Default::default()
    })
}

fn begin_commune(_ctx: &SurveyContext, _event: &InterviewEvent) -> Output {
    ActionOutput::patch(ContextPatch {
        active_group: Some(GroupId::from(GROUP_COMMUNES)),
        housings: Some(Vec::new()),
        housing_index: Some(0),
        ..Default::default()
    })
}

fn record_commune_arrival(ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    let content = ctx
        .current_commune_label()
        .unwrap_or("commune")
        .to_string();
    ActionOutput::command(SurveyCommand::CreateEpisode {
        content,
        group: GroupId::from(GROUP_COMMUNES),
        kind: EpisodeKind::Range,
        start: Some(event.value.clone()),
        end: None,
    })
}

fn record_commune_departure(_ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    ActionOutput::command(SurveyCommand::AmendEpisode {
        target: EpisodeTarget::LastCreated,
        content: None,
        start: None,
        end: Some(event.value.clone()),
    })
}

/// NO on "several housings here?": one housing spanning the whole commune
/// stay. No times are given; the dependent-group rule bounds the episode
/// to the commune episode with the same index.
fn single_housing(ctx: &SurveyContext, _event: &InterviewEvent) -> Output {
    let label = ctx
        .current_commune_label()
        .unwrap_or("housing")
        .to_string();
    ActionOutput::patch(ContextPatch {
        housings: Some(vec![label.clone()]),
        housing_index: Some(0),
        active_group: Some(GroupId::from(GROUP_HOUSINGS)),
        ..Default::default()
    })
    .with_command(SurveyCommand::CreateEpisode {
        content: label,
        group: GroupId::from(GROUP_HOUSINGS),
        kind: EpisodeKind::Range,
        start: None,
        end: None,
    })
}

fn set_housings(_ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    ActionOutput::patch(ContextPatch {
        housings: Some(value_as_string_list(&event.value)),
        housing_index: Some(0),
        ..Default::default()
    })
}

fn begin_housing(_ctx: &SurveyContext, _event: &InterviewEvent) -> Output {
    ActionOutput::patch(ContextPatch {
        active_group: Some(GroupId::from(GROUP_HOUSINGS)),
        ..Default::default()
    })
}

fn record_housing_arrival(ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    let content = ctx
        .current_housing_label()
        .unwrap_or("housing")
        .to_string();
    ActionOutput::command(SurveyCommand::CreateEpisode {
        content,
        group: GroupId::from(GROUP_HOUSINGS),
        kind: EpisodeKind::Range,
        start: Some(event.value.clone()),
        end: None,
    })
}

fn record_housing_departure(_ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    ActionOutput::command(SurveyCommand::AmendEpisode {
        target: EpisodeTarget::LastCreated,
        content: None,
        start: None,
        end: Some(event.value.clone()),
    })
}

fn record_occupancy_entry(_ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    let Some(status) = value_as_string(&event.value) else {
        return ActionOutput::none();
    };
    ActionOutput::patch(ContextPatch {
        entry_status: Some(Some(status.clone())),
        active_group: Some(GroupId::from(GROUP_OCCUPANCY)),
        ..Default::default()
    })
    .with_command(SurveyCommand::CreateEpisode {
        content: status,
        group: GroupId::from(GROUP_OCCUPANCY),
        kind: EpisodeKind::Range,
        start: None,
        end: None,
    })
}

/// Exit status matching the entry status adds nothing; a different status
/// lands as a point episode at the end of the housing stay.
fn record_occupancy_exit(ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    let status = value_as_string(&event.value);
    let patch = ContextPatch {
        entry_status: Some(None),
        ..Default::default()
    };
    match status {
        Some(status) if ctx.entry_status.as_deref() != Some(status.as_str()) => {
            ActionOutput::patch(patch).with_command(SurveyCommand::CreateEpisode {
                content: status,
                group: GroupId::from(GROUP_OCCUPANCY),
                kind: EpisodeKind::Point,
                start: None,
                end: None,
            })
        }
        _ => ActionOutput::patch(patch),
    }
}

fn advance_housing(ctx: &SurveyContext, _event: &InterviewEvent) -> Output {
    ActionOutput::patch(ContextPatch {
        housing_index: Some(ctx.housing_index + 1),
        ..Default::default()
    })
}

fn advance_commune(ctx: &SurveyContext, _event: &InterviewEvent) -> Output {
    ActionOutput::patch(ContextPatch {
        commune_index: Some(ctx.commune_index + 1),
        housing_index: Some(0),
        housings: Some(Vec::new()),
        ..Default::default()
    })
}

fn finish(_ctx: &SurveyContext, _event: &InterviewEvent) -> Output {
    ActionOutput::patch(ContextPatch {
        live: Some(false),
        ..Default::default()
    })
}

/// Global amend handler: corrects a past answer without moving the state
/// pointer. Context-backed keys are re-patched; when the amend names an
/// episode, the matching field is rewritten through an episode command.
fn apply_amend(_ctx: &SurveyContext, event: &InterviewEvent) -> Output {
    let Some(key) = event.amend_key() else {
        debug!("amend dropped: missing key");
        return ActionOutput::none();
    };
    let value = event.amend_value().cloned().unwrap_or(Value::Null);
    let episode = event
        .value
        .get("episode")
        .and_then(Value::as_str)
        .map(EpisodeId::from);

    let mut output = match key {
        states::BIRTH_YEAR => ActionOutput::patch(ContextPatch {
            birth_year: value_as_year(&value),
            ..Default::default()
        }),
        states::BIRTH_PLACE => ActionOutput::patch(ContextPatch {
            birth_place: value_as_string(&value),
            ..Default::default()
        }),
        states::CURRENT_COMMUNE => ActionOutput::patch(ContextPatch {
            current_commune: value_as_string(&value),
            ..Default::default()
        }),
        states::COMMUNES_LIST => ActionOutput::patch(ContextPatch {
            communes: Some(value_as_string_list(&value)),
            ..Default::default()
        })
        .with_command(SurveyCommand::ClearGroup {
            group: GroupId::from(GROUP_COMMUNES),
        }),
        states::HOUSINGS_LIST => ActionOutput::patch(ContextPatch {
            housings: Some(value_as_string_list(&value)),
            ..Default::default()
        })
        .with_command(SurveyCommand::ClearGroup {
            group: GroupId::from(GROUP_HOUSINGS),
        }),
        _ => ActionOutput::none(),
    };

    if let Some(id) = episode {
        output = output.with_command(amend_episode_command(key, id, &value));
    }
    output
}

/// Map an amend key onto the episode field it corrects
fn amend_episode_command(key: &str, id: EpisodeId, value: &Value) -> SurveyCommand {
    let (content, start, end) = if key.contains("arrival") || key == states::BIRTH_YEAR {
        (None, Some(value.clone()), None)
    } else if key.contains("departure") {
        (None, None, Some(value.clone()))
    } else {
        (value_as_string(value), None, None)
    };
    SurveyCommand::AmendEpisode {
        target: EpisodeTarget::ById(id),
        content,
        start,
        end,
    }
}

// ---------------------------------------------------------------------------
// Machine definition
// ---------------------------------------------------------------------------

/// Build the interview machine definition
pub fn survey_machine() -> MachineDef<SurveyContext, SurveyCommand> {
    use states::*;

    let states = HashMap::from([
        (
            WELCOME,
            StateNode::new().on(
                kinds::NEXT,
                vec![TransitionDef::to(BIRTH_YEAR).run(&["begin_session"])],
            ),
        ),
        (
            BIRTH_YEAR,
            StateNode::new().on(
                kinds::BIRTH_YEAR,
                vec![TransitionDef::to(BIRTH_PLACE).run(&["record_birth_year"])],
            ),
        ),
        (
            BIRTH_PLACE,
            StateNode::new().on(
                kinds::BIRTH_PLACE,
                vec![TransitionDef::to(CURRENT_COMMUNE).run(&["record_birth_place"])],
            ),
        ),
        (
            CURRENT_COMMUNE,
            StateNode::new().on(
                kinds::CURRENT_COMMUNE,
                vec![TransitionDef::to(ALWAYS_LIVED).run(&["record_current_commune"])],
            ),
        ),
        (
            ALWAYS_LIVED,
            StateNode::new()
                .on(
                    kinds::YES,
                    vec![TransitionDef::to(PLACE_COMMUNES).run(&["single_commune"])],
                )
                .on(kinds::NO, vec![TransitionDef::to(COMMUNES_LIST)]),
        ),
        (
            COMMUNES_LIST,
            StateNode::new().on(
                kinds::COMMUNES_LIST,
                vec![TransitionDef::to(PLACE_COMMUNES).run(&["set_communes"])],
            ),
        ),
        (
            PLACE_COMMUNES,
            StateNode::new().always(vec![
                TransitionDef::to(COMMUNE_ARRIVAL)
                    .when("more_communes_to_process")
                    .run(&["begin_commune"]),
                TransitionDef::to(COMPLETE).run(&["finish"]),
            ]),
        ),
        (
            COMMUNE_ARRIVAL,
            StateNode::new().on(
                kinds::COMMUNE_ARRIVAL,
                vec![TransitionDef::to(COMMUNE_DEPARTURE).run(&["record_commune_arrival"])],
            ),
        ),
        (
            COMMUNE_DEPARTURE,
            StateNode::new().on(
                kinds::COMMUNE_DEPARTURE,
                vec![TransitionDef::to(HOUSING_COUNT).run(&["record_commune_departure"])],
            ),
        ),
        (
            HOUSING_COUNT,
            StateNode::new()
                .on(kinds::YES, vec![TransitionDef::to(HOUSINGS_LIST)])
                .on(
                    kinds::NO,
                    vec![TransitionDef::to(OCCUPANCY_ENTRY).run(&["single_housing"])],
                ),
        ),
        (
            HOUSINGS_LIST,
            StateNode::new().on(
                kinds::HOUSINGS_LIST,
                vec![TransitionDef::to(PLACE_HOUSINGS).run(&["set_housings"])],
            ),
        ),
        (
            PLACE_HOUSINGS,
            StateNode::new().always(vec![
                TransitionDef::to(HOUSING_ARRIVAL)
                    .when("more_housings_to_process")
                    .run(&["begin_housing"]),
                TransitionDef::to(PLACE_COMMUNES).run(&["advance_commune"]),
            ]),
        ),
        (
            HOUSING_ARRIVAL,
            StateNode::new().on(
                kinds::HOUSING_ARRIVAL,
                vec![TransitionDef::to(HOUSING_DEPARTURE).run(&["record_housing_arrival"])],
            ),
        ),
        (
            HOUSING_DEPARTURE,
            StateNode::new().on(
                kinds::HOUSING_DEPARTURE,
                vec![TransitionDef::to(OCCUPANCY_ENTRY).run(&["record_housing_departure"])],
            ),
        ),
        (
            OCCUPANCY_ENTRY,
            StateNode::new().on(
                kinds::OCCUPANCY_ENTRY,
                vec![TransitionDef::to(OCCUPANCY_EXIT).run(&["record_occupancy_entry"])],
            ),
        ),
        (
            OCCUPANCY_EXIT,
            StateNode::new().on(
                kinds::OCCUPANCY_EXIT,
                vec![TransitionDef::to(PLACE_HOUSINGS)
                    .run(&["record_occupancy_exit", "advance_housing"])],
            ),
        ),
        (COMPLETE, StateNode::new()),
    ]);

    let guards = HashMap::from([
        (
            "more_communes_to_process",
            more_communes_to_process as GuardFn<SurveyContext>,
        ),
        (
            "more_housings_to_process",
            more_housings_to_process as GuardFn<SurveyContext>,
        ),
    ]);

    let actions = HashMap::from([
        ("begin_session", begin_session as ActionFn<SurveyContext, SurveyCommand>),
        ("record_birth_year", record_birth_year as _),
        ("record_birth_place", record_birth_place as _),
        ("record_current_commune", record_current_commune as _),
        ("single_commune", single_commune as _),
        ("set_communes", set_communes as _),
        ("begin_commune", begin_commune as _),
        ("record_commune_arrival", record_commune_arrival as _),
        ("record_commune_departure", record_commune_departure as _),
        ("single_housing", single_housing as _),
        ("set_housings", set_housings as _),
        ("begin_housing", begin_housing as _),
        ("record_housing_arrival", record_housing_arrival as _),
        ("record_housing_departure", record_housing_departure as _),
        ("record_occupancy_entry", record_occupancy_entry as _),
        ("record_occupancy_exit", record_occupancy_exit as _),
        ("advance_housing", advance_housing as _),
        ("advance_commune", advance_commune as _),
        ("finish", finish as _),
        ("apply_amend", apply_amend as _),
    ]);

    MachineDef {
        id: "vitae-survey",
        initial: states::WELCOME,
        states,
        global_on: HashMap::from([(
            kinds::AMEND,
            vec![TransitionDef::internal().run(&["apply_amend"])],
        )]),
        guards,
        actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vitae_machine::Interpreter;

    fn interp() -> Interpreter<SurveyContext, SurveyCommand> {
        Interpreter::new(survey_machine(), SurveyContext::default())
    }

    fn drive(interp: &mut Interpreter<SurveyContext, SurveyCommand>, kind: &str, value: Value) {
        interp.send(&InterviewEvent::new(kind, value));
    }

    #[test]
    fn test_forward_path_single_commune_single_housing() {
        let mut m = interp();
        drive(&mut m, kinds::NEXT, Value::Null);
        drive(&mut m, kinds::BIRTH_YEAR, json!(1956));
        drive(&mut m, kinds::BIRTH_PLACE, json!("Nantes"));
        drive(&mut m, kinds::CURRENT_COMMUNE, json!("Lyon"));
        drive(&mut m, kinds::YES, Value::Null);
        assert_eq!(m.state(), states::COMMUNE_ARRIVAL);
        assert_eq!(m.context().communes, vec!["Lyon".to_string()]);

        drive(&mut m, kinds::COMMUNE_ARRIVAL, json!(1956));
        drive(&mut m, kinds::COMMUNE_DEPARTURE, json!(2020));
        drive(&mut m, kinds::NO, Value::Null);
        assert_eq!(m.state(), states::OCCUPANCY_ENTRY);

        drive(&mut m, kinds::OCCUPANCY_ENTRY, json!("tenant"));
        drive(&mut m, kinds::OCCUPANCY_EXIT, json!("tenant"));
        assert_eq!(m.state(), states::COMPLETE);
        assert!(!m.context().live);
        assert!(m.is_terminal());
    }

    #[test]
    fn test_commune_loop_terminates_exactly_once_per_commune() {
        let mut m = interp();
        drive(&mut m, kinds::NEXT, Value::Null);
        drive(&mut m, kinds::BIRTH_YEAR, json!(1960));
        drive(&mut m, kinds::BIRTH_PLACE, json!("Brest"));
        drive(&mut m, kinds::CURRENT_COMMUNE, json!("Paris"));
        drive(&mut m, kinds::NO, Value::Null);
        drive(&mut m, kinds::COMMUNES_LIST, json!(["A", "B"]));

        // Commune A, single housing.
        assert_eq!(m.state(), states::COMMUNE_ARRIVAL);
        assert_eq!(m.context().commune_index, 0);
        drive(&mut m, kinds::COMMUNE_ARRIVAL, json!(1960));
        drive(&mut m, kinds::COMMUNE_DEPARTURE, json!(1980));
        drive(&mut m, kinds::NO, Value::Null);
        drive(&mut m, kinds::OCCUPANCY_ENTRY, json!("owner"));
        drive(&mut m, kinds::OCCUPANCY_EXIT, json!("owner"));

        // Back at the top of the loop for commune B.
        assert_eq!(m.state(), states::COMMUNE_ARRIVAL);
        assert_eq!(m.context().commune_index, 1);
        drive(&mut m, kinds::COMMUNE_ARRIVAL, json!(1980));
        drive(&mut m, kinds::COMMUNE_DEPARTURE, json!(2000));
        drive(&mut m, kinds::NO, Value::Null);
        drive(&mut m, kinds::OCCUPANCY_ENTRY, json!("tenant"));
        drive(&mut m, kinds::OCCUPANCY_EXIT, json!("tenant"));

        assert_eq!(m.state(), states::COMPLETE);
        // Index progressed 0 -> 1 -> exit, never past the list length.
        assert_eq!(m.context().commune_index, 2);
        assert_eq!(m.context().communes.len(), 2);
    }

    #[test]
    fn test_nested_housing_loop() {
        let mut m = interp();
        drive(&mut m, kinds::NEXT, Value::Null);
        drive(&mut m, kinds::BIRTH_YEAR, json!(1970));
        drive(&mut m, kinds::BIRTH_PLACE, json!("Lille"));
        drive(&mut m, kinds::CURRENT_COMMUNE, json!("Lille"));
        drive(&mut m, kinds::YES, Value::Null);
        drive(&mut m, kinds::COMMUNE_ARRIVAL, json!(1970));
        drive(&mut m, kinds::COMMUNE_DEPARTURE, json!(2010));
        drive(&mut m, kinds::YES, Value::Null);
        drive(&mut m, kinds::HOUSINGS_LIST, json!(["rue des Lilas", "rue Verte"]));

        assert_eq!(m.state(), states::HOUSING_ARRIVAL);
        assert_eq!(m.context().housing_index, 0);
        drive(&mut m, kinds::HOUSING_ARRIVAL, json!(1970));
        drive(&mut m, kinds::HOUSING_DEPARTURE, json!(1990));
        drive(&mut m, kinds::OCCUPANCY_ENTRY, json!("tenant"));
        drive(&mut m, kinds::OCCUPANCY_EXIT, json!("tenant"));

        assert_eq!(m.state(), states::HOUSING_ARRIVAL);
        assert_eq!(m.context().housing_index, 1);
        drive(&mut m, kinds::HOUSING_ARRIVAL, json!(1990));
        drive(&mut m, kinds::HOUSING_DEPARTURE, json!(2010));
        drive(&mut m, kinds::OCCUPANCY_ENTRY, json!("owner"));
        drive(&mut m, kinds::OCCUPANCY_EXIT, json!("owner"));

        assert_eq!(m.state(), states::COMPLETE);
    }

    #[test]
    fn test_amend_updates_context_without_moving_state() {
        let mut m = interp();
        drive(&mut m, kinds::NEXT, Value::Null);
        drive(&mut m, kinds::BIRTH_YEAR, json!(1956));
        assert_eq!(m.state(), states::BIRTH_PLACE);

        m.send(&InterviewEvent::amend(states::BIRTH_YEAR, json!(1957)));
        assert_eq!(m.state(), states::BIRTH_PLACE);
        assert_eq!(m.context().birth_year, Some(1957));
    }

    #[test]
    fn test_amend_with_episode_emits_episode_command() {
        let mut m = interp();
        drive(&mut m, kinds::NEXT, Value::Null);
        drive(&mut m, kinds::BIRTH_YEAR, json!(1956));

        let mut amend = InterviewEvent::amend(states::COMMUNE_ARRIVAL, json!(1961));
        amend.value["episode"] = json!("ep-2");
        let commands = m.send(&amend);

        assert_eq!(
            commands,
            vec![SurveyCommand::AmendEpisode {
                target: EpisodeTarget::ById(EpisodeId::from("ep-2")),
                content: None,
                start: Some(json!(1961)),
                end: None,
            }]
        );
    }

    #[test]
    fn test_occupancy_exit_same_status_emits_nothing() {
        let ctx = SurveyContext {
            entry_status: Some("tenant".to_string()),
            ..Default::default()
        };
        let out = record_occupancy_exit(&ctx, &InterviewEvent::new(kinds::OCCUPANCY_EXIT, json!("tenant")));
        assert!(out.commands.is_empty());

        let out = record_occupancy_exit(&ctx, &InterviewEvent::new(kinds::OCCUPANCY_EXIT, json!("owner")));
        assert_eq!(out.commands.len(), 1);
    }

    #[test]
    fn test_expected_state_table() {
        assert_eq!(
            expected_state(kinds::BIRTH_YEAR),
            Expectation::State(states::BIRTH_YEAR)
        );
        assert_eq!(expected_state(kinds::YES), Expectation::Any);
        assert_eq!(expected_state("GIBBERISH"), Expectation::Unknown);
    }

    #[test]
    fn test_unparseable_birth_year_is_dropped() {
        let mut m = interp();
        drive(&mut m, kinds::NEXT, Value::Null);
        let commands = m.send(&InterviewEvent::new(kinds::BIRTH_YEAR, json!({"bad": true})));
        // The transition still fires (the question was answered), but no
        // context patch or episode is produced from garbage.
        assert!(commands.is_empty());
        assert_eq!(m.context().birth_year, None);
    }
}
