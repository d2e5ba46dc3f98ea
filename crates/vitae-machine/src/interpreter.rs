//! Table-driven machine definition and executor
//!
//! The machine definition is pure data: per-state transition tables keyed
//! by event kind, optional global handlers reachable from any state, and
//! unconditional "always" transitions for transient states. Guards and
//! actions are named functions resolved through registries at dispatch
//! time.
//!
//! Failure semantics: unmatched events, failing guards, and unknown
//! registry names are silently dropped (logged, never raised). `send` on a
//! terminal state is a no-op.

use std::collections::HashMap;

use tracing::{debug, error};

use vitae_core::InterviewEvent;

/// Upper bound on chained transient transitions per send. A correct
/// machine settles in a handful; hitting the bound means the definition
/// has an unguarded cycle.
const SETTLE_LIMIT: usize = 64;

/// Context type driven by a machine.
///
/// Actions do not mutate context directly; they return a patch that the
/// interpreter merges, so a recorded event sequence replays into identical
/// context state.
pub trait MachineContext: Clone {
    type Patch;

    fn apply(&mut self, patch: Self::Patch);
}

/// Named guard: decides transition eligibility against `{context, event}`
pub type GuardFn<C> = fn(&C, &InterviewEvent) -> bool;

/// What one action produces: an optional context patch plus any commands
/// to hand to the outside world (episode mutations, notifications).
pub struct ActionOutput<P, Cmd> {
    pub patch: Option<P>,
    pub commands: Vec<Cmd>,
}

impl<P, Cmd> ActionOutput<P, Cmd> {
    pub fn none() -> Self {
        ActionOutput {
            patch: None,
            commands: Vec::new(),
        }
    }

    pub fn patch(patch: P) -> Self {
        ActionOutput {
            patch: Some(patch),
            commands: Vec::new(),
        }
    }

    pub fn command(cmd: Cmd) -> Self {
        ActionOutput {
            patch: None,
            commands: vec![cmd],
        }
    }

    pub fn with_command(mut self, cmd: Cmd) -> Self {
        self.commands.push(cmd);
        self
    }
}

/// Named action resolved at dispatch time
pub type ActionFn<C, Cmd> =
    fn(&C, &InterviewEvent) -> ActionOutput<<C as MachineContext>::Patch, Cmd>;

/// One entry in a transition table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionDef {
    /// Destination state; `None` keeps the state pointer where it is
    pub target: Option<&'static str>,
    /// Guard name; absent means unconditional
    pub guard: Option<&'static str>,
    /// Action names, run in order
    pub actions: &'static [&'static str],
}

impl TransitionDef {
    /// Transition moving to `target`
    pub fn to(target: &'static str) -> Self {
        TransitionDef {
            target: Some(target),
            guard: None,
            actions: &[],
        }
    }

    /// Self-transition: runs actions without moving the state pointer
    pub fn internal() -> Self {
        TransitionDef {
            target: None,
            guard: None,
            actions: &[],
        }
    }

    pub fn when(mut self, guard: &'static str) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn run(mut self, actions: &'static [&'static str]) -> Self {
        self.actions = actions;
        self
    }
}

/// One state's transition tables
#[derive(Clone, Debug, Default)]
pub struct StateNode {
    /// Event kind -> ordered candidate transitions
    pub on: HashMap<&'static str, Vec<TransitionDef>>,
    /// Unconditional transitions evaluated after every state change
    pub always: Vec<TransitionDef>,
}

impl StateNode {
    pub fn new() -> Self {
        StateNode::default()
    }

    pub fn on(mut self, kind: &'static str, transitions: Vec<TransitionDef>) -> Self {
        self.on.insert(kind, transitions);
        self
    }

    pub fn always(mut self, transitions: Vec<TransitionDef>) -> Self {
        self.always = transitions;
        self
    }

    /// A terminal state has no outgoing transitions at all
    pub fn is_terminal(&self) -> bool {
        self.on.is_empty() && self.always.is_empty()
    }
}

/// A complete machine definition
pub struct MachineDef<C: MachineContext, Cmd> {
    pub id: &'static str,
    pub initial: &'static str,
    pub states: HashMap<&'static str, StateNode>,
    /// Handlers reachable from any state (amend lives here)
    pub global_on: HashMap<&'static str, Vec<TransitionDef>>,
    pub guards: HashMap<&'static str, GuardFn<C>>,
    pub actions: HashMap<&'static str, ActionFn<C, Cmd>>,
}

impl<C: MachineContext, Cmd> MachineDef<C, Cmd> {
    /// Resolve a state name from external input (restore) to the static
    /// key used internally
    pub fn state_key(&self, name: &str) -> Option<&'static str> {
        self.states.get_key_value(name).map(|(k, _)| *k)
    }
}

/// A settled machine view handed to subscribers
pub struct Snapshot<'a, C> {
    pub state: &'static str,
    pub context: &'a C,
}

type Subscriber<C> = Box<dyn FnMut(&Snapshot<'_, C>)>;

/// Machine executor.
///
/// `send` resolves one event: table lookup, ordered guard selection,
/// actions, state move, then recursive "always" settlement. It returns
/// the commands emitted by the actions that ran; it never returns an
/// error.
pub struct Interpreter<C: MachineContext, Cmd> {
    def: MachineDef<C, Cmd>,
    state: &'static str,
    context: C,
    subscribers: Vec<Subscriber<C>>,
}

impl<C: MachineContext, Cmd> Interpreter<C, Cmd> {
    pub fn new(def: MachineDef<C, Cmd>, context: C) -> Self {
        let state = def.initial;
        Interpreter {
            def,
            state,
            context,
            subscribers: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> &'static str {
        self.state
    }

    #[inline]
    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn definition(&self) -> &MachineDef<C, Cmd> {
        &self.def
    }

    /// The settled state and context as one view
    pub fn snapshot(&self) -> Snapshot<'_, C> {
        Snapshot {
            state: self.state,
            context: &self.context,
        }
    }

    /// True when the machine sits in a state with no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        self.def
            .states
            .get(self.state)
            .map(StateNode::is_terminal)
            .unwrap_or(true)
    }

    /// Reposition the machine from a persisted snapshot. Returns false
    /// (leaving the machine untouched) when the saved state name is not
    /// part of this definition.
    pub fn restore(&mut self, state: &str, context: C) -> bool {
        match self.def.state_key(state) {
            Some(key) => {
                self.state = key;
                self.context = context;
                true
            }
            None => {
                debug!(state, "restore skipped: unknown state name");
                false
            }
        }
    }

    /// Reset to the initial state with a fresh context
    pub fn reset(&mut self, context: C) {
        self.state = self.def.initial;
        self.context = context;
    }

    /// Merge a patch from outside the transition loop. Used by the owner
    /// to reflect externally assigned facts (the store's last-episode id)
    /// without inventing synthetic events.
    pub fn patch_context(&mut self, patch: C::Patch) {
        self.context.apply(patch);
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&Snapshot<'_, C>) + 'static) {
        self.subscribers.push(Box::new(callback));
    }

    /// Dispatch one event. Returns the commands emitted while settling.
    pub fn send(&mut self, event: &InterviewEvent) -> Vec<Cmd> {
        let mut commands = Vec::new();
        let mut changed = false;

        let selected = self.select(event.kind.as_str(), event);
        let Some(transition) = selected else {
            debug!(state = self.state, kind = %event.kind, "event dropped: no transition");
            return commands;
        };

        changed |= self.run_transition(&transition, event, &mut commands);
        changed |= self.settle(event, &mut commands);

        if changed {
            self.notify();
        }
        commands
    }

    /// Look up candidate transitions for an event kind (state table first,
    /// then global handlers) and pick the first whose guard passes.
    fn select(&self, kind: &str, event: &InterviewEvent) -> Option<TransitionDef> {
        let node = self.def.states.get(self.state)?;
        let candidates = node
            .on
            .get(kind)
            .or_else(|| self.def.global_on.get(kind))?;
        self.pick(candidates, event)
    }

    fn pick(&self, candidates: &[TransitionDef], event: &InterviewEvent) -> Option<TransitionDef> {
        candidates
            .iter()
            .find(|t| self.guard_passes(t, event))
            .cloned()
    }

    fn guard_passes(&self, transition: &TransitionDef, event: &InterviewEvent) -> bool {
        let Some(name) = transition.guard else {
            return true;
        };
        match self.def.guards.get(name) {
            Some(guard) => guard(&self.context, event),
            None => {
                error!(guard = name, "unknown guard name in machine definition");
                false
            }
        }
    }

    /// Run actions, merge their patches, then move the state pointer.
    /// Returns whether anything observable changed.
    fn run_transition(
        &mut self,
        transition: &TransitionDef,
        event: &InterviewEvent,
        commands: &mut Vec<Cmd>,
    ) -> bool {
        let mut changed = false;

        for name in transition.actions {
            let Some(action) = self.def.actions.get(name) else {
                error!(action = name, "unknown action name in machine definition");
                continue;
            };
            let output = action(&self.context, event);
            if let Some(patch) = output.patch {
                self.context.apply(patch);
                changed = true;
            }
            commands.extend(output.commands);
        }

        if let Some(target) = transition.target {
            if self.def.states.contains_key(target) {
                changed |= target != self.state;
                self.state = target;
            } else {
                error!(state = target, "unknown target state in machine definition");
            }
        }

        changed
    }

    /// Evaluate the current state's "always" transitions until none
    /// applies. This is what realizes transient states such as "advance to
    /// the next repeated section or finish".
    fn settle(&mut self, event: &InterviewEvent, commands: &mut Vec<Cmd>) -> bool {
        let mut changed = false;

        for _ in 0..SETTLE_LIMIT {
            let Some(node) = self.def.states.get(self.state) else {
                break;
            };
            let Some(transition) = self.pick(&node.always, event) else {
                break;
            };

            changed |= self.run_transition(&transition, event, commands);

            if transition.target.is_none() {
                // A targetless always transition cannot make progress;
                // run it once and stop.
                debug!(state = self.state, "targetless always transition");
                break;
            }
        }

        changed
    }

    fn notify(&mut self) {
        let snapshot = Snapshot {
            state: self.state,
            context: &self.context,
        };
        for subscriber in &mut self.subscribers {
            subscriber(&snapshot);
        }
    }
}
