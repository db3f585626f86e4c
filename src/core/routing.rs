/// Routing controller: turns a requested transition into the node that is
/// actually presented.
///
/// A transition is handled in two halves so a mini-game can sit between
/// them: `plan` applies the choice and picks the real target (ending gate,
/// repetition avoidance), `commit` records the visit, may inject a forced
/// ending, and builds the presentation payload.
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::config::EngineConfig;
use crate::core::graph::{GraphError, SceneGraph};
use crate::core::rng::StoryRng;
use crate::core::session::SessionState;
use crate::schema::scene::{Choice, Counter, CounterReading, ResolvedNode, VisibleChoice};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("transition from '{0}' to itself rejected")]
    SelfTransition(String),
    #[error("node not found: {0}")]
    UnknownNode(String),
    #[error("choice not available here: {0}")]
    ChoiceUnavailable(String),
    #[error("the session is over; restart to play again")]
    SessionOver,
    #[error("no non-ending node left to route to")]
    Starved,
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

/// Where the controller is in the transition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Idle,
    Resolving,
    GateCheck,
    Presenting,
    Ended,
    OutOfLives,
}

/// How the player names a choice: by its 1-based number among the
/// visible choices, or by target id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceRef {
    Number(usize),
    Target(String),
}

/// Result of the first half of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRoute {
    pub requested_id: String,
    pub target_id: String,
    pub next_is_ending: bool,
    pub choices_made: u32,
}

impl PlannedRoute {
    pub fn rerouted(&self) -> bool {
        self.requested_id != self.target_id
    }
}

/// Result of the second half of a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Presented {
    pub node: ResolvedNode,
    /// True when presenting a fatal ending drained the remaining lives.
    pub lives_drained: bool,
    pub forced_ending: bool,
}

#[derive(Debug, Clone)]
pub struct RoutingController {
    graph: SceneGraph,
    session: SessionState,
    rng: StoryRng,
    config: EngineConfig,
    indicators: FxHashMap<String, String>,
    counters: Vec<Counter>,
    state: RouteState,
}

impl RoutingController {
    pub fn new(
        graph: SceneGraph,
        config: EngineConfig,
        indicators: FxHashMap<String, String>,
        rng: StoryRng,
    ) -> Self {
        let session = SessionState::new(graph.start_id(), config.max_lives);
        Self {
            graph,
            session,
            rng,
            config,
            indicators,
            counters: Vec::new(),
            state: RouteState::Idle,
        }
    }

    /// Numeric flags to report with every presented node.
    pub fn with_counters(mut self, counters: Vec<Counter>) -> Self {
        self.counters = counters;
        self
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub(crate) fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> RouteState {
        self.state
    }

    pub fn seed(&self) -> u32 {
        self.rng.seed()
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StoryRng {
        &mut self.rng
    }

    /// Split borrow for the gate, which reads the session and draws randomness.
    pub(crate) fn session_and_rng(&mut self) -> (&SessionState, &mut StoryRng) {
        (&self.session, &mut self.rng)
    }

    pub(crate) fn mark_gate_pending(&mut self) {
        self.state = RouteState::GateCheck;
    }

    pub(crate) fn mark_out_of_lives(&mut self) {
        self.state = RouteState::OutOfLives;
    }

    pub fn is_over(&self) -> bool {
        matches!(self.state, RouteState::Ended | RouteState::OutOfLives)
    }

    /// Top the store up to the configured initial capacity.
    pub(crate) fn prime_capacity(&mut self) -> usize {
        let capacity = self.config.initial_capacity;
        self.graph.ensure_minimum_non_ending_nodes(capacity, &mut self.rng)
    }

    /// Fresh session on the start node. Forced-ending overwrites from the
    /// previous session are undone; synthesized nodes stay.
    #[tracing::instrument(skip(self))]
    pub(crate) fn reset_session(&mut self, seed: Option<&str>) {
        let restored = self.graph.restore_overwritten();
        if let Some(seed) = seed {
            self.rng = StoryRng::from_seed_str(Some(seed));
        }
        self.session = SessionState::new(self.graph.start_id(), self.config.max_lives);
        self.state = RouteState::Idle;
        tracing::debug!(restored, rng_seed = self.rng.seed(), "session reset");
    }

    /// Present the start node. Never gated.
    pub fn present_start(&mut self) -> Result<Presented, RouteError> {
        let start = self.graph.start_id().to_string();
        self.commit(&start)
    }

    /// Choices of the current node whose preconditions hold.
    pub fn available_choices(&self) -> Vec<&Choice> {
        self.graph
            .find_node(self.session.current_node_id())
            .map(|node| {
                node.choices
                    .iter()
                    .filter(|c| self.session.meets(&c.precondition))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look a choice up among the currently available ones.
    pub fn select_choice(&self, choice: &ChoiceRef) -> Result<Choice, RouteError> {
        let available = self.available_choices();
        let found = match choice {
            ChoiceRef::Number(n) => n.checked_sub(1).and_then(|i| available.get(i)).copied(),
            ChoiceRef::Target(id) => available.iter().copied().find(|c| &c.target_id == id),
        };
        found.cloned().ok_or_else(|| {
            let wanted = match choice {
                ChoiceRef::Number(n) => format!("#{}", n),
                ChoiceRef::Target(id) => id.clone(),
            };
            tracing::warn!(node = self.session.current_node_id(), %wanted, "choice unavailable");
            RouteError::ChoiceUnavailable(wanted)
        })
    }

    /// Apply a choice and decide where it really leads.
    #[tracing::instrument(skip(self, choice), fields(from = self.session.current_node_id(), to = %choice.target_id))]
    pub fn plan(&mut self, choice: &Choice) -> Result<PlannedRoute, RouteError> {
        if self.is_over() {
            return Err(RouteError::SessionOver);
        }
        let current = self.session.current_node_id().to_string();
        if choice.target_id == current {
            tracing::warn!(node = %current, "self-transition rejected");
            return Err(RouteError::SelfTransition(current));
        }
        let requested = self.graph.find_node(&choice.target_id).ok_or_else(|| {
            tracing::error!(target = %choice.target_id, "choice targets a node that does not exist");
            RouteError::UnknownNode(choice.target_id.clone())
        })?;
        let requested_is_ending = requested.is_ending();

        self.state = RouteState::Resolving;
        self.session.apply(&choice.state_mutation);
        let choices_made = self.session.record_choice();

        let threshold = self.config.min_sections_before_ending;
        let mut target = choice.target_id.clone();

        if requested_is_ending && self.session.unique_section_count() < threshold {
            tracing::debug!(ending = %target, seen = self.session.unique_section_count(), "ending blocked");
            target = self.reroute()?;
        }

        if self.session.has_visited(&target) && self.session.unique_section_count() < threshold {
            tracing::debug!(repeat = %target, "avoiding repeat");
            target = self.reroute()?;
        }

        let next_is_ending = self
            .graph
            .find_node(&target)
            .map(|n| n.is_ending())
            .ok_or_else(|| RouteError::UnknownNode(target.clone()))?;

        Ok(PlannedRoute {
            requested_id: choice.target_id.clone(),
            target_id: target,
            next_is_ending,
            choices_made,
        })
    }

    /// An unvisited non-ending node; grows the store when there is none.
    fn reroute(&mut self) -> Result<String, RouteError> {
        let current = self.session.current_node_id().to_string();
        if let Some(id) = self.graph.find_unvisited_non_ending(&current, self.session.visited()) {
            return Ok(id.to_string());
        }

        let capacity = self.config.starvation_capacity();
        self.graph.ensure_minimum_non_ending_nodes(capacity, &mut self.rng);
        if let Some(id) = self.graph.find_unvisited_non_ending(&current, self.session.visited()) {
            return Ok(id.to_string());
        }

        self.graph
            .find_any_non_ending_except(&current)
            .map(str::to_string)
            .ok_or(RouteError::Starved)
    }

    /// Make `target_id` current and build what the player sees.
    #[tracing::instrument(skip(self))]
    pub fn commit(&mut self, target_id: &str) -> Result<Presented, RouteError> {
        if !self.graph.contains(target_id) {
            tracing::error!(target = %target_id, "commit to a node that does not exist");
            return Err(RouteError::UnknownNode(target_id.to_string()));
        }
        self.session.visit(target_id, &self.config.phases);

        let forced_ending = self.maybe_force_ending(target_id)?;

        let (is_ending, is_fatal) = self
            .graph
            .find_node(target_id)
            .map(|n| (n.is_ending(), n.is_fatal()))
            .unwrap_or((false, false));
        let lives_drained = is_fatal && self.session.drain_lives();
        self.state = if is_ending {
            RouteState::Ended
        } else {
            RouteState::Presenting
        };

        let node = self.resolve(target_id)?;
        if let Some(ending) = &node.ending {
            tracing::info!(node = %node.id, tag = %ending.tag, sections = node.unique_sections, "ending reached");
        }
        Ok(Presented {
            node,
            lives_drained,
            forced_ending,
        })
    }

    /// Once enough sections have been seen, a non-ending node may be turned
    /// into a randomly chosen ending.
    fn maybe_force_ending(&mut self, target_id: &str) -> Result<bool, RouteError> {
        let is_ending = self
            .graph
            .find_node(target_id)
            .map(|n| n.is_ending())
            .unwrap_or(false);
        if is_ending || self.session.unique_section_count() < self.config.min_sections_before_ending {
            return Ok(false);
        }

        let chance = self.config.ending_odds.chance(&self.session);
        let draw = self.rng.next_f64();
        if draw >= chance {
            return Ok(false);
        }
        let endings: Vec<String> = self.graph.ending_ids().into_iter().map(str::to_string).collect();
        let Some(ending_id) = self.rng.pick(&endings).cloned() else {
            return Ok(false);
        };
        tracing::debug!(node = %target_id, ending = %ending_id, chance, draw, "forcing ending");
        self.graph.overwrite_with_ending(target_id, &ending_id)?;
        Ok(true)
    }

    /// Presentation payload for a node under the current session.
    pub fn resolve(&self, id: &str) -> Result<ResolvedNode, RouteError> {
        let node = self
            .graph
            .find_node(id)
            .ok_or_else(|| RouteError::UnknownNode(id.to_string()))?;
        let choices = node
            .choices
            .iter()
            .filter(|c| self.session.meets(&c.precondition))
            .enumerate()
            .map(|(i, c)| VisibleChoice {
                number: i + 1,
                label: c.label.clone(),
                target_id: c.target_id.clone(),
            })
            .collect();
        let mut indicators: Vec<(&String, &String)> = self
            .indicators
            .iter()
            .filter(|(key, _)| self.session.flag_truthy(key))
            .collect();
        indicators.sort();
        Ok(ResolvedNode {
            id: node.id.clone(),
            text: node.text.clone(),
            choices,
            ending: node.ending.clone(),
            phase: self.session.phase(),
            unique_sections: self.session.unique_section_count(),
            indicators: indicators.into_iter().map(|(_, label)| label.clone()).collect(),
            counters: self
                .counters
                .iter()
                .map(|c| CounterReading {
                    label: c.label.clone(),
                    value: self.session.flag_number(&c.key) as i64,
                    max: c.max,
                })
                .collect(),
        })
    }
}
