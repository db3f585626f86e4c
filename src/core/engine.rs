/// The story engine: an event-driven façade over routing, session state and
/// the mini-game gate.
///
/// Every call runs to completion on the caller's turn and returns the
/// events a front-end should render, in order. Mini-game outcomes arrive
/// through the gate's mailbox and are handled by `pump` (which
/// `submit_choice` also calls before returning).
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::config::{ConfigError, EngineConfig};
use crate::core::gate::{self, GateError, GateVerdict, MiniGame, MiniGameGate, Tier};
use crate::core::graph::{GraphError, SceneGraph, Story};
use crate::core::present::{DeathScreen, EngineEvent};
use crate::core::rng::{seed_label, StoryRng};
use crate::core::routing::{ChoiceRef, RouteError, RouteState, RoutingController};
use crate::core::session::SessionState;
use crate::schema::scene::ResolvedNode;

const FALLBACK_DEATH_MESSAGE: &str = "Your lives are spent.";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("story error: {0}")]
    Graph(#[from] GraphError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("routing error: {0}")]
    Route(#[from] RouteError),
    #[error("mini-game error: {0}")]
    Gate(#[from] GateError),
    #[error("a mini-game outcome is still pending")]
    GatePending,
    #[error("the session has not been started")]
    NotStarted,
    #[error("no story was given to the builder")]
    MissingStory,
}

pub struct StoryEngine {
    router: RoutingController,
    gate: MiniGameGate,
    death_messages: Vec<String>,
    seed_text: Option<String>,
    /// Target resolved before a gate opened; presented once the gate passes.
    gated_target: Option<String>,
    started: bool,
}

/// Builder for constructing a `StoryEngine`.
pub struct StoryEngineBuilder {
    story_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    /// Directly provided story (for tests and embedded content).
    story: Option<Story>,
    /// Directly provided config.
    config: Option<EngineConfig>,
    seed: Option<String>,
    games: Vec<(Tier, Box<dyn MiniGame>)>,
}

impl StoryEngine {
    pub fn builder() -> StoryEngineBuilder {
        StoryEngineBuilder {
            story_path: None,
            config_path: None,
            story: None,
            config: None,
            seed: None,
            games: Vec::new(),
        }
    }

    /// Begin the first session: present the start node, ungated.
    pub fn start(&mut self) -> Result<Vec<EngineEvent>, EngineError> {
        if self.started {
            return self.request_restart(None);
        }
        self.started = true;
        tracing::info!(seed = self.router.seed(), "session started");
        let mut events = vec![self.lives_event()];
        let shown = self.router.present_start()?;
        events.push(EngineEvent::NodePresented(shown.node));
        Ok(events)
    }

    /// Handle the player picking a choice on the current node.
    #[tracing::instrument(skip(self))]
    pub fn submit_choice(&mut self, choice: ChoiceRef) -> Result<Vec<EngineEvent>, EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        if self.gate.is_pending() {
            return Err(EngineError::GatePending);
        }
        if self.router.is_over() {
            return Err(RouteError::SessionOver.into());
        }

        let choice = self.router.select_choice(&choice)?;
        let planned = self.router.plan(&choice)?;
        let mut events = Vec::new();

        let cadence = self.router.config().life_reward_cadence;
        if gate::reward_milestone(self.router.session_mut(), cadence) {
            tracing::debug!(choices = planned.choices_made, "life restored");
            events.push(self.lives_event());
        }

        if self.gate.should_gate(planned.choices_made, planned.next_is_ending) {
            let (session, rng) = self.router.session_and_rng();
            let opened = self.gate.run_gate(session, rng)?;
            self.router.mark_gate_pending();
            self.gated_target = Some(planned.target_id);
            events.push(EngineEvent::GateOpened {
                tier: opened.tier,
                title: opened.title,
            });
        } else {
            self.present(&planned.target_id, &mut events)?;
        }

        events.extend(self.pump()?);
        Ok(events)
    }

    /// Process a mini-game outcome if one has arrived.
    pub fn pump(&mut self) -> Result<Vec<EngineEvent>, EngineError> {
        match self.gate.take_outcome() {
            Some(outcome) => self.settle_gate(outcome.success),
            None => Ok(Vec::new()),
        }
    }

    /// Give up waiting for the running mini-game and count it as failed.
    pub fn abandon_gate(&mut self) -> Result<Vec<EngineEvent>, EngineError> {
        let ticket = self.gate.abandon()?;
        tracing::debug!(ticket = ticket.0, "mini-game abandoned");
        self.settle_gate(false)
    }

    fn settle_gate(&mut self, success: bool) -> Result<Vec<EngineEvent>, EngineError> {
        let mut events = Vec::new();
        let Some(target) = self.gated_target.take() else {
            tracing::error!(success, "mini-game outcome with no gated transition");
            return Ok(events);
        };

        match gate::settle(self.router.session_mut(), success) {
            GateVerdict::Proceed { life_lost } => {
                if life_lost {
                    events.push(self.lives_event());
                }
                self.present(&target, &mut events)?;
            }
            GateVerdict::OutOfLives => {
                events.push(self.lives_event());
                self.router.mark_out_of_lives();
                let message = self
                    .router
                    .rng_mut()
                    .pick(&self.death_messages)
                    .cloned()
                    .unwrap_or_else(|| FALLBACK_DEATH_MESSAGE.to_string());
                tracing::info!(discarded = %target, "out of lives");
                events.push(EngineEvent::OutOfLives(DeathScreen { message }));
            }
        }
        Ok(events)
    }

    fn present(&mut self, target: &str, events: &mut Vec<EngineEvent>) -> Result<(), EngineError> {
        let shown = self.router.commit(target)?;
        events.push(EngineEvent::NodePresented(shown.node));
        if shown.lives_drained {
            events.push(self.lives_event());
        }
        Ok(())
    }

    /// Throw the session away and present the start node again.
    /// `Some(seed)` reseeds; `None` keeps the current random stream.
    pub fn request_restart(&mut self, seed: Option<&str>) -> Result<Vec<EngineEvent>, EngineError> {
        self.gate.cancel();
        self.gated_target = None;
        let seed = seed.filter(|s| !s.is_empty());
        if let Some(seed) = seed {
            self.seed_text = Some(seed.to_string());
        }
        self.router.reset_session(seed);
        self.started = true;
        tracing::info!(seed = self.router.seed(), "session restarted");

        let mut events = vec![EngineEvent::SessionRestarted, self.lives_event()];
        let shown = self.router.present_start()?;
        events.push(EngineEvent::NodePresented(shown.node));
        Ok(events)
    }

    pub fn set_minigames_enabled(&mut self, enabled: bool) {
        self.gate.set_enabled(enabled);
    }

    pub fn minigames_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    pub fn is_gate_pending(&self) -> bool {
        self.gate.is_pending()
    }

    pub fn is_over(&self) -> bool {
        self.router.is_over()
    }

    pub fn route_state(&self) -> RouteState {
        self.router.state()
    }

    pub fn session(&self) -> &SessionState {
        self.router.session()
    }

    pub fn graph(&self) -> &SceneGraph {
        self.router.graph()
    }

    pub fn config(&self) -> &EngineConfig {
        self.router.config()
    }

    /// The current node as the player would see it now.
    pub fn current_node(&self) -> Result<ResolvedNode, EngineError> {
        let id = self.router.session().current_node_id();
        Ok(self.router.resolve(id)?)
    }

    /// Numeric seed of the random stream.
    pub fn seed(&self) -> u32 {
        self.router.seed()
    }

    /// Short label for sharing the seed string, if one was supplied.
    pub fn seed_label(&self) -> Option<String> {
        self.seed_text.as_deref().map(seed_label)
    }

    fn lives_event(&self) -> EngineEvent {
        let session = self.router.session();
        EngineEvent::LivesChanged {
            current: session.lives(),
            max: session.max_lives(),
        }
    }
}

impl StoryEngineBuilder {
    pub fn story_path(mut self, path: &Path) -> Self {
        self.story_path = Some(path.to_path_buf());
        self
    }

    pub fn config_path(mut self, path: &Path) -> Self {
        self.config_path = Some(path.to_path_buf());
        self
    }

    pub fn with_story(mut self, story: Story) -> Self {
        self.story = Some(story);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Seed string; absent or empty means time-based seeding.
    pub fn seed(mut self, seed: &str) -> Self {
        self.seed = Some(seed.to_string());
        self
    }

    pub fn with_minigame(mut self, tier: Tier, game: Box<dyn MiniGame>) -> Self {
        self.games.push((tier, game));
        self
    }

    pub fn build(self) -> Result<StoryEngine, EngineError> {
        let story = match (self.story, self.story_path) {
            (Some(story), _) => story,
            (None, Some(path)) => Story::load_from_ron(&path)?,
            (None, None) => return Err(EngineError::MissingStory),
        };
        let config = match (self.config, self.config_path) {
            (Some(config), _) => {
                config.validate()?;
                config
            }
            (None, Some(path)) => EngineConfig::load_from_ron(&path)?,
            (None, None) => EngineConfig::default(),
        };

        let seed_text = self.seed.filter(|s| !s.is_empty());
        let rng = StoryRng::from_seed_str(seed_text.as_deref());
        let mut gate = MiniGameGate::new(
            config.gate_cadence,
            config.minigames_enabled,
            config.tier_policy.clone(),
        );
        for (tier, game) in self.games {
            gate.register(tier, game);
        }

        let mut router =
            RoutingController::new(story.graph, config, story.indicators, rng).with_counters(story.counters);
        let added = router.prime_capacity();
        tracing::debug!(added, nodes = router.graph().len(), games = gate.game_count(), "engine built");

        Ok(StoryEngine {
            router,
            gate,
            death_messages: story.death_messages,
            seed_text,
            gated_target: None,
            started: false,
        })
    }
}
