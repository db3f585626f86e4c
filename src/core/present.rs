/// Presentation boundary: the events the engine emits and the trait a
/// front-end implements to receive them.
use serde::Serialize;

use crate::core::gate::Tier;
use crate::schema::scene::ResolvedNode;

/// The "game over" screen shown when the last life is lost in a mini-game.
/// Distinct from narrative endings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeathScreen {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    NodePresented(ResolvedNode),
    LivesChanged { current: u32, max: u32 },
    GateOpened { tier: Tier, title: String },
    OutOfLives(DeathScreen),
    SessionRestarted,
}

impl EngineEvent {
    /// Forward this event to the matching presenter callback.
    pub fn dispatch(&self, presenter: &mut dyn Presenter) {
        match self {
            Self::NodePresented(node) => presenter.on_node_presented(node),
            Self::LivesChanged { current, max } => presenter.on_lives_changed(*current, *max),
            Self::GateOpened { tier, title } => presenter.on_gate_opened(*tier, title),
            Self::OutOfLives(screen) => presenter.on_out_of_lives(screen),
            Self::SessionRestarted => presenter.on_session_restarted(),
        }
    }
}

/// Dispatch a batch of events in order.
pub fn dispatch_all(events: &[EngineEvent], presenter: &mut dyn Presenter) {
    for event in events {
        event.dispatch(presenter);
    }
}

/// Receiver side of the presentation boundary.
pub trait Presenter {
    fn on_node_presented(&mut self, node: &ResolvedNode);
    fn on_out_of_lives(&mut self, screen: &DeathScreen);
    fn on_lives_changed(&mut self, _current: u32, _max: u32) {}
    fn on_gate_opened(&mut self, _tier: Tier, _title: &str) {}
    fn on_session_restarted(&mut self) {}
}
