//! Dread Engine: a branching horror-fiction runtime.
//!
//! Routes a player through a graph of authored scenes while holding back
//! endings until enough of the story has been seen, synthesizing filler
//! scenes when the authored pool runs dry, and interleaving mini-game
//! gates that cost lives on failure.

pub mod core;
pub mod schema;

pub use crate::core::engine::{EngineError, StoryEngine, StoryEngineBuilder};
pub use crate::core::gate::{Completion, MiniGame, Tier};
pub use crate::core::present::{dispatch_all, DeathScreen, EngineEvent, Presenter};
pub use crate::core::routing::ChoiceRef;
