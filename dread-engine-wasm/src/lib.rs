//! WASM bindings for dread-engine: drives the browser edition of the story.
//!
//! The page owns rendering and runs the mini-games itself. Every call
//! returns the engine events as a JSON array; when a `gate_opened` event
//! arrives the page plays the named game and reports back through
//! `complete_gate`.

use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use dread_engine::core::config::EngineConfig;
use dread_engine::core::graph::Story;
use dread_engine::schema::scene::CounterReading;
use dread_engine::{ChoiceRef, Completion, EngineEvent, MiniGame, StoryEngine, Tier};

// ---------------------------------------------------------------------------
// Embedded story data: compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const MONKEYS_PAW_STORY: &str = include_str!("../../story_data/monkeys_paw/story.ron");
    pub const MONKEYS_PAW_CONFIG: &str = include_str!("../../story_data/monkeys_paw/config.ron");
}

/// Titles of the games the page implements, by tier.
const GAME_TITLES: [(Tier, &str); 9] = [
    (Tier::Early, "Remember the Warnings"),
    (Tier::Early, "Resist the Temptation"),
    (Tier::Early, "Decipher the Curse"),
    (Tier::Middle, "The Paw's Pattern"),
    (Tier::Middle, "Escape Your Fate"),
    (Tier::Middle, "Catch Herbert's Spirit"),
    (Tier::Late, "The Paw Commands"),
    (Tier::Late, "Stop the Knocking"),
    (Tier::Late, "Close the Door!"),
];

// ---------------------------------------------------------------------------
// Page-side mini-games
// ---------------------------------------------------------------------------

/// A mini-game played in the page. Starting it parks the completion handle
/// where `complete_gate` can reach it; resetting drops the handle.
struct PageGame {
    title: &'static str,
    running: Rc<RefCell<Option<Completion>>>,
}

impl MiniGame for PageGame {
    fn name(&self) -> &str {
        self.title
    }

    fn reset(&mut self) {
        self.running.borrow_mut().take();
    }

    fn start(&mut self, completion: Completion) {
        *self.running.borrow_mut() = Some(completion);
    }
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct StatusInfo {
    lives: u32,
    max_lives: u32,
    sections: usize,
    choices_made: u32,
    phase: &'static str,
    gate_pending: bool,
    minigames_enabled: bool,
    seed_label: Option<String>,
    counters: Vec<CounterReading>,
}

fn to_json(events: &[EngineEvent]) -> Result<String, JsError> {
    serde_json::to_string(events).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

/// Hex seed from the platform's random source, used when the page has none.
fn fresh_seed() -> Result<String, JsError> {
    let mut bytes = [0u8; 6];
    getrandom::getrandom(&mut bytes).map_err(|e| JsError::new(&format!("Random source error: {e}")))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

fn seed_or_fresh(seed: Option<String>) -> Result<String, JsError> {
    match seed {
        Some(s) if !s.is_empty() => Ok(s),
        _ => fresh_seed(),
    }
}

// ---------------------------------------------------------------------------
// Exported story handle
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct DreadStory {
    engine: StoryEngine,
    running: Rc<RefCell<Option<Completion>>>,
}

#[wasm_bindgen]
impl DreadStory {
    /// Load the bundled story. An absent or empty seed picks a fresh one.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: Option<String>) -> Result<DreadStory, JsError> {
        let story = Story::parse_ron(data::MONKEYS_PAW_STORY)
            .map_err(|e| JsError::new(&format!("Story parse error: {e}")))?;
        let config = EngineConfig::parse_ron(data::MONKEYS_PAW_CONFIG)
            .map_err(|e| JsError::new(&format!("Config parse error: {e}")))?;

        let running = Rc::new(RefCell::new(None));
        let mut builder = StoryEngine::builder()
            .with_story(story)
            .with_config(config)
            .seed(&seed_or_fresh(seed)?);
        for (tier, title) in GAME_TITLES {
            builder = builder.with_minigame(
                tier,
                Box::new(PageGame {
                    title,
                    running: Rc::clone(&running),
                }),
            );
        }
        let engine = builder
            .build()
            .map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;

        Ok(DreadStory { engine, running })
    }

    /// Present the opening scene. Returns a JSON array of events.
    pub fn start(&mut self) -> Result<String, JsError> {
        let events = self
            .engine
            .start()
            .map_err(|e| JsError::new(&format!("Start error: {e}")))?;
        to_json(&events)
    }

    /// Pick a visible choice by its 1-based number.
    pub fn choose(&mut self, number: usize) -> Result<String, JsError> {
        self.submit(ChoiceRef::Number(number))
    }

    /// Pick a visible choice by the id of the scene it leads to.
    pub fn choose_target(&mut self, target_id: &str) -> Result<String, JsError> {
        self.submit(ChoiceRef::Target(target_id.to_string()))
    }

    /// Report the result of the mini-game the page is showing.
    pub fn complete_gate(&mut self, success: bool) -> Result<String, JsError> {
        let completion = self.running.borrow_mut().take();
        match completion {
            Some(mut completion) => {
                completion.complete(success);
            }
            None => return Err(JsError::new("No mini-game is running")),
        }
        let events = self
            .engine
            .pump()
            .map_err(|e| JsError::new(&format!("Gate error: {e}")))?;
        to_json(&events)
    }

    /// Give up on the running mini-game (page closed it, timer ran out).
    /// Counts as a failure.
    pub fn abandon_gate(&mut self) -> Result<String, JsError> {
        let events = self
            .engine
            .abandon_gate()
            .map_err(|e| JsError::new(&format!("Gate error: {e}")))?;
        to_json(&events)
    }

    /// Start over. Passing a seed replays that story; otherwise the
    /// current random stream continues.
    pub fn restart(&mut self, seed: Option<String>) -> Result<String, JsError> {
        let seed = seed.filter(|s| !s.is_empty());
        let events = self
            .engine
            .request_restart(seed.as_deref())
            .map_err(|e| JsError::new(&format!("Restart error: {e}")))?;
        to_json(&events)
    }

    pub fn set_minigames_enabled(&mut self, enabled: bool) {
        self.engine.set_minigames_enabled(enabled);
    }

    /// The current scene as JSON, for redrawing after a reload.
    pub fn current_node(&self) -> Result<String, JsError> {
        let node = self
            .engine
            .current_node()
            .map_err(|e| JsError::new(&format!("Node error: {e}")))?;
        serde_json::to_string(&node).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Lives, progress, counters and seed as JSON.
    pub fn status(&self) -> Result<String, JsError> {
        let node = self
            .engine
            .current_node()
            .map_err(|e| JsError::new(&format!("Node error: {e}")))?;
        let session = self.engine.session();
        let info = StatusInfo {
            lives: session.lives(),
            max_lives: session.max_lives(),
            sections: session.unique_section_count(),
            choices_made: session.choices_made(),
            phase: session.phase().name(),
            gate_pending: self.engine.is_gate_pending(),
            minigames_enabled: self.engine.minigames_enabled(),
            seed_label: self.engine.seed_label(),
            counters: node.counters,
        };
        serde_json::to_string(&info).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// JSON array of every mini-game title the page is expected to provide.
    pub fn game_titles() -> String {
        let titles: Vec<&str> = GAME_TITLES.iter().map(|(_, title)| *title).collect();
        serde_json::to_string(&titles).unwrap_or_else(|_| "[]".to_string())
    }
}

// Private helpers
impl DreadStory {
    fn submit(&mut self, choice: ChoiceRef) -> Result<String, JsError> {
        let events = self
            .engine
            .submit_choice(choice)
            .map_err(|e| JsError::new(&format!("Choice error: {e}")))?;
        to_json(&events)
    }
}
