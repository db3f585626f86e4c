use serde::{Deserialize, Serialize};

use super::value::StateMap;

/// An outgoing edge of a scene: what the player reads, where it leads,
/// what must hold for it to be offered, and what it changes when taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub target_id: String,
    /// Every listed flag must equal the given value for the choice to be shown.
    #[serde(default)]
    pub precondition: StateMap,
    /// Applied when the choice is taken, whatever node routing ends up on.
    #[serde(default)]
    pub state_mutation: StateMap,
}

impl Choice {
    pub fn new(label: &str, target_id: &str) -> Self {
        Self {
            label: label.to_string(),
            target_id: target_id.to_string(),
            precondition: StateMap::default(),
            state_mutation: StateMap::default(),
        }
    }
}

/// Ending marker carried by terminal scenes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndingMark {
    pub tag: String,
    /// Instant-death endings drain every remaining life when presented.
    #[serde(default)]
    pub fatal: bool,
}

/// A single narrative unit of the story graph.
///
/// `ending` is `Some` iff the node is terminal; endings have no choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: String,
    pub text: String,
    pub choices: Vec<Choice>,
    pub ending: Option<EndingMark>,
    /// True for filler nodes produced by the store rather than authored.
    #[serde(default)]
    pub synthesized: bool,
}

impl SceneNode {
    pub fn is_ending(&self) -> bool {
        self.ending.is_some()
    }

    pub fn ending_tag(&self) -> Option<&str> {
        self.ending.as_ref().map(|e| e.tag.as_str())
    }

    pub fn is_fatal(&self) -> bool {
        self.ending.as_ref().is_some_and(|e| e.fatal)
    }
}

/// Coarse narrative progress, advanced by the number of unique sections seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Intro,
    Middle,
    Late,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Middle => "middle",
            Self::Late => "late",
        }
    }
}

/// A numeric story flag shown to the player as a running count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub max: Option<u32>,
}

/// A counter's value under the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterReading {
    pub label: String,
    pub value: i64,
    pub max: Option<u32>,
}

impl std::fmt::Display for CounterReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}: {}/{}", self.label, self.value, max),
            None => write!(f, "{}: {}", self.label, self.value),
        }
    }
}

/// A choice as offered to the player, after precondition filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibleChoice {
    /// 1-based number shown to the player.
    pub number: usize,
    pub label: String,
    pub target_id: String,
}

/// The payload handed to the presentation layer for every presented node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedNode {
    pub id: String,
    pub text: String,
    pub choices: Vec<VisibleChoice>,
    pub ending: Option<EndingMark>,
    pub phase: Phase,
    pub unique_sections: usize,
    /// Labels of the story flags currently in effect.
    pub indicators: Vec<String>,
    pub counters: Vec<CounterReading>,
}

impl ResolvedNode {
    pub fn is_ending(&self) -> bool {
        self.ending.is_some()
    }
}
