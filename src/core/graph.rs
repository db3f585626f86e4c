/// Scene graph store: node lookup, RON story loading, and filler synthesis.
///
/// Nodes are kept in authoring order; synthesized filler nodes are appended
/// and never removed. The only in-place content write is the forced-ending
/// overwrite, reachable from the routing controller alone.
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::core::motif::{FillerSpec, MotifPools};
use crate::core::rng::StoryRng;
use crate::schema::scene::{Choice, Counter, EndingMark, SceneNode};
use crate::schema::value::StateMap;

/// Number of exits given to filler scenes when the story names none.
const DEFAULT_FILLER_EXITS: usize = 3;
const FILLER_EXIT_LABELS: [&str; 3] = ["Probe deeper", "Take a different turn", "Whisper a safer wish"];

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("node not found: {0}")]
    UnknownNode(String),
    #[error("start node '{0}' is missing")]
    MissingStart(String),
    #[error("start node '{0}' is an ending")]
    StartIsEnding(String),
    #[error("choice in '{from}' targets missing node '{to}'")]
    DanglingTarget { from: String, to: String },
    #[error("ending '{0}' has outgoing choices")]
    EndingWithChoices(String),
    #[error("filler exit targets '{0}', which is not a non-ending scene")]
    BadFillerExit(String),
    #[error("story has no non-ending scene for filler exits")]
    NoFillerExits,
}

/// Authored content of a node, kept so a forced-ending overwrite can be undone.
#[derive(Debug, Clone)]
struct OriginalContent {
    text: String,
    choices: Vec<Choice>,
    ending: Option<EndingMark>,
}

#[derive(Debug, Clone)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    index: FxHashMap<String, usize>,
    start_id: String,
    motifs: MotifPools,
    filler: FillerSpec,
    filler_exits: Vec<Choice>,
    auto_counter: u32,
    originals: FxHashMap<String, OriginalContent>,
}

impl SceneGraph {
    /// Build and validate a graph. Every choice target must exist.
    pub fn new(
        start_id: &str,
        nodes: Vec<SceneNode>,
        motifs: MotifPools,
        filler: FillerSpec,
    ) -> Result<SceneGraph, GraphError> {
        let mut index = FxHashMap::default();
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        let start = index
            .get(start_id)
            .map(|&i| &nodes[i])
            .ok_or_else(|| GraphError::MissingStart(start_id.to_string()))?;
        if start.is_ending() {
            return Err(GraphError::StartIsEnding(start_id.to_string()));
        }

        for node in &nodes {
            if node.is_ending() && !node.choices.is_empty() {
                return Err(GraphError::EndingWithChoices(node.id.clone()));
            }
            for choice in &node.choices {
                if !index.contains_key(&choice.target_id) {
                    return Err(GraphError::DanglingTarget {
                        from: node.id.clone(),
                        to: choice.target_id.clone(),
                    });
                }
            }
        }

        let filler_exits = resolve_filler_exits(&nodes, &index, &filler)?;

        Ok(SceneGraph {
            nodes,
            index,
            start_id: start_id.to_string(),
            motifs,
            filler,
            filler_exits,
            auto_counter: 0,
            originals: FxHashMap::default(),
        })
    }

    pub fn start_id(&self) -> &str {
        &self.start_id
    }

    pub fn find_node(&self, id: &str) -> Option<&SceneNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn non_ending_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_ending()).count()
    }

    pub fn synthesized_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.synthesized).count()
    }

    pub fn ending_ids(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.is_ending())
            .map(|n| n.id.as_str())
            .collect()
    }

    pub fn motifs(&self) -> &MotifPools {
        &self.motifs
    }

    pub fn filler_exits(&self) -> &[Choice] {
        &self.filler_exits
    }

    /// First node, in store order, that is not an ending, not `current`,
    /// and not yet visited.
    pub fn find_unvisited_non_ending(
        &self,
        current: &str,
        visited: &FxHashSet<String>,
    ) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| !n.is_ending() && n.id != current && !visited.contains(&n.id))
            .map(|n| n.id.as_str())
    }

    /// First non-ending node other than `current`, visited or not.
    pub fn find_any_non_ending_except(&self, current: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| !n.is_ending() && n.id != current)
            .map(|n| n.id.as_str())
    }

    /// Grow the store until it holds at least `min_count` non-ending nodes.
    /// Returns the number of filler nodes added; never removes anything.
    #[tracing::instrument(skip(self, rng), fields(nodes = self.nodes.len()))]
    pub fn ensure_minimum_non_ending_nodes(&mut self, min_count: usize, rng: &mut StoryRng) -> usize {
        let have = self.non_ending_count();
        if have >= min_count {
            return 0;
        }
        let to_add = min_count - have;
        for _ in 0..to_add {
            let id = self.next_filler_id();
            let text = self.filler.compose(&self.motifs, rng);
            let node = SceneNode {
                id: id.clone(),
                text,
                choices: self.filler_exits.clone(),
                ending: None,
                synthesized: true,
            };
            self.index.insert(id, self.nodes.len());
            self.nodes.push(node);
        }
        tracing::debug!(added = to_add, total = self.nodes.len(), "synthesized filler scenes");
        to_add
    }

    fn next_filler_id(&mut self) -> String {
        loop {
            self.auto_counter += 1;
            let id = format!("AUTO_{:03}", self.auto_counter);
            if !self.index.contains_key(&id) {
                return id;
            }
        }
    }

    /// Replace a node's content with an ending's content. The node keeps
    /// its id; the authored content is remembered for `restore_overwritten`.
    pub(crate) fn overwrite_with_ending(
        &mut self,
        target_id: &str,
        ending_id: &str,
    ) -> Result<(), GraphError> {
        let ending = self
            .find_node(ending_id)
            .ok_or_else(|| GraphError::UnknownNode(ending_id.to_string()))?;
        let text = ending.text.clone();
        let mark = ending.ending.clone();
        let choices = ending.choices.clone();

        let &slot = self
            .index
            .get(target_id)
            .ok_or_else(|| GraphError::UnknownNode(target_id.to_string()))?;
        let node = &mut self.nodes[slot];
        self.originals
            .entry(target_id.to_string())
            .or_insert_with(|| OriginalContent {
                text: node.text.clone(),
                choices: node.choices.clone(),
                ending: node.ending.clone(),
            });
        node.text = text;
        node.choices = choices;
        node.ending = mark;
        Ok(())
    }

    /// Undo every forced-ending overwrite. Returns how many nodes changed.
    pub(crate) fn restore_overwritten(&mut self) -> usize {
        let restored = self.originals.len();
        for (id, original) in self.originals.drain() {
            if let Some(&slot) = self.index.get(&id) {
                let node = &mut self.nodes[slot];
                node.text = original.text;
                node.choices = original.choices;
                node.ending = original.ending;
            }
        }
        restored
    }

    pub fn overwritten_count(&self) -> usize {
        self.originals.len()
    }
}

fn resolve_filler_exits(
    nodes: &[SceneNode],
    index: &FxHashMap<String, usize>,
    filler: &FillerSpec,
) -> Result<Vec<Choice>, GraphError> {
    if !filler.exits.is_empty() {
        let mut exits = Vec::with_capacity(filler.exits.len());
        for exit in &filler.exits {
            match index.get(&exit.to).map(|&i| &nodes[i]) {
                Some(node) if !node.is_ending() => exits.push(Choice::new(&exit.label, &exit.to)),
                _ => return Err(GraphError::BadFillerExit(exit.to.clone())),
            }
        }
        return Ok(exits);
    }

    // Best-connected authored scenes, ties broken by authoring order.
    let mut candidates: Vec<(usize, &SceneNode)> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| !n.is_ending() && !n.choices.is_empty())
        .collect();
    candidates.sort_by(|(ia, a), (ib, b)| b.choices.len().cmp(&a.choices.len()).then(ia.cmp(ib)));
    let exits: Vec<Choice> = candidates
        .into_iter()
        .take(DEFAULT_FILLER_EXITS)
        .zip(FILLER_EXIT_LABELS)
        .map(|((_, node), label)| Choice::new(label, &node.id))
        .collect();
    if exits.is_empty() {
        return Err(GraphError::NoFillerExits);
    }
    Ok(exits)
}

// RON deserialization helpers: the story file is authored in a flatter
// shape than the runtime node type.

#[derive(Debug, Deserialize)]
#[serde(rename = "Choice")]
struct RonChoice {
    label: String,
    to: String,
    #[serde(default)]
    requires: StateMap,
    #[serde(default)]
    set: StateMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Scene")]
struct RonScene {
    id: String,
    text: String,
    #[serde(default)]
    choices: Vec<RonChoice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Ending")]
struct RonEnding {
    id: String,
    text: String,
    tag: String,
    #[serde(default)]
    fatal: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Story")]
struct RonStory {
    start: String,
    scenes: Vec<RonScene>,
    #[serde(default)]
    endings: Vec<RonEnding>,
    #[serde(default)]
    motifs: FxHashMap<String, Vec<String>>,
    #[serde(default)]
    filler: FillerSpec,
    #[serde(default)]
    death_messages: Vec<String>,
    #[serde(default)]
    indicators: FxHashMap<String, String>,
    #[serde(default)]
    counters: Vec<Counter>,
}

/// A loaded story: the graph plus the presentation strings that travel with it.
#[derive(Debug, Clone)]
pub struct Story {
    pub graph: SceneGraph,
    pub death_messages: Vec<String>,
    /// Flag key → label shown while the flag is truthy.
    pub indicators: FxHashMap<String, String>,
    /// Numeric flags shown as running counts.
    pub counters: Vec<Counter>,
}

impl Story {
    /// Load a story from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Story, GraphError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a story from a RON string.
    pub fn parse_ron(input: &str) -> Result<Story, GraphError> {
        let raw: RonStory = ron::from_str(input)?;

        let mut nodes = Vec::with_capacity(raw.scenes.len() + raw.endings.len());
        for scene in raw.scenes {
            let choices = scene
                .choices
                .into_iter()
                .map(|c| Choice {
                    label: c.label,
                    target_id: c.to,
                    precondition: c.requires,
                    state_mutation: c.set,
                })
                .collect();
            nodes.push(SceneNode {
                id: scene.id,
                text: scene.text,
                choices,
                ending: None,
                synthesized: false,
            });
        }
        for ending in raw.endings {
            nodes.push(SceneNode {
                id: ending.id,
                text: ending.text,
                choices: Vec::new(),
                ending: Some(EndingMark {
                    tag: ending.tag,
                    fatal: ending.fatal,
                }),
                synthesized: false,
            });
        }

        let graph = SceneGraph::new(&raw.start, nodes, MotifPools::new(raw.motifs), raw.filler)?;
        Ok(Story {
            graph,
            death_messages: raw.death_messages,
            indicators: raw.indicators,
            counters: raw.counters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::Value;

    const SMALL_STORY: &str = r#"Story(
        start: "A",
        scenes: [
            Scene(id: "A", text: "Front door.", choices: [
                Choice(label: "In", to: "B", set: {"has_paw": Bool(true)}),
                Choice(label: "Around", to: "C"),
                Choice(label: "Give up", to: "END"),
            ]),
            Scene(id: "B", text: "Hall.", choices: [
                Choice(label: "Back", to: "A"),
                Choice(label: "Wish", to: "END", requires: {"has_paw": Bool(true)}),
            ]),
            Scene(id: "C", text: "Garden.", choices: [Choice(label: "Back", to: "A")]),
        ],
        endings: [
            Ending(id: "END", text: "The door closes behind you.", tag: "SHUT IN"),
            Ending(id: "DEATH", text: "Nothing.", tag: "death", fatal: true),
        ],
        motifs: {
            "room": ["Dust hangs in the air"],
            "object": ["The paw twitches"],
            "knock": ["Three knocks"],
        },
        death_messages: ["The curse claims another victim."],
        indicators: {"has_paw": "Holding the Paw"},
        counters: [Counter(key: "wish_count", label: "Wishes", max: Some(3))],
    )"#;

    fn load() -> Story {
        Story::parse_ron(SMALL_STORY).unwrap()
    }

    #[test]
    fn parse_story_from_ron() {
        let story = load();
        let graph = &story.graph;
        assert_eq!(graph.start_id(), "A");
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.non_ending_count(), 3);
        assert_eq!(graph.ending_ids(), vec!["END", "DEATH"]);
        assert!(graph.find_node("DEATH").unwrap().is_fatal());
        assert_eq!(story.death_messages.len(), 1);
        assert_eq!(story.indicators["has_paw"], "Holding the Paw");
        assert_eq!(story.counters[0].key, "wish_count");
        assert_eq!(story.counters[0].max, Some(3));

        let a = graph.find_node("A").unwrap();
        assert_eq!(a.choices[0].state_mutation["has_paw"], Value::Bool(true));
        let b = graph.find_node("B").unwrap();
        assert_eq!(b.choices[1].precondition["has_paw"], Value::Bool(true));
    }

    #[test]
    fn default_filler_exits_prefer_connected_scenes() {
        let graph = load().graph;
        let targets: Vec<&str> = graph.filler_exits().iter().map(|c| c.target_id.as_str()).collect();
        assert_eq!(targets, vec!["A", "B", "C"]);
    }

    #[test]
    fn dangling_target_is_an_authoring_error() {
        let bad = SMALL_STORY.replace(r#"to: "C")"#, r#"to: "NOWHERE")"#);
        assert!(matches!(
            Story::parse_ron(&bad),
            Err(GraphError::DanglingTarget { ref to, .. }) if to == "NOWHERE"
        ));
    }

    #[test]
    fn missing_or_ending_start_rejected() {
        let missing = SMALL_STORY.replace(r#"start: "A""#, r#"start: "Z""#);
        assert!(matches!(Story::parse_ron(&missing), Err(GraphError::MissingStart(_))));
        let ending = SMALL_STORY.replace(r#"start: "A""#, r#"start: "END""#);
        assert!(matches!(Story::parse_ron(&ending), Err(GraphError::StartIsEnding(_))));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let dup = SMALL_STORY.replace(r#"Scene(id: "C""#, r#"Scene(id: "B""#);
        assert!(matches!(Story::parse_ron(&dup), Err(GraphError::DuplicateNode(_))));
    }

    #[test]
    fn find_unvisited_skips_current_visited_and_endings() {
        let graph = load().graph;
        let mut visited = FxHashSet::default();
        assert_eq!(graph.find_unvisited_non_ending("A", &visited), Some("B"));
        visited.insert("B".to_string());
        assert_eq!(graph.find_unvisited_non_ending("A", &visited), Some("C"));
        visited.insert("C".to_string());
        assert_eq!(graph.find_unvisited_non_ending("A", &visited), None);
        assert_eq!(graph.find_any_non_ending_except("A"), Some("B"));
    }

    #[test]
    fn ensure_minimum_grows_once() {
        let mut graph = load().graph;
        let mut rng = StoryRng::new(5);
        assert_eq!(graph.ensure_minimum_non_ending_nodes(8, &mut rng), 5);
        assert_eq!(graph.non_ending_count(), 8);
        assert_eq!(graph.ensure_minimum_non_ending_nodes(8, &mut rng), 0);
        assert_eq!(graph.ensure_minimum_non_ending_nodes(2, &mut rng), 0);
        assert_eq!(graph.synthesized_count(), 5);

        let filler = graph.find_node("AUTO_001").unwrap();
        assert!(filler.synthesized);
        assert!(!filler.is_ending());
        assert_eq!(filler.choices.len(), 3);
        assert!(filler.text.ends_with("tightening around you."));
        for choice in &filler.choices {
            assert!(graph.contains(&choice.target_id));
        }
    }

    #[test]
    fn filler_ids_are_never_reused() {
        let mut graph = load().graph;
        let mut rng = StoryRng::new(5);
        graph.ensure_minimum_non_ending_nodes(4, &mut rng);
        graph.ensure_minimum_non_ending_nodes(6, &mut rng);
        let ids: Vec<&str> = graph.nodes().filter(|n| n.synthesized).map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["AUTO_001", "AUTO_002", "AUTO_003"]);
    }

    #[test]
    fn overwrite_and_restore() {
        let mut graph = load().graph;
        graph.overwrite_with_ending("C", "END").unwrap();
        let c = graph.find_node("C").unwrap();
        assert!(c.is_ending());
        assert_eq!(c.text, "The door closes behind you.");
        assert!(c.choices.is_empty());
        assert_eq!(graph.overwritten_count(), 1);

        assert_eq!(graph.restore_overwritten(), 1);
        let c = graph.find_node("C").unwrap();
        assert!(!c.is_ending());
        assert_eq!(c.text, "Garden.");
        assert_eq!(graph.overwritten_count(), 0);
    }

    #[test]
    fn overwrite_unknown_node_fails() {
        let mut graph = load().graph;
        assert!(matches!(
            graph.overwrite_with_ending("NOPE", "END"),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn explicit_filler_exits_must_be_scenes() {
        let with_exits = SMALL_STORY.replace(
            "death_messages:",
            r#"filler: (exits: [(label: "Go", to: "END")]),
        death_messages:"#,
        );
        assert!(matches!(Story::parse_ron(&with_exits), Err(GraphError::BadFillerExit(_))));
    }
}
