/// Routing integration tests: pacing, repetition avoidance and filler
/// synthesis driven through the public engine API.
use dread_engine::core::config::EngineConfig;
use dread_engine::core::graph::Story;
use dread_engine::core::rng::StoryRng;
use dread_engine::schema::scene::ResolvedNode;
use dread_engine::{ChoiceRef, EngineEvent, StoryEngine};
use std::path::Path;

const FIXTURE: &str = "tests/fixtures/test_story.ron";

fn fixture() -> Story {
    Story::load_from_ron(Path::new(FIXTURE)).unwrap()
}

fn pacing(min_sections: usize) -> EngineConfig {
    EngineConfig {
        min_sections_before_ending: min_sections,
        capacity_buffer: 3,
        initial_capacity: 0,
        ..EngineConfig::default()
    }
}

/// Pacing with forced endings switched off.
fn calm(min_sections: usize) -> EngineConfig {
    let mut config = pacing(min_sections);
    config.ending_odds.base = 0.0;
    config.ending_odds.per_unit.clear();
    config.ending_odds.flag_bonus.clear();
    config
}

fn engine(seed: &str, config: EngineConfig) -> StoryEngine {
    StoryEngine::builder()
        .with_story(fixture())
        .with_config(config)
        .seed(seed)
        .build()
        .unwrap()
}

fn presented(events: Vec<EngineEvent>) -> Vec<ResolvedNode> {
    events
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::NodePresented(node) => Some(node),
            _ => None,
        })
        .collect()
}

/// Play random choices until an ending or `max_steps`. Returns every
/// presented node in order, start node first.
fn random_walk(engine: &mut StoryEngine, walker_seed: u32, max_steps: usize) -> Vec<ResolvedNode> {
    let mut walker = StoryRng::new(walker_seed);
    let mut shown = presented(engine.start().unwrap());
    for _ in 0..max_steps {
        let current = shown.last().unwrap();
        if current.is_ending() {
            break;
        }
        let pick = walker.pick_index(current.choices.len()).unwrap();
        shown.extend(presented(engine.submit_choice(ChoiceRef::Number(pick + 1)).unwrap()));
    }
    shown
}

#[test]
fn no_ending_before_minimum_sections() {
    for seed in 1..60u32 {
        let mut engine = engine(&format!("seed-{}", seed), pacing(6));
        let shown = random_walk(&mut engine, seed, 300);
        for node in &shown {
            if node.is_ending() {
                assert!(
                    node.unique_sections >= 6,
                    "seed {}: ending {} after {} sections",
                    seed,
                    node.id,
                    node.unique_sections
                );
            }
        }
    }
}

#[test]
fn section_count_tracks_visited_set() {
    for seed in 1..40u32 {
        let mut engine = engine(&format!("count-{}", seed), pacing(8));
        let mut walker = StoryRng::new(seed);
        let mut shown = presented(engine.start().unwrap());
        let mut last_count = 0;
        for _ in 0..60 {
            let node = shown.last().unwrap().clone();
            let session = engine.session();
            assert_eq!(node.unique_sections, session.visited().len());
            assert_eq!(session.unique_section_count(), session.visited().len());
            assert!(node.unique_sections >= last_count);
            last_count = node.unique_sections;
            if node.is_ending() {
                break;
            }
            let pick = walker.pick_index(node.choices.len()).unwrap();
            shown = presented(engine.submit_choice(ChoiceRef::Number(pick + 1)).unwrap());
        }
    }
}

#[test]
fn never_presents_the_node_it_left() {
    for seed in 1..40u32 {
        let mut engine = engine(&format!("move-{}", seed), pacing(10));
        let shown = random_walk(&mut engine, seed, 80);
        for pair in shown.windows(2) {
            assert_ne!(pair[0].id, pair[1].id, "seed {}", seed);
        }
    }
}

#[test]
fn seed_abc_visits_five_sections_before_any_ending() {
    let mut engine = engine("abc", pacing(5));
    let mut shown = presented(engine.start().unwrap());
    for _ in 0..200 {
        if shown.last().unwrap().is_ending() {
            break;
        }
        shown.extend(presented(engine.submit_choice(ChoiceRef::Number(1)).unwrap()));
    }
    let first_ending = shown.iter().position(|n| n.is_ending()).unwrap_or(shown.len());
    let distinct: std::collections::HashSet<&str> =
        shown[..first_ending].iter().map(|n| n.id.as_str()).collect();
    assert!(distinct.len() >= 5, "only {} distinct sections", distinct.len());
}

#[test]
fn ending_one_short_of_threshold_is_replaced() {
    let mut engine = engine("short", calm(2));
    engine.start().unwrap();
    assert_eq!(engine.session().unique_section_count(), 1);
    let shown = presented(engine.submit_choice(ChoiceRef::Target("LEAVE".to_string())).unwrap());
    let node = &shown[0];
    assert!(!node.is_ending());
    assert_ne!(node.id, "HALL");
    assert_eq!(node.unique_sections, 2);
}

#[test]
fn ending_is_reachable_once_threshold_met() {
    let mut engine = engine("reach", calm(2));
    engine.start().unwrap();
    engine.submit_choice(ChoiceRef::Target("STAIRS".to_string())).unwrap();
    // Repeats are allowed once the threshold is met.
    let back = presented(engine.submit_choice(ChoiceRef::Target("HALL".to_string())).unwrap());
    assert_eq!(back[0].id, "HALL");
    let shown = presented(engine.submit_choice(ChoiceRef::Target("LEAVE".to_string())).unwrap());
    assert_eq!(shown[0].id, "LEAVE");
    assert_eq!(shown[0].ending.as_ref().unwrap().tag, "THE LONG WALK");
    assert!(engine.is_over());
}

#[test]
fn starvation_grows_the_store_with_filler() {
    let mut engine = engine("starve", pacing(20));
    let shown = random_walk(&mut engine, 7, 15);
    assert!(shown.iter().all(|n| !n.is_ending()));
    assert!(engine.graph().synthesized_count() > 0);
    assert!(shown.iter().any(|n| n.id.starts_with("AUTO_")));
    assert!(engine.graph().non_ending_count() >= 23);
}

#[test]
fn filler_scenes_use_story_motifs_and_exits() {
    let mut engine = engine("filler", pacing(20));
    random_walk(&mut engine, 3, 15);
    let filler = engine.graph().find_node("AUTO_001").unwrap();
    assert!(filler.text.ends_with("You feel the story tightening around you."));
    assert!(filler.text.contains("The paw twitches, patient as a spider"));
    let targets: Vec<&str> = filler.choices.iter().map(|c| c.target_id.as_str()).collect();
    assert_eq!(targets, vec!["HALL", "STAIRS"]);
}

#[test]
fn ensure_minimum_is_idempotent() {
    let mut graph = fixture().graph;
    let mut rng = StoryRng::new(99);
    let added = graph.ensure_minimum_non_ending_nodes(20, &mut rng);
    assert_eq!(added, 12);
    assert_eq!(graph.ensure_minimum_non_ending_nodes(20, &mut rng), 0);
    assert_eq!(graph.non_ending_count(), 20);
}

#[test]
fn preconditions_filter_visible_choices() {
    let mut engine = engine("filter", calm(30));
    engine.start().unwrap();
    let stairs = presented(engine.submit_choice(ChoiceRef::Target("STAIRS".to_string())).unwrap());
    assert_eq!(stairs[0].id, "STAIRS");
    let shown = presented(engine.submit_choice(ChoiceRef::Target("NURSERY".to_string())).unwrap());
    assert_eq!(shown[0].id, "NURSERY");
    assert_eq!(shown[0].choices.len(), 2);
    assert!(engine.submit_choice(ChoiceRef::Target("WISH".to_string())).is_err());
}

#[test]
fn forced_endings_only_after_threshold() {
    let mut config = pacing(3);
    config.ending_odds.base = 1.0;
    let mut engine = engine("forced", config);
    let shown = random_walk(&mut engine, 5, 10);
    assert_eq!(shown.len(), 3);
    assert!(!shown[1].is_ending());
    assert!(shown[2].is_ending());
    assert_eq!(shown[2].unique_sections, 3);
    assert_eq!(engine.graph().overwritten_count(), 1);
}
