/// Story Linter: checks a story file for reachability and content gaps.
///
/// Usage: story_linter <story.ron> [--config <config.ron>]
///
/// Loading already rejects dangling targets, duplicate ids and a bad start
/// node; the linter adds the checks that only warn.

use clap::Parser;
use dread_engine::core::config::EngineConfig;
use dread_engine::core::graph::{SceneGraph, Story};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "story_linter", about = "Validate a Dread Engine story file")]
struct Cli {
    /// Story file (RON)
    story: PathBuf,

    /// Engine configuration to validate alongside the story
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let story = match Story::load_from_ron(&cli.story) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("ERROR: Failed to load story: {}", e);
            process::exit(1);
        }
    };

    let mut errors = Vec::new();
    if let Some(ref path) = cli.config {
        match EngineConfig::load_from_ron(path) {
            Ok(config) => {
                if config.min_sections_before_ending > story.graph.non_ending_count() {
                    println!(
                        "  note: {} sections required before an ending, story has {}; filler will make up the rest",
                        config.min_sections_before_ending,
                        story.graph.non_ending_count()
                    );
                }
            }
            Err(e) => errors.push(format!("config: {}", e)),
        }
    }

    let graph = &story.graph;
    println!(
        "Loaded {} scenes, {} endings, {} motif pools",
        graph.non_ending_count(),
        graph.ending_ids().len(),
        graph.motifs().pool_count()
    );

    let warnings = lint_story(&story);

    println!("\n=== Story Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

/// Node ids reachable from the start by following authored choices.
fn reachable(graph: &SceneGraph) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([graph.start_id().to_string()]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(node) = graph.find_node(&id) {
            for choice in &node.choices {
                if !seen.contains(&choice.target_id) {
                    queue.push_back(choice.target_id.clone());
                }
            }
        }
    }
    seen
}

fn lint_story(story: &Story) -> Vec<String> {
    let graph = &story.graph;
    let mut warnings = Vec::new();

    let reached = reachable(graph);
    for node in graph.nodes() {
        if !reached.contains(&node.id) {
            let kind = if node.is_ending() { "Ending" } else { "Scene" };
            warnings.push(format!("{} '{}' is unreachable from '{}'", kind, node.id, graph.start_id()));
        }
    }

    for node in graph.nodes().filter(|n| !n.is_ending()) {
        if node.choices.is_empty() {
            warnings.push(format!("Scene '{}' has no choices", node.id));
            continue;
        }
        if node.choices.iter().all(|c| !c.precondition.is_empty()) {
            warnings.push(format!(
                "Scene '{}' gates every choice behind a flag and may strand the player",
                node.id
            ));
        }
        for choice in &node.choices {
            if choice.target_id == node.id {
                warnings.push(format!("Scene '{}' has a choice leading back to itself", node.id));
            }
        }
    }

    let flags = set_flags(story);
    for key in story.indicators.keys() {
        if !flags.contains(key) {
            warnings.push(format!("Indicator '{}' names a flag no choice ever sets", key));
        }
    }

    if story.death_messages.is_empty() {
        warnings.push("No death messages; the fallback message will be shown".to_string());
    }

    println!("Filler exits:");
    for exit in graph.filler_exits() {
        println!("  {} -> {}", exit.label, exit.target_id);
    }

    warnings
}

fn set_flags(story: &Story) -> HashSet<String> {
    story
        .graph
        .nodes()
        .flat_map(|n| n.choices.iter())
        .flat_map(|c| c.state_mutation.keys().cloned())
        .collect()
}
