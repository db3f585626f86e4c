/// Haunted Walk example: a seeded, hands-off walk through The Monkey's Paw.
///
/// Always takes the first visible choice. Every fourth mini-game is lost,
/// so both outcomes show up in the log while the walk still has the lives
/// to reach an ending.
///
/// Run with: cargo run --example haunted_walk [seed]

use dread_engine::schema::scene::ResolvedNode;
use dread_engine::{dispatch_all, ChoiceRef, Completion, DeathScreen, MiniGame, Presenter, StoryEngine, Tier};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

/// Fails every fourth attempt, counted across all the games. The tally
/// is shared so the gate's `reset` before each run leaves it alone.
struct Flinching {
    title: &'static str,
    attempts: Rc<Cell<u32>>,
}

impl MiniGame for Flinching {
    fn name(&self) -> &str {
        self.title
    }

    fn reset(&mut self) {}

    fn start(&mut self, mut completion: Completion) {
        let attempt = self.attempts.get() + 1;
        self.attempts.set(attempt);
        completion.complete(attempt % 4 != 0);
    }
}

#[derive(Default)]
struct Narrator {
    step: usize,
    finished: bool,
}

impl Presenter for Narrator {
    fn on_node_presented(&mut self, node: &ResolvedNode) {
        self.step += 1;
        let first_line = node.text.split(". ").next().unwrap_or(&node.text);
        println!("{:>3}. [{:<8}] {}", self.step, node.id, first_line);
        if let Some(ending) = &node.ending {
            println!();
            println!("    ENDING: {} (after {} sections)", ending.tag, node.unique_sections);
            self.finished = true;
        }
    }

    fn on_out_of_lives(&mut self, screen: &DeathScreen) {
        println!();
        println!("    {}", screen.message);
        self.finished = true;
    }

    fn on_lives_changed(&mut self, current: u32, max: u32) {
        println!("     lives {}/{}", current, max);
    }

    fn on_gate_opened(&mut self, tier: Tier, title: &str) {
        println!("     ~ {} ({}) ~", title, tier.name());
    }
}

fn main() {
    let seed = std::env::args().nth(1).unwrap_or_else(|| "haunted-walk".to_string());

    let attempts = Rc::new(Cell::new(0));
    let mut builder = StoryEngine::builder()
        .story_path(Path::new("story_data/monkeys_paw/story.ron"))
        .config_path(Path::new("story_data/monkeys_paw/config.ron"))
        .seed(&seed);
    for (tier, title) in [
        (Tier::Early, "Remember the Warnings"),
        (Tier::Middle, "Escape Your Fate"),
        (Tier::Late, "Close the Door!"),
    ] {
        builder = builder.with_minigame(
            tier,
            Box::new(Flinching {
                title,
                attempts: Rc::clone(&attempts),
            }),
        );
    }
    let mut engine = builder.build().expect("Failed to build engine");

    println!("========================================");
    println!("   THE MONKEY'S PAW");
    println!("   seed: {}", engine.seed_label().unwrap_or_default());
    println!("========================================");
    println!();

    let mut narrator = Narrator::default();
    let events = engine.start().expect("Failed to start session");
    dispatch_all(&events, &mut narrator);

    while !narrator.finished && narrator.step < 400 {
        let events = engine
            .submit_choice(ChoiceRef::Number(1))
            .expect("First choice should always be available");
        dispatch_all(&events, &mut narrator);
    }

    let session = engine.session();
    println!();
    println!(
        "{} choices, {} distinct sections, {} filler scenes written",
        session.choices_made(),
        session.unique_section_count(),
        engine.graph().synthesized_count()
    );
    println!("{} mini-games played", attempts.get());
}
