/// Playthrough: play a story in the terminal.
///
/// Usage: playthrough [--story <path>] [--config <path>] [--seed <text>]
///                    [--auto] [--no-minigames] [--max-steps <n>]
///
/// Choices are entered by number. Mini-games are short typing trials;
/// with `--auto` both choices and trials are decided at random.

use clap::Parser;
use dread_engine::core::rng::StoryRng;
use dread_engine::schema::scene::ResolvedNode;
use dread_engine::{dispatch_all, ChoiceRef, Completion, DeathScreen, MiniGame, Presenter, StoryEngine, Tier};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "playthrough", about = "Play a Dread Engine story in the terminal")]
struct Cli {
    /// Story file (RON)
    #[arg(long, default_value = "story_data/monkeys_paw/story.ron")]
    story: PathBuf,

    /// Engine configuration (RON)
    #[arg(long, default_value = "story_data/monkeys_paw/config.ron")]
    config: PathBuf,

    /// Seed text; the same seed replays the same story
    #[arg(long)]
    seed: Option<String>,

    /// Pick choices and mini-game results at random
    #[arg(long)]
    auto: bool,

    /// Never gate choices behind mini-games
    #[arg(long)]
    no_minigames: bool,

    /// Stop after this many choices
    #[arg(long, default_value_t = 500)]
    max_steps: usize,
}

/// A typing trial: the player must repeat a word exactly.
struct TypingTrial {
    title: &'static str,
    words: &'static [&'static str],
    rng: StoryRng,
    auto: bool,
}

impl TypingTrial {
    fn boxed(title: &'static str, words: &'static [&'static str], seed: u32, auto: bool) -> Box<Self> {
        Box::new(Self {
            title,
            words,
            rng: StoryRng::new(seed),
            auto,
        })
    }
}

impl MiniGame for TypingTrial {
    fn name(&self) -> &str {
        self.title
    }

    fn reset(&mut self) {}

    fn start(&mut self, mut completion: Completion) {
        let word = self.rng.pick(self.words).copied().unwrap_or("paw");
        if self.auto {
            let passed = self.rng.next_f64() < 0.6;
            println!("  [{}] {}", self.title, if passed { "passed" } else { "failed" });
            completion.complete(passed);
            return;
        }
        println!("  [{}] Type \"{}\" to hold on:", self.title, word);
        let passed = read_line().is_some_and(|line| line.trim().eq_ignore_ascii_case(word));
        println!("  {}", if passed { "You hold on." } else { "Your hand slips." });
        completion.complete(passed);
    }
}

const EARLY_WORDS: &[&str] = &["warning", "sergeant", "fakir", "wish"];
const MIDDLE_WORDS: &[&str] = &["machinery", "compensation", "herbert", "cemetery"];
const LATE_WORDS: &[&str] = &["knocking", "bolt", "candle", "goodbye"];

/// Prints events as they arrive.
#[derive(Default)]
struct Terminal {
    ended: bool,
}

impl Presenter for Terminal {
    fn on_node_presented(&mut self, node: &ResolvedNode) {
        println!();
        println!("[{} | {} sections]", node.id, node.unique_sections);
        println!("{}", node.text);
        if !node.indicators.is_empty() {
            println!("  ({})", node.indicators.join(", "));
        }
        for counter in &node.counters {
            println!("  {}", counter);
        }
        if let Some(ending) = &node.ending {
            println!();
            println!("*** {} ***", ending.tag);
            self.ended = true;
            return;
        }
        for choice in &node.choices {
            println!("  {}. {}", choice.number, choice.label);
        }
    }

    fn on_out_of_lives(&mut self, screen: &DeathScreen) {
        println!();
        println!("*** {} ***", screen.message);
        self.ended = true;
    }

    fn on_lives_changed(&mut self, current: u32, max: u32) {
        println!("Lives: {}/{}", current, max);
    }

    fn on_gate_opened(&mut self, tier: Tier, title: &str) {
        println!("-- {} trial: {} --", tier.name(), title);
    }

    fn on_session_restarted(&mut self) {
        println!("The story begins again.");
        self.ended = false;
    }
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut builder = StoryEngine::builder()
        .story_path(&cli.story)
        .config_path(&cli.config)
        .seed(cli.seed.as_deref().unwrap_or(""));
    for (i, (tier, title, words)) in [
        (Tier::Early, "Remember the Warnings", EARLY_WORDS),
        (Tier::Middle, "The Paw's Pattern", MIDDLE_WORDS),
        (Tier::Late, "Stop the Knocking", LATE_WORDS),
    ]
    .into_iter()
    .enumerate()
    {
        builder = builder.with_minigame(tier, TypingTrial::boxed(title, words, 7 + i as u32, cli.auto));
    }

    let mut engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };
    if cli.no_minigames {
        engine.set_minigames_enabled(false);
    }
    if let Some(label) = engine.seed_label() {
        println!("Seed: {}", label);
    }

    let mut terminal = Terminal::default();
    let mut walker = StoryRng::new(engine.seed());
    let mut events = match engine.start() {
        Ok(events) => events,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    for _ in 0..cli.max_steps {
        dispatch_all(&events, &mut terminal);
        if terminal.ended {
            break;
        }
        let visible = match engine.current_node() {
            Ok(node) => node.choices.len(),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                process::exit(1);
            }
        };

        let choice = if cli.auto {
            walker.pick_index(visible).map(|i| ChoiceRef::Number(i + 1))
        } else {
            prompt_choice()
        };
        let Some(choice) = choice else { break };

        events = match engine.submit_choice(choice) {
            Ok(events) => events,
            Err(e) => {
                println!("  {}", e);
                Vec::new()
            }
        };
    }

    let session = engine.session();
    println!();
    println!(
        "Sections seen: {}, choices made: {}, lives left: {}",
        session.unique_section_count(),
        session.choices_made(),
        session.lives()
    );
}

/// Ask for a choice. `None` on end of input or `q`.
fn prompt_choice() -> Option<ChoiceRef> {
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let line = read_line()?;
        let line = line.trim();
        if line.eq_ignore_ascii_case("q") {
            return None;
        }
        match line.parse::<usize>() {
            Ok(n) => return Some(ChoiceRef::Number(n)),
            Err(_) => println!("  Enter a choice number, or q to quit."),
        }
    }
}
