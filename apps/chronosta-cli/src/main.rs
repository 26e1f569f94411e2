use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chronosta_era::EraRegistry;
use chronosta_game::{GameConfig, GameEvent, GameSession, LogSink};
use chronosta_input::{Action, InputMapper, TickInput};
use chronosta_kernel::{Level, StepContext, World, step};
use chronosta_persist::{CheckpointStore, SlotId};
use chronosta_time::TimeMode;
use chronosta_tools::WorldInspector;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chronosta-cli", about = "Headless driver for the chronosta time core")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Game config (.yaml, .yml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Level file (YAML); the built-in demo level when omitted
    #[arg(short, long, global = true)]
    level: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and effective configuration
    Info,
    /// Print the era registry as YAML
    Eras,
    /// Step the same scripted input twice and compare the snapshots
    Replay {
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "600")]
        ticks: usize,
    },
    /// Rewind a run and replay the same inputs to show nothing drifts
    Rewind {
        /// Ticks before the rewind target
        #[arg(short, long, default_value = "300")]
        ticks: usize,
        /// Ticks to rewind
        #[arg(short, long, default_value = "120")]
        depth: usize,
    },
    /// Work with checkpoint slots on disk
    Checkpoint {
        /// Save directory; overrides `saves.dir` from the config
        #[arg(short, long)]
        dir: Option<PathBuf>,

        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Run a headless session on scripted input and summarize it
    Run {
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "600")]
        ticks: usize,
        /// Quicksave the final state through the background worker
        #[arg(long)]
        quicksave: bool,
        /// Key script replacing the built-in input: `FRAME down|up KEY` per line
        #[arg(short, long)]
        keys: Option<PathBuf>,
        /// Continue from the suspend save, consuming it
        #[arg(long)]
        resume: bool,
        /// Write the final state to the suspend slot
        #[arg(long, conflicts_with = "quicksave")]
        suspend: bool,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Simulate `ticks` ticks and save the result
    Save {
        /// Slot such as quick-0, manual-2 or checkpoint
        slot: SlotId,
        #[arg(short, long, default_value = "300")]
        ticks: usize,
    },
    /// Load a slot and print its contents
    Load { slot: SlotId },
    /// List occupied slots
    List,
    /// Delete a slot
    Delete { slot: SlotId },
    /// Load the suspend save, print it and remove it
    Resume,
}

/// Presses and releases for one frame of a key script.
type KeyScript = BTreeMap<usize, Vec<(bool, String)>>;

/// Parse a key script. Blank lines and `#` comments are skipped.
fn load_key_script(path: &Path) -> anyhow::Result<KeyScript> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("reading key script {}", path.display()))?;
    let mut script = KeyScript::new();
    for (n, line) in src.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [frame, edge, key] = fields[..] else {
            anyhow::bail!("{}:{}: expected `FRAME down|up KEY`", path.display(), n + 1);
        };
        let frame: usize = frame
            .parse()
            .with_context(|| format!("{}:{}: bad frame number", path.display(), n + 1))?;
        let down = match edge {
            "down" => true,
            "up" => false,
            other => anyhow::bail!("{}:{}: unknown edge '{other}'", path.display(), n + 1),
        };
        script.entry(frame).or_default().push((down, key.to_string()));
    }
    Ok(script)
}

/// Where the input for `run` comes from.
enum Driver {
    Builtin,
    Keys(KeyScript),
}

impl Driver {
    /// Feed frame `i` into the mapper.
    fn feed(&self, i: usize, mapper: &mut InputMapper) {
        match self {
            Driver::Builtin => {
                let want = scripted(i);
                for (held, action) in [
                    (want.move_right, Action::MoveRight),
                    (want.move_left, Action::MoveLeft),
                ] {
                    if held {
                        mapper.press(action);
                    } else {
                        mapper.release(action);
                    }
                }
                if want.jump {
                    mapper.press(Action::Jump);
                }
                if want.use_power {
                    mapper.press(Action::UsePower);
                }
            }
            Driver::Keys(script) => {
                for (down, key) in script.get(&i).into_iter().flatten() {
                    if *down {
                        mapper.key_down(key);
                    } else {
                        mapper.key_up(key);
                    }
                }
            }
        }
    }
}

/// Deterministic input pattern used by every demo command.
fn scripted(i: usize) -> TickInput {
    TickInput {
        move_right: i % 120 < 80,
        move_left: (100..110).contains(&(i % 120)),
        jump: i % 50 == 10,
        use_power: i % 300 == 150,
        ..TickInput::default()
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => GameConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GameConfig::default(),
    };
    let level = match &cli.level {
        Some(path) => Level::load(path)
            .with_context(|| format!("loading level {}", path.display()))?,
        None => Level::demo(),
    };

    match cli.command {
        Commands::Info => {
            println!("chronosta-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "clock: {} Hz, at most {} ticks per frame",
                config.clock.tick_rate_hz, config.clock.max_steps_per_advance
            );
            println!(
                "timeline: {} snapshots ({:.1}s)",
                config.timeline.capacity,
                config.timeline.capacity as f32 * config.dt()
            );
            println!(
                "saves: {} ({} quick and manual slots)",
                config.saves.dir.display(),
                config.saves.max_slots
            );
            println!("{}", WorldInspector::summary(&level.initial_world()));
        }
        Commands::Eras => {
            let registry = config.era_registry()?;
            print!("{}", registry.to_yaml()?);
        }
        Commands::Replay { ticks } => {
            let registry = config.era_registry()?;
            println!("Deterministic replay: level={}, ticks={ticks}", level.name);
            let first = simulate(&level, &registry, config.dt(), ticks);
            let second = simulate(&level, &registry, config.dt(), ticks);
            println!("Run 1:  {}", WorldInspector::summary(&first));
            println!("Run 2:  {}", WorldInspector::summary(&second));
            println!(
                "Match: {}",
                if first == second { "OK" } else { "MISMATCH" }
            );
        }
        Commands::Rewind { ticks, depth } => {
            let mut session = GameSession::new(config.clone(), level.clone())?;
            let mut sink = LogSink;
            for i in 0..ticks {
                session.tick(&scripted(i), &mut sink);
            }
            let target = Arc::clone(session.live());
            for i in ticks..ticks + depth {
                session.tick(&scripted(i), &mut sink);
            }
            println!("Before rewind: {}", WorldInspector::summary(session.live()));
            println!(
                "{}",
                WorldInspector::timeline(session.timeline(), config.clock.tick_rate_hz)
            );

            session.request_rewind(depth, &mut sink)?;
            while session.mode() == TimeMode::Rewinding {
                session.tick(&TickInput::default(), &mut sink);
            }
            println!("After rewind:  {}", WorldInspector::summary(session.live()));
            println!(
                "Rewound to target: {}",
                if session.live() == &target { "OK" } else { "MISMATCH" }
            );

            session.toggle_pause(&mut sink);
            for i in ticks..ticks + depth {
                session.tick(&scripted(i), &mut sink);
            }
            let mut fresh = GameSession::new(config, level)?;
            for i in 0..ticks + depth {
                fresh.tick(&scripted(i), &mut sink);
            }
            println!(
                "Replay matches uninterrupted run: {}",
                if session.live() == fresh.live() { "OK" } else { "MISMATCH" }
            );
        }
        Commands::Checkpoint { dir, action } => {
            let dir = dir.unwrap_or_else(|| config.saves.dir.clone());
            let store = CheckpointStore::open(&dir, config.saves.max_slots)
                .with_context(|| format!("opening save directory {}", dir.display()))?;
            match action {
                CheckpointAction::Save { slot, ticks } => {
                    let registry = config.era_registry()?;
                    let world = simulate(&level, &registry, config.dt(), ticks);
                    let summary = store.save(slot, &world, world.era())?;
                    println!(
                        "Saved {} ({:?}): level={} era={} tick={}",
                        summary.slot, summary.kind, summary.level, summary.era, summary.tick
                    );
                }
                CheckpointAction::Load { slot } => {
                    let record = store.load_with_fallback(slot)?;
                    if record.slot != slot {
                        println!("Slot {slot} unreadable, fell back to {}", record.slot);
                    }
                    println!("{}", WorldInspector::summary(&record.world));
                    for id in WorldInspector::list_entities(&record.world) {
                        if let Some(info) = WorldInspector::inspect_entity(&record.world, id) {
                            println!("  {info}");
                        }
                    }
                }
                CheckpointAction::List => {
                    let slots = store.list()?;
                    if slots.is_empty() {
                        println!("No checkpoints in {}", dir.display());
                    }
                    for s in slots {
                        println!(
                            "{:<12} level={} era={} tick={} saved_at_ms={}",
                            s.slot, s.level, s.era, s.tick, s.saved_at_ms
                        );
                    }
                }
                CheckpointAction::Delete { slot } => {
                    store.delete(slot)?;
                    println!("Deleted {slot}");
                }
                CheckpointAction::Resume => {
                    let record = store.resume()?;
                    println!("Resumed and cleared suspend save");
                    println!("{}", WorldInspector::summary(&record.world));
                }
            }
        }
        Commands::Run {
            ticks,
            quicksave,
            keys,
            resume,
            suspend,
        } => {
            let driver = match &keys {
                Some(path) => Driver::Keys(load_key_script(path)?),
                None => Driver::Builtin,
            };
            let step_time = Duration::from_secs_f64(1.0 / config.clock.tick_rate_hz as f64);
            let mut mapper = InputMapper::new(config.bindings.clone());
            let mut session = GameSession::new(config, level)?;
            let mut events: Vec<GameEvent> = Vec::new();
            if quicksave || suspend || resume {
                session.attach_checkpoints()?;
            }
            if resume {
                session.resume(&mut events);
                if !session.wait_for_checkpoint(Duration::from_secs(10), &mut events) {
                    anyhow::bail!("resume did not complete");
                }
                match events.last() {
                    Some(GameEvent::CheckpointLoaded { tick, .. }) => println!("Resumed at tick {tick}"),
                    Some(GameEvent::Reported(report)) => anyhow::bail!("resume failed: {report}"),
                    _ => {}
                }
            }
            let mut simulated = 0;
            let mut i = 0;
            while simulated < ticks {
                driver.feed(i, &mut mapper);
                let stats = session.frame(step_time, &mapper.sample(), &mut events);
                simulated += stats.simulated as usize;
                i += 1;
            }
            let sim_events = events
                .iter()
                .filter(|e| matches!(e, GameEvent::Sim(_)))
                .count();
            println!("{}", WorldInspector::summary(session.live()));
            println!(
                "{}",
                WorldInspector::timeline(session.timeline(), session.config().clock.tick_rate_hz)
            );
            println!("events: {sim_events} simulation, {} total", events.len());
            for e in &events {
                if let GameEvent::LevelCompleted { level, next_level } = e {
                    match next_level {
                        Some(next) => println!("Level '{level}' complete, next: {next}"),
                        None => println!("Level '{level}' complete, end of run"),
                    }
                }
            }

            if quicksave || suspend {
                let slot = if suspend { SlotId::Suspend } else { SlotId::Quick(0) };
                session.save(slot, &mut events);
                let seen = events.len();
                loop {
                    if !session.wait_for_checkpoint(Duration::from_secs(10), &mut events) {
                        anyhow::bail!("save to {slot} did not complete");
                    }
                    let outcome = events[seen..].iter().find(|e| match e {
                        GameEvent::CheckpointSaved(s) => s.slot == slot,
                        GameEvent::Reported(_) => true,
                        _ => false,
                    });
                    match outcome {
                        Some(GameEvent::CheckpointSaved(s)) => {
                            println!("Saved {} at tick {}", s.slot, s.tick);
                            break;
                        }
                        Some(GameEvent::Reported(report)) => {
                            anyhow::bail!("save to {slot} failed: {report}")
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    Ok(())
}

/// Step a level from its initial snapshot with the scripted input, applying
/// the rules of whichever era is live each tick.
fn simulate(level: &Level, registry: &EraRegistry, dt: f32, ticks: usize) -> World {
    let mut world = level.initial_world();
    for i in 0..ticks {
        let ctx = StepContext {
            era: registry.get(world.era()),
            terrain: &level.terrain,
            dt,
        };
        world = step(&world, &scripted(i), &ctx).world;
    }
    world
}
