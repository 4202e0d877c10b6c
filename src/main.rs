use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use seedling::{
    engine::{EngineBuilder, EngineSettings},
    scenario::ScenarioLoader,
    snapshot::SaveStore,
    Command,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Seedling turn engine runner")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Play a scenario headless: AI seats act, human seats pass.
    Run {
        /// Path to the scenario YAML file
        #[arg(long, default_value = "scenarios/meadow.yaml")]
        scenario: PathBuf,

        /// Override turn count (uses scenario default when omitted)
        #[arg(long)]
        turns: Option<u64>,

        /// Directory for saves (uses scenario setting when omitted)
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        CliCommand::Run {
            scenario,
            turns,
            save_dir,
        } => run(scenario, turns, save_dir),
    }
}

fn run(scenario_path: PathBuf, turns: Option<u64>, save_dir: Option<PathBuf>) -> Result<()> {
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&scenario_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&scenario.logging.level)),
        )
        .init();

    let state = scenario.build_state()?;
    let turns = scenario.turns(turns);
    let mut saves = scenario.saves.clone();
    if let Some(dir) = save_dir {
        saves.dir = dir;
    }
    let store = SaveStore::from_config(&saves)
        .with_context(|| format!("Failed to open save directory {}", saves.dir.display()))?;

    let mut engine = EngineBuilder::new(EngineSettings::new(
        scenario.name.clone(),
        scenario.rules.clone(),
    ))
    .with_default_systems()
    .build();
    engine.load(state);
    engine.start()?;

    for _ in 0..turns {
        let before = engine.turn();
        for player in engine.awaiting() {
            engine.execute(Command::EndTurn { player })?;
        }
        if engine.turn() == before {
            engine.advance_turn()?;
        }
        if let Some(state) = engine.state() {
            store.save(&state)?;
        }
    }

    let state = engine.state().context("engine lost its state")?;
    info!(turn = state.turn(), "run finished");
    println!(
        "Scenario '{}' completed {} turns. Flowers: {}, flower types: {}",
        scenario.name,
        turns,
        state.flowers().count(),
        state.flower_types().count()
    );
    for player in state.players() {
        println!(
            "  player {} ({:?}): {} flowers, {} seed types",
            player.id,
            player.controller,
            player.flowers.len(),
            player.seeds.len()
        );
    }
    Ok(())
}
