use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tilecity::{
    engine::{Engine, EngineBuilder},
    scenario::{Scenario, ScenarioLoader},
    snapshot::{load_or_none, SaveData},
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Tile-grid city simulation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scenario headless and print a summary
    Run(RunArgs),
    /// Serve a live city over HTTP
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/starter_town.yaml")]
    scenario: PathBuf,

    /// Override tick count (uses scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override the world seed
    #[arg(long)]
    seed: Option<u32>,

    /// Resume from a save file instead of the scenario layout
    #[arg(long)]
    load: Option<PathBuf>,

    /// Write the final city to this file
    #[arg(long)]
    save: Option<PathBuf>,

    /// Directory for autosaves
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Autosave every N ticks (0 disables)
    #[arg(long)]
    autosave_interval: Option<u64>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, default_value = "scenarios/starter_town.yaml")]
    scenario: PathBuf,

    #[arg(long)]
    load: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Serve(args) => serve(args),
    }
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    ScenarioLoader::new(".").load(path)
}

fn run(args: RunArgs) -> Result<()> {
    let mut scenario = load_scenario(&args.scenario)?;
    if let Some(seed) = args.seed {
        scenario.seed = Some(seed);
    }
    if let Some(interval) = args.autosave_interval {
        scenario.config.snapshot.interval_ticks = interval;
    }
    if let Some(dir) = &args.save_dir {
        scenario.config.snapshot.dir = dir.display().to_string();
    }
    let ticks = scenario.ticks(args.ticks);
    info!(
        scenario = %scenario.name,
        description = scenario.description.as_deref().unwrap_or(""),
        ticks,
        "running scenario"
    );

    let mut engine = build_engine(&scenario, args.load.as_deref().and_then(load_or_none))?;
    engine.run(ticks)?;

    let city = engine.snapshot();
    println!(
        "Scenario '{}' completed for {} ticks. Population {}, jobs {}, balance {:.0}, power {}/{}",
        scenario.name,
        ticks,
        city.stats.population,
        city.stats.jobs,
        city.stats.balance,
        city.power.demand,
        city.power.capacity
    );

    if let Some(path) = args.save {
        engine
            .serialize()
            .write_to(&path)
            .with_context(|| format!("Failed to write save {}", path.display()))?;
    }
    Ok(())
}

fn build_engine(scenario: &Scenario, save: Option<SaveData>) -> Result<Engine> {
    let world = scenario.build_world()?;
    let mut engine = EngineBuilder::new(scenario.engine_settings(), world)
        .with_city_systems(&scenario.config)
        .build();
    if let Some(save) = save {
        engine.load(save)?;
    }
    Ok(engine)
}

fn serve(args: ServeArgs) -> Result<()> {
    let scenario = load_scenario(&args.scenario)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(web::run(WebServerConfig {
        scenario,
        load: args.load,
        host: args.host,
        port: args.port,
    }))
}
