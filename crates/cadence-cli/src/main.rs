mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, cycle::CycleSubcommand, data::DataSubcommand,
    scenario::ScenarioSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cadence",
    about = "Time-bucketed cycles and scenarios: create, elect masters, tag, compare, submit",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .cadence/)
    #[arg(long, global = true, env = "CADENCE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .cadence/ with a starter config
    Init,

    /// Show or validate the scenario and pipeline templates
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Manage cycles
    Cycle {
        #[command(subcommand)]
        subcommand: CycleSubcommand,
    },

    /// Manage scenarios
    Scenario {
        #[command(subcommand)]
        subcommand: ScenarioSubcommand,
    },

    /// Read and write scenario data node values
    Data {
        #[command(subcommand)]
        subcommand: DataSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Cycle { subcommand } => cmd::cycle::run(&root, subcommand, cli.json),
        Commands::Scenario { subcommand } => cmd::scenario::run(&root, subcommand, cli.json),
        Commands::Data { subcommand } => cmd::data::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
