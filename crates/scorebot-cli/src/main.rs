mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{checks::ChecksSubcommand, config::ConfigSubcommand, results::ResultsSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scorebot",
    about = "Scoring engine: probe team services on a fixed interval and record the outcomes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Competition root (default: auto-detect from .scorebot/)
    #[arg(long, global = true, env = "SCOREBOT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .scorebot/ with a default config, sample inventory and empty credentials
    Init,

    /// Run rounds on the configured interval until Ctrl-C
    Run,

    /// Run a single round now and print its results
    Round,

    /// Inspect check types and rendered probe commands
    Checks {
        #[command(subcommand)]
        subcommand: ChecksSubcommand,
    },

    /// Query stored rounds and results
    Results {
        #[command(subcommand)]
        subcommand: ResultsSubcommand,
    },

    /// Validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run | Commands::Round => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Run => cmd::run::run(&root),
        Commands::Round => cmd::round::run(&root, cli.json),
        Commands::Checks { subcommand } => cmd::checks::run(&root, subcommand, cli.json),
        Commands::Results { subcommand } => cmd::results::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
