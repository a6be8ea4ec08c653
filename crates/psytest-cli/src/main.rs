//! psytest CLI: score candidate sessions and inspect the answer key.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "psytest",
    version,
    about = "Psychometric test scoring and report synthesis"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score completed sessions
    Score {
        /// Path to a session file (.json/.toml) or a directory of them
        #[arg(long)]
        session: PathBuf,

        /// Output directory for result JSON files
        #[arg(long, default_value = "./psytest-results")]
        output: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Max concurrent sessions (overrides config)
        #[arg(long)]
        parallelism: Option<usize>,
    },

    /// Validate session files
    Validate {
        /// Path to a session file or directory
        #[arg(long)]
        session: PathBuf,
    },

    /// Show the IQ answer key, or look up a single question
    Key {
        /// Global question number (1-60)
        #[arg(long, conflicts_with_all = ["series", "index"])]
        question: Option<u32>,

        /// Series letter (A-E)
        #[arg(long, requires = "index")]
        series: Option<char>,

        /// Item index within the series (1-12)
        #[arg(long, requires = "series")]
        index: Option<u32>,
    },

    /// Print the question order a session sees
    Order {
        /// Session identifier
        #[arg(long)]
        session_id: String,

        /// Number of questions
        #[arg(long, default_value = "200")]
        count: u32,
    },

    /// Create starter config and an example session
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("psytest=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Score {
            session,
            output,
            config,
            parallelism,
        } => commands::score::execute(session, output, config, parallelism).await,
        Commands::Validate { session } => commands::validate::execute(session),
        Commands::Key {
            question,
            series,
            index,
        } => commands::key::execute(question, series, index),
        Commands::Order { session_id, count } => commands::order::execute(&session_id, count),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
