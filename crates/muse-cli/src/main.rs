//! Muse CLI - command-line harness for the local assistance engine.

use clap::{Parser, Subcommand};

mod commands;

/// Muse - local AI code assistance
#[derive(Parser)]
#[command(name = "muse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detected binaries, models, and directories
    Info,

    /// Start the inference server and report its status
    Status {
        /// Keep the server running after reporting
        #[arg(long)]
        keep: bool,
    },

    /// Ask the assistant a question
    Ask {
        /// The question
        message: String,
        /// Language context for the question
        #[arg(long)]
        language: Option<String>,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    match cli.command {
        Commands::Info => commands::info::run(),
        Commands::Status { keep } => tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(commands::status::run(keep)),
        Commands::Ask { message, language } => tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(commands::ask::run(&message, language.as_deref())),
    }
}
