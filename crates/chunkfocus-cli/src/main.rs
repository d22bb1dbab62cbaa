use chunkfocus_core::{CoreError, StoreError};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "chunkfocus", version, about = "Two-chunk focus timer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a tile to the next session
    Add {
        /// What you intend to work on
        text: String,
    },
    /// Primary action: add a tile, or begin the next chunk
    Go {
        /// Tile text while fewer than two tiles exist
        text: Option<String>,
        /// Start the chunk and return instead of counting down here
        #[arg(long)]
        detach: bool,
    },
    /// Recover the current chunk and keep counting down
    Resume {
        /// Re-arm and return instead of counting down here
        #[arg(long)]
        detach: bool,
    },
    /// Pause the running chunk
    Pause,
    /// Print the recovered session state as JSON
    Status,
    /// Clear tiles and progress
    Reset,
    /// Guided breathing
    Breathe {
        /// Length in minutes (1-4)
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Alternate-side balancing
    Balance {
        /// Length in minutes (1-4)
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Completed tiles and recalibrations
    History,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Add { text } => commands::session::add(&text).await,
        Commands::Go { text, detach } => commands::session::go(text.as_deref(), detach).await,
        Commands::Resume { detach } => commands::session::resume(detach).await,
        Commands::Pause => commands::session::pause().await,
        Commands::Status => commands::session::status().await,
        Commands::Reset => commands::session::reset().await,
        Commands::Breathe { minutes } => {
            commands::recalibrate::run(chunkfocus_core::RecalibrationMode::Breathing, minutes)
                .await
        }
        Commands::Balance { minutes } => {
            commands::recalibrate::run(chunkfocus_core::RecalibrationMode::Balancing, minutes)
                .await
        }
        Commands::History => commands::history::run(),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        let (message, code) = describe_failure(&e);
        eprintln!("error: {message}");
        std::process::exit(code);
    }
}

/// Message and exit code for a failed command. A busy database gets its own
/// code so scripts can retry.
fn describe_failure(e: &CoreError) -> (String, i32) {
    match e {
        CoreError::Store(StoreError::Locked) => (
            "another chunkfocus command is using the database, try again".to_string(),
            2,
        ),
        e => (e.to_string(), 1),
    }
}
