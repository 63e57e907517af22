//! Canopy CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive or single-message conversation
//! - `history` — Print an owner's stored conversation
//! - `grow`    — Load grow records and sensor readings
//! - `config`  — Create or inspect the configuration file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "canopy",
    about = "Canopy — context-aware cultivation assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with Canopy
    Chat {
        /// Conversation owner
        #[arg(long, env = "CANOPY_OWNER", default_value = "local")]
        owner: String,

        /// Grow to discuss (defaults to the most recent active grow)
        #[arg(long)]
        grow: Option<String>,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show stored conversation turns, oldest first
    History {
        #[arg(long, env = "CANOPY_OWNER", default_value = "local")]
        owner: String,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Manage grow records
    Grow {
        #[command(subcommand)]
        action: GrowAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum GrowAction {
    /// Load grows and snapshots from a JSON file
    Load {
        /// File with `{"grows": [...], "snapshots": [...]}`
        file: std::path::PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat {
            owner,
            grow,
            stream,
            message,
        } => commands::chat::run(owner, grow, stream, message).await?,
        Commands::History {
            owner,
            limit,
            offset,
        } => commands::history::run(&owner, limit, offset).await?,
        Commands::Grow {
            action: GrowAction::Load { file },
        } => commands::grow::load(&file).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config_cmd::init(force)?,
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path()?,
        },
    }

    Ok(())
}
