//! Orderwire CLI - realtime order, chat and notification channel.
//!
//! This is the main binary entry point. See the `orderwire` library for the
//! core functionality.

use std::fs::File;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use orderwire::env::Environment;
use orderwire::{commands, Config, UserId};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "orderwire")]
#[command(version)]
#[command(about = "Realtime order, chat and notification channel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect as a user and print events until Ctrl-C
    Listen {
        /// Backend user id to authenticate as
        #[arg(long)]
        user_id: u64,
    },
    /// Print the unread chat count for a user
    Unread {
        /// Backend user id
        #[arg(long)]
        user_id: u64,
    },
    /// Mark all of a user's chat messages as seen
    MarkSeen {
        /// Backend user id
        #[arg(long)]
        user_id: u64,
    },
    /// Show the effective configuration
    Config {
        /// Also write it to `config.json` in the config dir
        #[arg(long)]
        save: bool,
    },
}

/// Log destination: `ORDERWIRE_LOG_FILE`, else `orderwire.log` in
/// `ORDERWIRE_CONFIG_DIR`, else stderr.
fn log_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ORDERWIRE_LOG_FILE") {
        Some(PathBuf::from(path))
    } else if let Ok(config_dir) = std::env::var("ORDERWIRE_CONFIG_DIR") {
        Some(PathBuf::from(config_dir).join("orderwire.log"))
    } else {
        None
    }
}

fn init_logging(environment: Environment) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(environment.default_log_filter()),
    );
    builder.format_timestamp_secs();

    if let Some(path) = log_path() {
        match File::create(&path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot write log file {}: {e}; logging to stderr", path.display()),
        }
    }

    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let environment = Environment::current();
    init_logging(environment);

    let cli = Cli::parse();
    let config = Config::load()?;
    log::debug!("Running in {} environment", environment);

    match cli.command {
        Commands::Listen { user_id } => {
            commands::listen::run(&config, UserId(user_id)).await?;
        }
        Commands::Unread { user_id } => {
            let count = commands::unread_count(&config, UserId(user_id)).await?;
            println!("{count}");
        }
        Commands::MarkSeen { user_id } => {
            let at = commands::mark_seen(&config, UserId(user_id))?;
            println!("Marked seen at {}", at.to_rfc3339());
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("# endpoint: {}", config.ws_url());
            println!("# environment: {environment}");
            if save {
                let path = config.save()?;
                println!("# saved to {}", path.display());
            }
        }
    }

    Ok(())
}
