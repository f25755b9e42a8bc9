//! schemadrift CLI
//!
//! Walks through the additive-migration hazard against a real SQLite file:
//! `init`, `list`, `up`, `list` again, `down`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemadrift_db::{Direction, MappingPolicy, Store, StoreConfig, DATABASE_URL_ENV};
use schemadrift_logging::{init_logging, LogConfig};
use tracing::error;

mod cli;

const DEFAULT_DATABASE_URL: &str = "sqlite:schemadrift.db?mode=rwc";

#[derive(Parser, Debug)]
#[command(name = "schemadrift", about = "Strict vs lenient row mapping across a live migration")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Database URL
    #[arg(long, global = true, env = DATABASE_URL_ENV, default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the users table and seed the demo row
    Init {
        /// JSON table definition (defaults to the bundled users table)
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// List users
    List {
        /// Ignore columns the record does not declare
        #[arg(long)]
        lenient: bool,

        /// Read as the newer record version that knows phone_number
        #[arg(long)]
        with_phone: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add users.phone_number
    Up,

    /// Drop users.phone_number
    Down,

    /// Show live columns of users
    Columns {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "schemadrift",
        verbose: cli.verbose,
    }) {
        eprintln!("{:#}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("ERROR: {:#}", err);
            for hint in cli::hints(&err) {
                eprintln!("  {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = StoreConfig::from_url(cli.database_url);
    let store = Store::connect(&config)
        .await
        .with_context(|| format!("Failed to open {}", config.url))?;

    let result = match cli.command {
        Commands::Init { schema } => cli::init(&store, schema.as_deref()).await,
        Commands::List {
            lenient,
            with_phone,
            json,
        } => {
            let policy = if lenient {
                MappingPolicy::Lenient
            } else {
                MappingPolicy::Strict
            };
            cli::list(&store, policy, with_phone, json).await
        }
        Commands::Up => cli::migrate(&store, Direction::Up).await,
        Commands::Down => cli::migrate(&store, Direction::Down).await,
        Commands::Columns { json } => cli::columns(&store, json).await,
    };

    store.close().await;
    result
}
