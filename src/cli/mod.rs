//! CLI module for Recall
//!
//! Provides commands:
//! - `show`: print the stored turns of a session
//! - `save`: append one turn
//! - `clear`: delete a session
//! - `migrate`: export a snapshot session into an SQLite file

use clap::{Parser, Subcommand};
use recall_memory::{AppSettings, DEFAULT_SESSION};
use std::path::PathBuf;

pub mod memory;
pub mod migrate;

/// Recall conversation memory CLI
#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(about = "Conversation memory over Redis, SQLite or RAM")]
#[command(version)]
pub struct Cli {
    /// Conversation id
    #[arg(long, global = true, default_value = DEFAULT_SESSION)]
    pub session: String,

    /// Backend override (none, in_memory, redis, sqlite, persistent)
    #[arg(long, global = true)]
    pub backend: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the session's turns, oldest first
    Show {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Append one turn to the session
    Save {
        /// Speaker role
        #[arg(long, default_value = "user")]
        role: String,
        /// Message text
        #[arg(long)]
        content: String,
    },
    /// Delete every turn of the session
    Clear,
    /// Export a session from the in-memory snapshot into SQLite
    Migrate {
        /// Target SQLite file (defaults to memory.sqlite.path)
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// Snapshot file (defaults to memory.snapshot_path)
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli, mut settings: AppSettings) -> anyhow::Result<()> {
    if let Some(backend) = cli.backend {
        settings.memory.backend = backend;
    }

    match cli.command {
        Some(Commands::Show { json }) => memory::show(&settings, &cli.session, json).await,
        Some(Commands::Save { role, content }) => {
            memory::save(&settings, &cli.session, role, content).await
        }
        Some(Commands::Clear) => memory::clear(&settings, &cli.session).await,
        Some(Commands::Migrate { db_path, snapshot }) => {
            migrate::run(&settings, &cli.session, db_path, snapshot).await
        }
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
