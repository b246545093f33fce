//! Recall - conversation memory CLI
//!
//! Entry point: loads `.env` and settings, installs logging, then runs the
//! requested subcommand against the configured memory backend.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use recall_memory::AppSettings;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let loaded = recall_memory::load_settings();
    let default_filter = match &loaded {
        Ok(settings) => settings.logging.level.clone(),
        Err(_) => AppSettings::default().logging.level,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "Failed to load settings, using defaults");
            AppSettings::default()
        }
    };

    let cli = cli::Cli::parse();
    cli::run(cli, settings).await
}
