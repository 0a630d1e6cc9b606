//! StoreScribe CLI - Ledger database and catalog management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run ledger database migrations
//! scribe-cli migrate
//!
//! # Seed or refresh the standard credit package catalog
//! scribe-cli seed-packages
//!
//! # Expire fully consumed purchases for a shop
//! scribe-cli sweep --shop acme.myshopify.com
//!
//! # List undelivered notification outbox rows
//! scribe-cli outbox pending
//! ```
//!
//! Configuration comes from the environment (see `LedgerConfig`); a `.env`
//! file is loaded when present.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use storescribe_ledger::LedgerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "scribe-cli")]
#[command(author, version, about = "StoreScribe ledger CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run ledger database migrations
    Migrate,
    /// Seed or refresh the standard credit package catalog
    SeedPackages,
    /// Expire fully consumed purchases for a shop
    Sweep {
        /// Shop domain to sweep
        #[arg(short, long)]
        shop: String,
    },
    /// Inspect the notification outbox
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },
}

#[derive(Subcommand)]
enum OutboxAction {
    /// List undelivered notifications
    Pending,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &LedgerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = LedgerConfig::from_env().expect("Failed to load configuration");

    // Sentry must be initialized before the tracing subscriber.
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storescribe=info,sqlx=warn".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &LedgerConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run(config).await?,
        Commands::SeedPackages => commands::seed::run(config).await?,
        Commands::Sweep { shop } => commands::sweep::run(config, &shop).await?,
        Commands::Outbox { action } => match action {
            OutboxAction::Pending => commands::outbox::pending(config).await?,
        },
    }
    Ok(())
}
