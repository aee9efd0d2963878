//! Cart Sync CLI - inspect and edit a cookie-backed cart.
//!
//! # Usage
//!
//! ```bash
//! # Show the hydrated cart
//! cart-cli show
//!
//! # Add a product (repeat to add quantity)
//! cart-cli add 66f1c0de8a1b2c3d4e5f6789
//!
//! # Change the quantity of a product already in the cart
//! cart-cli increase 66f1c0de8a1b2c3d4e5f6789
//! cart-cli decrease 66f1c0de8a1b2c3d4e5f6789
//!
//! # Print the raw reference list stored in the cookie
//! cart-cli ids
//!
//! # Empty the cart
//! cart-cli clear
//! ```
//!
//! Configuration is read from the environment; see `cart_sync::config`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use cart_sync::CartConfig;
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cart-cli")]
#[command(author, version, about = "Cookie-backed cart tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile and print the cart
    Show,
    /// Add one unit of a product
    Add {
        /// Catalog product ID
        id: String,
    },
    /// Add one unit of a product already in the cart
    Increase {
        /// Catalog product ID
        id: String,
    },
    /// Remove one unit of a product already in the cart
    Decrease {
        /// Catalog product ID
        id: String,
    },
    /// Print the stored reference list without contacting the catalog
    Ids,
    /// Remove everything from the cart
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
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
    let cli = Cli::parse();

    // Load configuration first (needed for Sentry init)
    let config = CartConfig::from_env();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cart_sync=info,cart_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(commands::CliError::from(cart_sync::Error::from(e))),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartConfig) -> Result<(), commands::CliError> {
    let cart = commands::open_cart(config)?;

    match cli.command {
        Commands::Show => commands::show(&cart).await,
        Commands::Add { id } => commands::add(&cart, &id).await?,
        Commands::Increase { id } => commands::increase(&cart, &id).await?,
        Commands::Decrease { id } => commands::decrease(&cart, &id).await?,
        Commands::Ids => commands::ids(&cart),
        Commands::Clear => commands::clear(&cart).await,
    }
    Ok(())
}
