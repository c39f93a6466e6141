//! Config Server Client - remote configuration for long-running services.
//!
//! This library fetches `{name}/{profile}[/{label}]` environments from one or
//! more config servers with failover and retry, merges them into a
//! concurrently readable key/value store, and keeps that store fresh with a
//! background poller.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod store;
pub mod validation;

use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Commands, FetchArgs, WatchArgs};
use crate::config::surface::{from_pairs, to_pairs};
use crate::config::ClientOptions;
use crate::provider::ConfigServerProvider;

pub use crate::client::{ConfigServerLocator, RemoteEnvironment};
pub use crate::error::ConfigServerError;
pub use crate::provider::{ConfigurationProvider, PollerState};
pub use crate::store::ChangeToken;

/// Runs the client with the provided CLI arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level())?;

    match &cli.command {
        Commands::Fetch(args) => fetch(&cli, args).await,
        Commands::Watch(args) => watch(&cli, args).await,
        Commands::OptionsShow => show_options(&cli),
        Commands::OptionsValidate => validate_options(&cli),
    }
}

/// Initializes the tracing subscriber for structured logging.
fn setup_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Reads the options file (or defaults) and applies command-line overrides.
fn read_options(cli: &Cli) -> Result<ClientOptions> {
    let mut options = match &cli.config {
        Some(path) => config::loader::load_from_path(path)
            .with_context(|| format!("Failed to load client options from {}", path.display()))?,
        None => ClientOptions::default(),
    };

    if let Some(uri) = &cli.uri {
        options.uri = uri.clone();
    }
    if let Some(name) = &cli.name {
        options.name = name.clone();
    }
    if let Some(env) = &cli.env {
        options.env = env.clone();
    }
    if let Some(label) = &cli.label {
        options.label = Some(label.clone());
    }

    if !cli.overrides.is_empty() {
        let mut pairs = to_pairs(&options);
        pairs.extend(cli.overrides.iter().cloned());
        let (merged, unknown) = from_pairs(pairs)?;
        for issue in unknown.warnings() {
            warn!(key = %issue.key, suggestion = ?issue.suggestion, "{}", issue.message);
        }
        options = merged;
    }

    Ok(options)
}

/// Loads once and prints the merged keys.
async fn fetch(cli: &Cli, args: &FetchArgs) -> Result<()> {
    let options = config::loader::validate(read_options(cli)?)?;
    let provider = ConfigServerProvider::new(options)?;

    let environment = provider.load_async(true, &CancellationToken::new()).await?;
    match &environment {
        Some(env) => info!(
            name = %env.name,
            version = ?env.version,
            sources = ?env.source_names(),
            "Fetched environment"
        ),
        None => warn!("No environment located, printing client options only"),
    }

    let prefix = args.prefix.as_deref().map(str::to_ascii_lowercase);
    for (key, value) in provider.snapshot().iter() {
        if let Some(prefix) = &prefix {
            if !key.to_ascii_lowercase().starts_with(prefix.as_str()) {
                continue;
            }
        }
        println!("{}={}", key, value);
    }

    if args.metrics {
        println!();
        print!("{}", provider.metrics().gather()?);
    }

    Ok(())
}

/// Attaches a polling provider and logs every change until Ctrl+C.
async fn watch(cli: &Cli, args: &WatchArgs) -> Result<()> {
    let mut options = read_options(cli)?;
    if let Some(interval) = args.interval_ms {
        options.polling_interval = interval;
    }
    let options = config::loader::validate(options)?;

    if options.polling_interval_duration().is_none() {
        warn!("pollingInterval is 0, configuration will not be refreshed");
    }

    let provider = ConfigServerProvider::new(options)?;
    provider.attach().await?;
    info!(
        keys = provider.snapshot().len(),
        poller = ?provider.poller_state(),
        "Watching config server. Press Ctrl+C to stop."
    );

    loop {
        let token = provider.reload_token();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }

            _ = token.changed() => {
                let snapshot = provider.snapshot();
                info!(
                    keys = snapshot.len(),
                    version = ?snapshot.get(store::snapshot::VERSION_KEY),
                    "Configuration changed"
                );
            }
        }
    }

    tokio::time::timeout(Duration::from_secs(30), provider.stop())
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for the poller to stop"))?;
    info!("Config client stopped");
    Ok(())
}

/// Displays the client options as flat keys.
fn show_options(cli: &Cli) -> Result<()> {
    let options = read_options(cli)?;
    for (key, value) in to_pairs(&options) {
        let secret = key.ends_with(":password") || key.ends_with(":token");
        println!("{}={}", key, if secret { "********" } else { value.as_str() });
    }
    Ok(())
}

/// Validates the client options and prints the report.
fn validate_options(cli: &Cli) -> Result<()> {
    let options = read_options(cli)?;
    let result = validation::validate_options(&options);

    println!("{}", validation::report::format_report(&result));

    if !result.is_valid() {
        anyhow::bail!(error::ConfigError::ValidationFailed {
            error_count: result.error_count()
        });
    }

    Ok(())
}
