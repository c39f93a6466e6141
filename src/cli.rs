//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Client for a Spring Cloud style config server.
#[derive(Parser, Debug)]
#[command(name = "config-client", version, about, long_about = None)]
pub struct Cli {
    /// Path to the client options file (YAML). Defaults apply when omitted.
    #[arg(short, long, env = "CONFIG_CLIENT_OPTIONS", global = true)]
    pub config: Option<PathBuf>,

    /// Config server base URI(s), comma-separated.
    #[arg(long, env = "SPRING_CLOUD_CONFIG_URI", global = true)]
    pub uri: Option<String>,

    /// Application name to request.
    #[arg(long, env = "SPRING_APPLICATION_NAME", global = true)]
    pub name: Option<String>,

    /// Profile to request.
    #[arg(long, env = "SPRING_CLOUD_CONFIG_ENV", global = true)]
    pub env: Option<String>,

    /// Label(s) to request, comma-separated.
    #[arg(long, env = "SPRING_CLOUD_CONFIG_LABEL", global = true)]
    pub label: Option<String>,

    /// Extra option as a flat key, e.g. `--set retry:enabled=true`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value, global = true)]
    pub overrides: Vec<(String, String)>,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load configuration once and print the merged keys.
    Fetch(FetchArgs),

    /// Load configuration and keep polling until interrupted.
    Watch(WatchArgs),

    /// Display the client options as flat keys.
    #[command(name = "options-show")]
    OptionsShow,

    /// Validate the client options without contacting the server.
    #[command(name = "options-validate")]
    OptionsValidate,
}

/// Arguments for the fetch subcommand.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Only print keys below this prefix.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Print Prometheus metrics after the keys.
    #[arg(long, default_value = "false")]
    pub metrics: bool,
}

/// Arguments for the watch subcommand.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Polling interval in milliseconds, overriding the options file.
    #[arg(long)]
    pub interval_ms: Option<u64>,
}
