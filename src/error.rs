//! Error types for the config server client.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a single config server candidate could not supply an environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("invalid uri '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("malformed environment body: {0}")]
    Parse(String),
}

impl FetchFailure {
    /// Short outcome label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            FetchFailure::InvalidUri { .. } => "invalid_uri",
            FetchFailure::Timeout(_) => "timeout",
            FetchFailure::Transport(_) => "transport",
            FetchFailure::Status(_) => "error_status",
            FetchFailure::Parse(_) => "parse",
        }
    }
}

/// The last failure observed against one candidate URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    /// Request URI of the candidate (credentials stripped).
    pub uri: String,
    /// What went wrong.
    pub failure: FetchFailure,
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.uri, self.failure)
    }
}

/// Errors surfaced by a configuration load.
#[derive(Error, Debug)]
pub enum ConfigServerError {
    #[error(
        "Could not locate PropertySource, fail fast property is set, failing: {}",
        format_failures(.failures)
    )]
    Exhausted { failures: Vec<CandidateFailure> },

    #[error("Could not locate PropertySource for '{name}/{profile}', fail fast property is set, failing")]
    NotLocated { name: String, profile: String },

    #[error("configuration load was cancelled")]
    Cancelled,

    #[error("blocking load is not possible on a current-thread runtime while another load is in flight")]
    BlockingLoadUnsupported,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to build runtime for blocking load: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("failed to set up metrics: {0}")]
    Metrics(#[from] MetricsError),
}

impl ConfigServerError {
    /// Returns true if this error is a cancellation rather than a load failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConfigServerError::Cancelled)
    }
}

fn format_failures(failures: &[CandidateFailure]) -> String {
    if failures.is_empty() {
        return "no candidates were tried".to_string();
    }

    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors loading the client's own options.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read options file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse options file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Invalid value '{value}' for option '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("Options validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize },
}

/// Metrics registration errors.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus registration failed: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("Prometheus encoding failed: {0}")]
    Encoding(String),
}
