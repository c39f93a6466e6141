//! Client option data structures.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options controlling how the client talks to the config server.
///
/// Read-only once a provider has been built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// When false the client never performs network I/O.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Surface load failures as errors instead of loading nothing.
    #[serde(default)]
    pub fail_fast: bool,

    /// Application name requested from the server.
    #[serde(default = "default_name")]
    pub name: String,

    /// Profile (environment) requested from the server.
    #[serde(default = "default_environment", alias = "profile", alias = "environment")]
    pub env: String,

    /// Comma-separated labels, tried in order.
    #[serde(default)]
    pub label: Option<String>,

    /// Comma-separated base URIs, tried in order.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Basic auth user name.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,

    /// Token sent as `X-Config-Token`.
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Polling interval in milliseconds (0 disables polling).
    #[serde(default)]
    pub polling_interval: u64,

    /// Whether TLS certificates of the server are verified.
    #[serde(default = "default_true")]
    pub validate_certificates: bool,

    /// Retry settings.
    #[serde(default)]
    pub retry: RetryOptions,

    /// Discovery-first lookup settings.
    #[serde(default)]
    pub discovery: DiscoveryOptions,

    /// Health contributor settings.
    #[serde(default)]
    pub health: HealthOptions,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Retry configuration for a full load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOptions {
    /// Whether failed loads are retried.
    #[serde(default)]
    pub enabled: bool,

    /// First backoff interval in milliseconds.
    #[serde(default = "default_initial_interval")]
    pub initial_interval: u64,

    /// Upper bound on the backoff interval in milliseconds.
    #[serde(default = "default_max_interval")]
    pub max_interval: u64,

    /// Factor applied to the interval after every attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Maximum number of attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Discovery-first lookup configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryOptions {
    /// Resolve base URIs through a locator instead of `uri`.
    #[serde(default)]
    pub enabled: bool,

    /// Service id of the config server in the registry.
    #[serde(default = "default_service_id")]
    pub service_id: String,
}

/// Health contributor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOptions {
    /// Whether the health contributor reports anything.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How long a fetched environment is reused, in milliseconds.
    #[serde(default = "default_time_to_live")]
    pub time_to_live: u64,
}

impl ClientOptions {
    /// Returns the base URIs in listed order.
    pub fn uris(&self) -> Vec<String> {
        split_list(&self.uri)
    }

    /// Returns the labels in listed order; empty when no label is configured.
    pub fn labels(&self) -> Vec<String> {
        self.label.as_deref().map(split_list).unwrap_or_default()
    }

    /// Per-request timeout.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Polling interval, or `None` when polling is disabled.
    pub fn polling_interval_duration(&self) -> Option<Duration> {
        (self.polling_interval > 0).then(|| Duration::from_millis(self.polling_interval))
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_fast: false,
            name: default_name(),
            env: default_environment(),
            label: None,
            uri: default_uri(),
            username: None,
            password: None,
            token: None,
            timeout: default_timeout(),
            polling_interval: 0,
            validate_certificates: true,
            retry: RetryOptions::default(),
            discovery: DiscoveryOptions::default(),
            health: HealthOptions::default(),
            headers: BTreeMap::new(),
        }
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_interval: default_initial_interval(),
            max_interval: default_max_interval(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            service_id: default_service_id(),
        }
    }
}

impl Default for HealthOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            time_to_live: default_time_to_live(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_name() -> String {
    "application".to_string()
}

fn default_environment() -> String {
    "Production".to_string()
}

fn default_uri() -> String {
    "http://localhost:8888".to_string()
}

fn default_timeout() -> u64 {
    60_000
}

fn default_initial_interval() -> u64 {
    1_000
}

fn default_max_interval() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    1.1
}

fn default_max_attempts() -> u32 {
    6
}

fn default_service_id() -> String {
    "configserver".to_string()
}

fn default_time_to_live() -> u64 {
    300_000
}
