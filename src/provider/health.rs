//! Health contributor reporting whether the config server is serving data.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ConfigServerProvider, LastFetch};

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
    Unknown,
}

/// Status plus free-form details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub details: BTreeMap<String, Value>,
}

impl HealthReport {
    fn new(status: HealthStatus) -> Self {
        Self {
            status,
            details: BTreeMap::new(),
        }
    }

    fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Reports on the environment most recently fetched by a provider.
pub struct ConfigServerHealth {
    provider: ConfigServerProvider,
}

impl ConfigServerHealth {
    pub fn new(provider: ConfigServerProvider) -> Self {
        Self { provider }
    }

    /// Builds a report, refetching when the cached environment is older than
    /// `health.timeToLive`. A refetch never touches the store.
    pub async fn check(&self, cancel: &CancellationToken) -> HealthReport {
        let options = self.provider.options();
        if !options.health.enabled {
            return HealthReport::new(HealthStatus::Unknown)
                .with_detail("reason", "health check disabled");
        }
        if !options.enabled {
            return HealthReport::new(HealthStatus::Unknown)
                .with_detail("reason", "config server client disabled");
        }

        let time_to_live = Duration::from_millis(options.health.time_to_live);
        let cached = self
            .provider
            .last_fetch()
            .filter(|fetch| fetch.age() < time_to_live);

        let fetch = match cached {
            Some(fetch) => fetch,
            None => {
                debug!("Refreshing config server health");
                if let Err(e) = self.provider.load_async(false, cancel).await {
                    return HealthReport::new(HealthStatus::Down).with_detail("error", e.to_string());
                }
                match self.provider.last_fetch() {
                    Some(fetch) => fetch,
                    None => return HealthReport::new(HealthStatus::Unknown),
                }
            }
        };

        report(&fetch)
    }
}

fn report(fetch: &LastFetch) -> HealthReport {
    match &fetch.environment {
        Some(environment) if !environment.property_sources.is_empty() => {
            HealthReport::new(HealthStatus::Up)
                .with_detail("propertySources", environment.source_names())
                .with_detail("lastFetched", fetch.fetched_at.to_rfc3339())
        }
        _ => HealthReport::new(HealthStatus::Down)
            .with_detail("reason", "no property sources located")
            .with_detail("lastFetched", fetch.fetched_at.to_rfc3339()),
    }
}
