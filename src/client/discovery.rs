//! Discovery-first resolution of config server base URIs.

use tracing::{debug, warn};

/// Lookup of config server instances in a service registry.
///
/// Implementations are resolved once at startup and handed to the provider;
/// nothing is looked up through globals.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigServerLocator: Send + Sync {
    /// Whether the registry can currently be queried.
    fn is_available(&self) -> bool;

    /// Base URIs of the instances registered under `service_id`.
    fn resolve(&self, service_id: &str) -> Vec<String>;
}

/// Picks the base URIs for one load.
///
/// Falls back to `configured` when discovery is off, the locator is missing
/// or unavailable, or it resolves no instances.
pub fn resolve_base_uris(
    locator: Option<&dyn ConfigServerLocator>,
    discovery_enabled: bool,
    service_id: &str,
    configured: Vec<String>,
) -> Vec<String> {
    if !discovery_enabled {
        return configured;
    }

    let Some(locator) = locator else {
        warn!(service_id, "Discovery enabled but no locator supplied, using configured uri");
        return configured;
    };

    if !locator.is_available() {
        warn!(service_id, "Service registry unavailable, using configured uri");
        return configured;
    }

    let resolved = locator.resolve(service_id);
    if resolved.is_empty() {
        warn!(service_id, "No config server instances registered, using configured uri");
        return configured;
    }

    debug!(service_id, instances = resolved.len(), "Resolved config server instances");
    resolved
}
