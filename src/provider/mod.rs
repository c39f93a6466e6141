//! Configuration provider backed by a config server.
//!
//! A [`ConfigServerProvider`] owns the HTTP client, the store and the load
//! lock. Loads run one at a time; readers of the store never wait for them.

pub mod health;
pub mod poller;

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::discovery::resolve_base_uris;
use crate::client::{
    ConfigServerHttp, ConfigServerLocator, Credentials, FailoverWalker, RemoteEnvironment,
    RetryPolicy, WalkOutcome,
};
use crate::config::surface::to_pairs;
use crate::config::ClientOptions;
use crate::error::ConfigServerError;
use crate::metrics::ClientMetrics;
use crate::store::{ChangeToken, ConfigurationStore, Snapshot, SnapshotBuilder};

pub use health::{ConfigServerHealth, HealthReport, HealthStatus};
pub use poller::PollerState;

use poller::Poller;

/// Read side of a configuration source plus its reload hook.
pub trait ConfigurationProvider: Send + Sync {
    /// Looks up one key. Keys compare case-insensitively.
    fn try_get(&self, key: &str) -> Option<String>;

    /// Immediate child segments below `parent` (`None` for the root).
    fn child_keys(&self, parent: Option<&str>) -> Vec<String>;

    /// Reloads the source, blocking the caller.
    fn load(&self) -> Result<(), ConfigServerError>;

    /// Token that fires when the current data is replaced.
    fn reload_token(&self) -> Arc<ChangeToken>;
}

/// Outcome of the most recent completed walk.
#[derive(Debug, Clone)]
pub struct LastFetch {
    /// The environment, or `None` when nothing was located.
    pub environment: Option<RemoteEnvironment>,
    /// Wall-clock time of the fetch.
    pub fetched_at: DateTime<Utc>,
    at: Instant,
}

impl LastFetch {
    fn new(environment: Option<RemoteEnvironment>) -> Self {
        Self {
            environment,
            fetched_at: Utc::now(),
            at: Instant::now(),
        }
    }

    /// Time since the fetch.
    pub fn age(&self) -> std::time::Duration {
        self.at.elapsed()
    }
}

/// Cheap-to-clone handle to a config server provider.
#[derive(Clone)]
pub struct ConfigServerProvider {
    inner: Arc<ProviderInner>,
}

pub(crate) struct ProviderInner {
    options: ClientOptions,
    http: ConfigServerHttp,
    store: ConfigurationStore,
    load_lock: tokio::sync::Mutex<()>,
    locator: Option<Arc<dyn ConfigServerLocator>>,
    metrics: ClientMetrics,
    last_fetch: Mutex<Option<LastFetch>>,
    lifetime: CancellationToken,
    poller: OnceLock<Poller>,
}

impl ConfigServerProvider {
    /// Creates a provider. The store starts out holding the client options.
    pub fn new(options: ClientOptions) -> Result<Self, ConfigServerError> {
        Self::build(options, None)
    }

    /// Creates a provider that resolves base URIs through `locator` when
    /// discovery is enabled.
    pub fn with_locator(
        options: ClientOptions,
        locator: Arc<dyn ConfigServerLocator>,
    ) -> Result<Self, ConfigServerError> {
        Self::build(options, Some(locator))
    }

    fn build(
        options: ClientOptions,
        locator: Option<Arc<dyn ConfigServerLocator>>,
    ) -> Result<Self, ConfigServerError> {
        let http = ConfigServerHttp::new(&options)?;
        let metrics = ClientMetrics::new()?;

        let initial = SnapshotBuilder::new().set_all(to_pairs(&options)).build();
        metrics.set_key_count(initial.len());

        Ok(Self {
            inner: Arc::new(ProviderInner {
                options,
                http,
                store: ConfigurationStore::new(initial),
                load_lock: tokio::sync::Mutex::new(()),
                locator,
                metrics,
                last_fetch: Mutex::new(None),
                lifetime: CancellationToken::new(),
                poller: OnceLock::new(),
            }),
        })
    }

    /// The options this provider was built from.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Metrics recorded by this provider.
    pub fn metrics(&self) -> &ClientMetrics {
        &self.inner.metrics
    }

    /// The current snapshot. Holding it pins that version.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.store.snapshot()
    }

    /// Looks up one key in the current snapshot.
    pub fn try_get(&self, key: &str) -> Option<String> {
        self.inner.store.try_get(key)
    }

    /// Immediate child segments below `parent` in the current snapshot.
    pub fn child_keys(&self, parent: Option<&str>) -> Vec<String> {
        self.inner.store.child_keys(parent)
    }

    /// Token that fires when the current snapshot is replaced.
    pub fn reload_token(&self) -> Arc<ChangeToken> {
        self.inner.store.reload_token()
    }

    /// The most recent completed walk, if any.
    pub fn last_fetch(&self) -> Option<LastFetch> {
        self.inner.last_fetch()
    }

    /// Writes the client options into the store under `spring:cloud:config`.
    pub fn add_client_options(&self) {
        let pairs = to_pairs(&self.inner.options);
        let diff = self.inner.store.update(|current| {
            SnapshotBuilder::new()
                .set_all(current.iter().map(|(k, v)| (k.to_string(), v.to_string())))
                .set_all(pairs)
                .loaded_at(current.loaded_at())
                .build()
        });
        if !diff.is_empty() {
            self.inner.metrics.set_key_count(self.inner.store.snapshot().len());
        }
    }

    /// Fetches the remote environment.
    ///
    /// With `update_existing` the store is replaced by the fetched
    /// environment plus the client options; otherwise the store is left alone
    /// and only the environment is returned. Returns `Ok(None)` when the
    /// client is disabled or nothing was located without fail-fast.
    pub async fn load_async(
        &self,
        update_existing: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<RemoteEnvironment>, ConfigServerError> {
        if !self.inner.options.enabled {
            debug!("Config server client disabled, skipping load");
            return Ok(None);
        }

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConfigServerError::Cancelled),
            guard = self.inner.load_lock.lock() => guard,
        };

        self.inner.load_locked(update_existing, cancel).await
    }

    /// Blocking load that replaces the store.
    ///
    /// Inside a multi-threaded runtime the current worker is handed off while
    /// the load runs. On a current-thread runtime the load runs on a scoped
    /// thread with its own runtime. Outside any runtime a temporary one is
    /// built.
    ///
    /// A current-thread runtime is parked while `load` blocks, so a load
    /// already holding the lock there could never finish. In that case
    /// `BlockingLoadUnsupported` is returned instead of waiting.
    pub fn load(&self) -> Result<(), ConfigServerError> {
        let cancel = CancellationToken::new();

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.load_async(true, &cancel)))?;
            }
            Ok(_) => {
                if !self.inner.options.enabled {
                    debug!("Config server client disabled, skipping load");
                    return Ok(());
                }
                let _guard = self
                    .inner
                    .load_lock
                    .try_lock()
                    .map_err(|_| ConfigServerError::BlockingLoadUnsupported)?;

                let result = std::thread::scope(|scope| {
                    scope
                        .spawn(|| {
                            build_blocking_runtime()?.block_on(self.inner.load_locked(true, &cancel))
                        })
                        .join()
                });
                match result {
                    Ok(loaded) => {
                        loaded?;
                    }
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Err(_) => {
                build_blocking_runtime()?.block_on(self.load_async(true, &cancel))?;
            }
        }

        Ok(())
    }

    /// Performs the initial load and starts polling when configured.
    ///
    /// A fail-fast error from the initial load is returned and polling is not
    /// started.
    pub async fn attach(&self) -> Result<(), ConfigServerError> {
        let cancel = self.inner.lifetime.child_token();
        self.load_async(true, &cancel).await?;
        self.start_polling();
        Ok(())
    }

    /// Starts the background poller.
    ///
    /// Returns false when polling is disabled, already started or stopped.
    pub fn start_polling(&self) -> bool {
        let Some(interval) = self.inner.options.polling_interval_duration() else {
            return false;
        };
        if !self.inner.options.enabled || self.inner.lifetime.is_cancelled() {
            return false;
        }
        if self.inner.poller.get().is_some() {
            return false;
        }
        if Handle::try_current().is_err() {
            warn!("Polling requires a tokio runtime, not started");
            return false;
        }

        let poller = Poller::spawn(
            Arc::downgrade(&self.inner),
            interval,
            self.inner.lifetime.child_token(),
        );

        match self.inner.poller.set(poller) {
            Ok(()) => {
                info!(interval_ms = interval.as_millis() as u64, "Started config server polling");
                true
            }
            Err(redundant) => {
                redundant.cancel();
                false
            }
        }
    }

    /// State of the background poller.
    pub fn poller_state(&self) -> PollerState {
        match self.inner.poller.get() {
            Some(poller) if poller.is_cancelled() => PollerState::Stopped,
            Some(_) => PollerState::Running,
            None if self.inner.lifetime.is_cancelled() => PollerState::Stopped,
            None => PollerState::NotStarted,
        }
    }

    /// Stops polling and waits for an in-flight tick to finish.
    pub async fn stop(&self) {
        self.inner.lifetime.cancel();
        if let Some(poller) = self.inner.poller.get() {
            poller.join().await;
        }
    }
}

impl ConfigurationProvider for ConfigServerProvider {
    fn try_get(&self, key: &str) -> Option<String> {
        ConfigServerProvider::try_get(self, key)
    }

    fn child_keys(&self, parent: Option<&str>) -> Vec<String> {
        ConfigServerProvider::child_keys(self, parent)
    }

    fn load(&self) -> Result<(), ConfigServerError> {
        ConfigServerProvider::load(self)
    }

    fn reload_token(&self) -> Arc<ChangeToken> {
        ConfigServerProvider::reload_token(self)
    }
}

impl std::fmt::Debug for ConfigServerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigServerProvider")
            .field("name", &self.inner.options.name)
            .field("env", &self.inner.options.env)
            .field("uri", &self.inner.options.uri)
            .field("keys", &self.inner.store.snapshot().len())
            .finish()
    }
}

impl ProviderInner {
    fn last_fetch(&self) -> Option<LastFetch> {
        self.last_fetch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_last_fetch(&self, environment: Option<RemoteEnvironment>) {
        *self
            .last_fetch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(LastFetch::new(environment));
    }

    fn credentials(&self) -> Option<Credentials> {
        self.options.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.options.password.clone(),
        })
    }

    /// Runs one load. The caller holds the load lock.
    async fn load_locked(
        &self,
        update_existing: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<RemoteEnvironment>, ConfigServerError> {
        let options = &self.options;
        let base_uris = resolve_base_uris(
            self.locator.as_deref(),
            options.discovery.enabled,
            &options.discovery.service_id,
            options.uris(),
        );
        let labels = options.labels();

        let walker = FailoverWalker::new(&self.http, &options.name, &options.env, self.credentials())
            .with_metrics(&self.metrics);
        let policy = RetryPolicy::new(&options.retry, options.fail_fast).with_metrics(&self.metrics);

        let walker = &walker;
        let base_uris = base_uris.as_slice();
        let labels = labels.as_slice();
        let located = policy
            .run(move |_| walker.try_all(base_uris, labels, cancel), cancel)
            .await;

        let environment = match located {
            Ok(WalkOutcome::Found(environment)) => environment,
            Ok(WalkOutcome::NoContent) => {
                self.set_last_fetch(None);
                if options.fail_fast {
                    self.metrics.record_load("failed");
                    return Err(ConfigServerError::NotLocated {
                        name: options.name.clone(),
                        profile: options.env.clone(),
                    });
                }
                self.metrics.record_load("empty");
                warn!(name = %options.name, env = %options.env, "No configuration located");
                return Ok(None);
            }
            Ok(WalkOutcome::Exhausted(failures)) => {
                self.set_last_fetch(None);
                self.metrics.record_load("failed");
                warn!(
                    name = %options.name,
                    env = %options.env,
                    failures = failures.len(),
                    "Configuration load failed, keeping current configuration"
                );
                return Ok(None);
            }
            Err(e) if e.is_cancelled() => {
                self.metrics.record_load("cancelled");
                return Err(e);
            }
            Err(e) => {
                self.metrics.record_load("failed");
                error!(name = %options.name, env = %options.env, error = %e, "Configuration load failed");
                return Err(e);
            }
        };

        self.set_last_fetch(Some(environment.clone()));

        if update_existing {
            let next = SnapshotBuilder::new()
                .merge_environment(&environment)
                .set_all(to_pairs(options))
                .build();
            let key_count = next.len();
            let diff = self.store.replace(next);

            if diff.is_empty() {
                debug!("Configuration unchanged");
            } else {
                self.metrics.record_reload(key_count);
                info!(
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    changed = diff.changed.len(),
                    "Configuration reloaded"
                );
            }
        }

        self.metrics.record_load("ok");
        Ok(Some(environment))
    }
}

impl Drop for ProviderInner {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

fn build_blocking_runtime() -> Result<tokio::runtime::Runtime, ConfigServerError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
