//! Background polling of the config server.

use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ProviderInner;

/// Lifecycle of a provider's poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Polling was never started.
    NotStarted,
    /// Ticks are being scheduled.
    Running,
    /// Stopped; no further ticks run.
    Stopped,
}

/// A running poll loop and the token that stops it.
pub(crate) struct Poller {
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    /// Spawns the poll loop. The first tick fires one `interval` from now.
    ///
    /// The loop holds only a weak reference, so dropping the last provider
    /// handle ends it.
    pub(crate) fn spawn(
        provider: Weak<ProviderInner>,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(run(provider, interval, token.clone()));

        Self {
            token,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels the loop and waits for it to finish its current tick.
    pub(crate) async fn join(&self) {
        self.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Config server poller ended abnormally");
            }
        }
    }
}

async fn run(provider: Weak<ProviderInner>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(inner) = provider.upgrade() else {
            break;
        };
        tick(&inner, &token).await;
    }

    info!("Config server polling stopped");
}

/// One poll. A stop request only interrupts the wait for the load lock; once
/// the load has started it runs to completion.
async fn tick(inner: &ProviderInner, token: &CancellationToken) {
    let _guard = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        guard = inner.load_lock.lock() => guard,
    };

    debug!("Polling config server");
    if let Err(e) = inner.load_locked(true, &CancellationToken::new()).await {
        warn!(error = %e, "Polled configuration load failed");
    }
}
