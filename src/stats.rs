//! Periodic polling of the stats endpoint.
//!
//! The poller fetches immediately, then once per interval, and publishes the
//! result through a `watch` channel. A failed poll is logged and the last
//! published state stays in place; the next tick is the only retry.
//!
//! ```rust,ignore
//! let api = ApiClient::new(&config);
//! let (handle, mut stats_rx) = StatsPoller::builder(api)
//!     .poll_interval(Duration::from_secs(5))
//!     .spawn();
//! // ... later, when the view goes away:
//! handle.stop();
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::api::ApiClient;
use crate::error::ModchatError;
use crate::protocol::SessionStats;

/// Consecutive failures after which poll errors are logged at error level.
const LOUD_FAILURE_THRESHOLD: u32 = 5;

/// Anything that can produce a stats snapshot.
pub trait StatsSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<SessionStats, ModchatError>> + Send;
}

impl StatsSource for ApiClient {
    fn fetch(&self) -> impl Future<Output = Result<SessionStats, ModchatError>> + Send {
        self.fetch_stats()
    }
}

/// What the stats panel currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsState {
    /// No poll has completed yet.
    Loading,
    Loaded(SessionStats),
    /// The first poll failed and nothing was ever loaded.
    Unavailable,
}

impl StatsState {
    pub fn stats(&self) -> Option<&SessionStats> {
        match self {
            StatsState::Loaded(stats) => Some(stats),
            _ => None,
        }
    }

    /// State after a poll. Success replaces wholesale; failure keeps any
    /// previously loaded value.
    pub fn after_poll(&self, result: Result<SessionStats, &ModchatError>) -> StatsState {
        match (result, self) {
            (Ok(stats), _) => StatsState::Loaded(stats),
            (Err(_), StatsState::Loaded(prev)) => StatsState::Loaded(prev.clone()),
            (Err(_), _) => StatsState::Unavailable,
        }
    }
}

/// Handle to a running poller. Dropping it does not stop the task; call
/// [`StatsHandle::stop`].
#[derive(Debug)]
pub struct StatsHandle {
    task: JoinHandle<()>,
}

impl StatsHandle {
    /// Stop polling. An in-flight request is cancelled and its response is
    /// never published.
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Polls a [`StatsSource`] at a fixed interval.
pub struct StatsPoller<S: StatsSource> {
    source: S,
    poll_interval: Duration,
}

impl<S: StatsSource> StatsPoller<S> {
    pub fn builder(source: S) -> StatsPollerBuilder<S> {
        StatsPollerBuilder {
            source,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run until every receiver of `tx` is dropped.
    ///
    /// # Panics
    /// This function never panics.
    pub async fn run(self, tx: watch::Sender<StatsState>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut consecutive_failures: u32 = 0;

        loop {
            ticker.tick().await;

            let result = self.source.fetch().await;

            // The view may have gone away while the request was in flight.
            if tx.is_closed() {
                debug!("stats view torn down, stopping poller");
                return;
            }

            match &result {
                Ok(_) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    if consecutive_failures >= LOUD_FAILURE_THRESHOLD {
                        error!(
                            error = %e,
                            consecutive_failures,
                            "stats poll failed repeatedly, will retry next tick"
                        );
                    } else {
                        warn!(error = %e, "stats poll failed, will retry next tick");
                    }
                }
            }

            let next = tx.borrow().after_poll(result.as_ref().cloned());
            tx.send_replace(next);
        }
    }
}

pub struct StatsPollerBuilder<S: StatsSource> {
    source: S,
    poll_interval: Duration,
}

impl<S: StatsSource> StatsPollerBuilder<S> {
    /// Override the polling interval (default 5 s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn build(self) -> StatsPoller<S> {
        StatsPoller {
            source: self.source,
            poll_interval: self.poll_interval,
        }
    }

    /// Build and spawn onto the current runtime. Returns the stop handle and a
    /// receiver that starts at [`StatsState::Loading`].
    pub fn spawn(self) -> (StatsHandle, watch::Receiver<StatsState>) {
        let (tx, rx) = watch::channel(StatsState::Loading);
        let poller = self.build();
        let task = tokio::spawn(poller.run(tx));
        (StatsHandle { task }, rx)
    }
}

/// Top `n` entries of a label → count map, largest count first. Ties keep
/// label order.
pub fn top_entries(map: &std::collections::BTreeMap<String, u64>, n: usize) -> Vec<(&str, u64)> {
    let mut entries: Vec<(&str, u64)> = map.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.truncate(n);
    entries
}
