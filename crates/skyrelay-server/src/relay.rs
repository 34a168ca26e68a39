use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use skyrelay_feed::StateFeed;
use skyrelay_state::StateStore;
use skyrelay_types::RelayError;

use crate::broadcaster::Broadcaster;
use crate::builder::{build_messages, render_messages, Watermark};

/// How often the keep-alive timer checks whether a re-broadcast is due.
const TICKLE_CHECK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Pause between the end of one poll and the start of the next.
    pub poll_interval: Duration,
    /// Re-send full state when nothing was broadcast for this long.
    /// `Duration::ZERO` disables the keep-alive.
    pub tickle_interval: Duration,
}

/// Ties a feed, the state store and the broadcaster together.
///
/// The poll loop is the only writer to the store. The tickle loop only
/// snapshots and re-broadcasts; the two meet nowhere except the store and
/// [`Broadcaster::broadcast`].
pub struct Relay<F> {
    feed: F,
    store: StateStore,
    broadcaster: Arc<Broadcaster>,
    config: RelayConfig,
}

impl<F: StateFeed> Relay<F> {
    pub fn new(feed: F, broadcaster: Arc<Broadcaster>, config: RelayConfig) -> Self {
        Relay {
            feed,
            store: StateStore::new(),
            broadcaster,
            config,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// One poll cycle: fetch, apply, and broadcast whatever changed.
    /// Returns the number of aircraft in the batch.
    ///
    /// A failed fetch leaves the store untouched.
    pub async fn poll_once(&self) -> Result<usize, RelayError> {
        let version_before = self.store.current_version().await;
        let snapshot = self.feed.fetch().await?;
        self.store.apply_batch(&snapshot.samples).await;

        let records = self.store.snapshot().await;
        let messages = build_messages(&records, Watermark::Incremental(version_before), Local::now());
        let clients = self.broadcaster.broadcast(render_messages(&messages));
        tracing::debug!(aircraft = records.len(), clients, "poll broadcast");
        Ok(records.len())
    }

    /// Re-send every known value without fetching.
    pub async fn tickle_once(&self) -> usize {
        // Not ordered against the poll loop: a delta broadcast between this
        // snapshot and the broadcast below is followed by this older state.
        // The next tickle, or the next change to those fields, corrects it.
        let records = self.store.snapshot().await;
        let messages = build_messages(&records, Watermark::FullState, Local::now());
        let clients = self.broadcaster.broadcast(render_messages(&messages));
        tracing::debug!(aircraft = records.len(), clients, "tickle broadcast");
        records.len()
    }

    fn tickle_due(&self) -> bool {
        match self.broadcaster.last_broadcast() {
            Some(last) => last.elapsed() > self.config.tickle_interval,
            None => false,
        }
    }

    /// Poll immediately, then again `poll_interval` after each poll ends.
    /// Errors are logged and the next poll goes ahead regardless.
    pub async fn run_polls(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            if let Err(e) = self.poll_once().await {
                tracing::warn!(error = %e, "poll failed");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        tracing::debug!("poll loop stopped");
    }

    pub async fn run_tickles(self: Arc<Self>, shutdown: CancellationToken) {
        if self.config.tickle_interval.is_zero() {
            return;
        }
        let mut ticker = tokio::time::interval(TICKLE_CHECK_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.tickle_due() {
                self.tickle_once().await;
            }
        }
        tracing::debug!("tickle loop stopped");
    }

    /// Spawn both loops. They stop rearming once `shutdown` is cancelled.
    pub fn start(self: Arc<Self>, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().run_polls(shutdown.clone())),
            tokio::spawn(self.run_tickles(shutdown.clone())),
        ]
    }
}
