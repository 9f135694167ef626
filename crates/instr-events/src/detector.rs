//! Polling change detector
//!
//! One dedicated tokio task lists the host's elements on a fixed interval,
//! diffs against the last snapshot and publishes non-empty deltas. A failed
//! listing skips the tick and leaves the known set untouched.

use crate::delta::{DeltaTracker, ElementDelta};
use crate::subscriber::{Publisher, Subscriber, SubscriberId};
use crate::EventsError;
use instr_core::{ElementHandle, HostApi, Registry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Detector configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Polling period
    pub interval_ms: u64,
    /// Hide elements tracked by the session registry from subscribers
    pub ignore_owned: bool,
}

impl DetectorConfig {
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    #[inline]
    #[must_use]
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_ignore_owned(mut self, ignore_owned: bool) -> Self {
        self.ignore_owned = ignore_owned;
        self
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            ignore_owned: true,
        }
    }
}

/// Detector statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub ticks: u64,
    /// Ticks skipped because the host listing failed
    pub skipped_ticks: u64,
    /// Non-empty deltas published
    pub notifications: u64,
    pub subscriber_failures: u64,
}

/// Diffs host snapshots and notifies subscribers
pub struct ChangeDetector {
    host: Arc<dyn HostApi>,
    config: DetectorConfig,
    tracker: DeltaTracker,
    registry: Option<Arc<Registry>>,
    /// Known owned handles, so their removal stays hidden after the registry drops them
    owned_seen: BTreeSet<ElementHandle>,
    publisher: Arc<Publisher>,
    stats: DetectorStats,
}

impl ChangeDetector {
    /// Create a detector whose known set is the host's current element list
    ///
    /// # Errors
    /// `Host` if the initial listing fails
    pub fn new(host: Arc<dyn HostApi>, config: DetectorConfig) -> Result<Self, EventsError> {
        let known = host.list_element_ids()?;
        tracing::debug!("Change detector starts with {} known elements", known.len());
        Ok(Self::with_known(host, config, known))
    }

    /// Create a detector from an explicit starting snapshot
    #[must_use]
    pub fn with_known(
        host: Arc<dyn HostApi>,
        config: DetectorConfig,
        known: BTreeSet<ElementHandle>,
    ) -> Self {
        Self {
            host,
            config,
            tracker: DeltaTracker::with_known(known),
            registry: None,
            owned_seen: BTreeSet::new(),
            publisher: Arc::new(Publisher::new()),
            stats: DetectorStats::default(),
        }
    }

    /// Registry whose handles count as owned when `ignore_owned` is set
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self.absorb_owned();
        self
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.publisher.subscribe(subscriber)
    }

    pub fn subscribe_fn<F>(&self, name: impl Into<String>, callback: F) -> SubscriberId
    where
        F: Fn(&[ElementHandle], &[ElementHandle]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.publisher.subscribe_fn(name, callback)
    }

    /// Shared subscriber list; stays usable after [`ChangeDetector::spawn`]
    #[must_use]
    pub fn publisher(&self) -> Arc<Publisher> {
        self.publisher.clone()
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn known(&self) -> &BTreeSet<ElementHandle> {
        self.tracker.known()
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    /// Run one poll.
    ///
    /// Returns the published delta, or `None` if nothing changed, everything
    /// that changed is owned by this session, or the host listing failed.
    pub fn tick(&mut self) -> Option<ElementDelta> {
        self.stats.ticks += 1;
        let current = match self.host.list_element_ids() {
            Ok(current) => current,
            Err(err) => {
                self.stats.skipped_ticks += 1;
                tracing::warn!("Element listing failed, skipping tick: {err}");
                return None;
            }
        };

        // owned handles already in the known set, e.g. drawn or adopted before the detector started
        self.absorb_owned();
        let mut delta = self.tracker.observe(current)?;
        tracing::debug!(
            "Tick {}: {} added, {} removed",
            self.stats.ticks,
            delta.added.len(),
            delta.removed.len()
        );
        self.hide_owned(&mut delta);
        if delta.is_empty() {
            return None;
        }

        let report = self.publisher.publish(&delta);
        self.stats.notifications += 1;
        self.stats.subscriber_failures += report.failed.len() as u64;
        Some(delta)
    }

    fn absorb_owned(&mut self) {
        if let Some(registry) = &self.registry {
            let known = self.tracker.known();
            self.owned_seen
                .extend(registry.handles().into_iter().filter(|h| known.contains(h)));
        }
    }

    fn hide_owned(&mut self, delta: &mut ElementDelta) {
        if !self.config.ignore_owned {
            return;
        }
        if let Some(registry) = &self.registry {
            for handle in &delta.added {
                if registry.contains(*handle) {
                    self.owned_seen.insert(*handle);
                }
            }
        }
        let owned = &self.owned_seen;
        let registry = self.registry.as_deref();
        delta.added.retain(|h| !owned.contains(h));
        delta
            .removed
            .retain(|h| !owned.contains(h) && !registry.is_some_and(|r| r.contains(*h)));
        self.owned_seen.retain(|h| self.tracker.known().contains(h));
    }

    /// Move the detector onto its own polling task
    #[must_use]
    pub fn spawn(self) -> DetectorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let period = self.config.interval();
        let task = tokio::spawn(async move {
            let mut detector = self;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately; the start snapshot already covers it
            ticker.tick().await;
            tracing::info!("Change detector polling every {period:?}");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        detector.tick();
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!(
                "Change detector stopped after {} ticks",
                detector.stats.ticks
            );
            detector
        });

        DetectorHandle {
            stop: stop_tx,
            task,
        }
    }
}

impl fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("config", &self.config)
            .field("known", &self.tracker.known().len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Running detector task
#[derive(Debug)]
pub struct DetectorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<ChangeDetector>,
}

impl DetectorHandle {
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop polling and take the detector back
    ///
    /// # Errors
    /// `Join` if the polling task panicked
    pub async fn stop(self) -> Result<ChangeDetector, EventsError> {
        // the receiver is gone only if the task already ended
        let _ = self.stop.send(true);
        Ok(self.task.await?)
    }
}
