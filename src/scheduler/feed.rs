//! Per-feed polling loop
//!
//! A [`FeedScheduler`] owns one feed's fetch, classify, detect and reconcile
//! cycle. The fingerprint of the last propagated state advances only after a
//! significant snapshot has been reconciled, so a failed fetch, a failed
//! classification or an unreachable store leaves the next pass free to
//! retry the same change. Manual triggers share the fetch and classify
//! path but take none of the scheduled pass's locks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::MissedTickBehavior;

use super::change::{ChangeDetector, LastObserved};
use super::error::{SchedulerError, SchedulerResult};
use crate::feeds::Feed;
use crate::localization::LocalizationResolver;
use crate::metrics;
use crate::models::{FeedKind, ReconcileReport};
use crate::notifications::Reconciler;
use crate::storage::SharedSubscriptionStore;
use crate::worldstate::SnapshotSource;

/// What one scheduled pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The snapshot could not be retrieved
    FetchFailed(String),
    /// The snapshot had nothing classifiable
    ClassifyFailed(String),
    /// Subscriptions could not be listed
    StoreFailed(String),
    /// Nothing significant since the last propagation
    Unchanged,
    /// Entities were reconciled against every subscription
    Propagated(ReconcileReport),
}

impl PassOutcome {
    /// Label used in metrics and status output
    pub fn label(&self) -> &'static str {
        match self {
            Self::FetchFailed(_) => "fetch_failed",
            Self::ClassifyFailed(_) => "classify_failed",
            Self::StoreFailed(_) => "store_failed",
            Self::Unchanged => "unchanged",
            Self::Propagated(_) => "propagated",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed(_) | Self::ClassifyFailed(_) | Self::StoreFailed(_)
        )
    }

    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            Self::Propagated(report) => Some(report),
            _ => None,
        }
    }
}

/// Observable state of one feed's scheduler
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub feed: FeedKind,
    pub interval_secs: u64,
    pub running: bool,
    pub passes: u64,
    pub consecutive_failures: u32,
    pub last_pass_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
    pub last_significant_at: Option<DateTime<Utc>>,
    pub last_report: Option<ReconcileReport>,
    pub tracked_entities: usize,
}

impl SchedulerStatus {
    fn new(feed: FeedKind, interval: Duration) -> Self {
        Self {
            feed,
            interval_secs: interval.as_secs(),
            running: false,
            passes: 0,
            consecutive_failures: 0,
            last_pass_at: None,
            last_outcome: None,
            last_significant_at: None,
            last_report: None,
            tracked_entities: 0,
        }
    }
}

/// Scheduler for a single feed
pub struct FeedScheduler<F: Feed> {
    feed: F,
    source: Arc<dyn SnapshotSource>,
    resolver: Arc<LocalizationResolver>,
    store: SharedSubscriptionStore,
    reconciler: Reconciler,
    interval: Duration,

    /// Last propagated state
    last: Mutex<Option<LastObserved>>,

    /// Held for a whole scheduled pass; manual triggers never take it
    pass: Mutex<()>,

    status: RwLock<SchedulerStatus>,

    shutdown: watch::Sender<bool>,
}

impl<F: Feed> FeedScheduler<F> {
    pub fn new(
        feed: F,
        source: Arc<dyn SnapshotSource>,
        resolver: Arc<LocalizationResolver>,
        store: SharedSubscriptionStore,
        reconciler: Reconciler,
        interval: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let status = SchedulerStatus::new(feed.kind(), interval);

        Self {
            feed,
            source,
            resolver,
            store,
            reconciler,
            interval,
            last: Mutex::new(None),
            pass: Mutex::new(()),
            status: RwLock::new(status),
            shutdown,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.feed.kind()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until [`stop`](Self::stop) is called; the first pass runs immediately
    pub async fn run(&self) {
        let kind = self.kind();
        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow() {
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.status.write().await.running = true;
        tracing::info!(
            feed = kind.as_str(),
            source = %self.source.describe(),
            interval_secs = self.interval.as_secs(),
            "Feed scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    self.run_scheduled_pass().await;
                }
            }
        }

        self.status.write().await.running = false;
        tracing::info!(feed = kind.as_str(), "Feed scheduler stopped");
    }

    /// Signal the polling loop to exit after the pass in flight
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Replace the last propagated state
    pub async fn seed_last_observed(&self, observed: Option<LastObserved>) {
        *self.last.lock().await = observed;
    }

    pub async fn last_observed(&self) -> Option<LastObserved> {
        self.last.lock().await.clone()
    }

    pub async fn run_scheduled_pass(&self) -> PassOutcome {
        self.run_scheduled_pass_at(Utc::now()).await
    }

    /// Run one scheduled pass as of `now`
    pub async fn run_scheduled_pass_at(&self, now: DateTime<Utc>) -> PassOutcome {
        let kind = self.kind();
        let started = Instant::now();

        let _pass = self.pass.lock().await;
        let outcome = self.scheduled_pass(now).await;
        let tracked = self.last.lock().await.as_ref().map_or(0, LastObserved::len);

        metrics::record_pass(kind, outcome.label(), started.elapsed().as_secs_f64());
        self.record_status(&outcome, tracked, now).await;

        outcome
    }

    async fn scheduled_pass(&self, now: DateTime<Utc>) -> PassOutcome {
        let kind = self.kind();

        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                metrics::record_fetch_error(kind);
                tracing::warn!(
                    feed = kind.as_str(),
                    recoverable = e.is_recoverable(),
                    error = %e,
                    "Snapshot fetch failed, retrying next tick"
                );
                return PassOutcome::FetchFailed(e.to_string());
            }
        };

        let entities = match self.feed.classify(&snapshot, &self.resolver, now) {
            Ok(entities) => entities,
            Err(e) => {
                tracing::warn!(feed = kind.as_str(), error = %e, "Snapshot not classifiable, fingerprint held");
                return PassOutcome::ClassifyFailed(e.to_string());
            }
        };

        let changes = ChangeDetector::detect(&entities, self.last.lock().await.as_ref());
        if !changes.is_significant() {
            tracing::debug!(feed = kind.as_str(), entities = entities.len(), "No significant change");
            return PassOutcome::Unchanged;
        }

        metrics::record_significant_change(kind, now);
        tracing::info!(
            feed = kind.as_str(),
            baseline = changes.baseline,
            changed = changes.changed.len(),
            became_active = changes.became_active.len(),
            removed = changes.removed.len(),
            "Significant change detected"
        );

        let subscriptions = match self.store.list_all(kind) {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(feed = kind.as_str(), error = %e, "Cannot list subscriptions, fingerprint held");
                return PassOutcome::StoreFailed(format!("{e:#}"));
            }
        };

        let report = self
            .reconciler
            .reconcile(&self.feed, &entities, subscriptions, Some(&changes), now)
            .await;

        *self.last.lock().await = Some(LastObserved::from_entities(&entities));

        metrics::record_report(kind, &report);
        tracing::info!(feed = kind.as_str(), report = %report, "Reconciliation finished");

        PassOutcome::Propagated(report)
    }

    pub async fn trigger_manual(&self, community_id: &str) -> SchedulerResult<ReconcileReport> {
        self.trigger_manual_at(community_id, Utc::now()).await
    }

    /// Re-deliver the current state to one community
    ///
    /// Never pings and never touches the propagated fingerprint. Runs
    /// alongside any scheduled pass in flight.
    pub async fn trigger_manual_at(
        &self,
        community_id: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<ReconcileReport> {
        let feed = self.kind();
        if self.is_stopped() {
            return Err(SchedulerError::Stopped { feed });
        }

        let snapshot = self.source.fetch().await.map_err(|e| {
            metrics::record_fetch_error(feed);
            SchedulerError::FetchFailed {
                feed,
                reason: e.to_string(),
            }
        })?;

        let entities = self
            .feed
            .classify(&snapshot, &self.resolver, now)
            .map_err(|e| SchedulerError::ClassifyFailed {
                feed,
                reason: e.to_string(),
            })?;

        let subscriptions = self
            .store
            .list_by_community(feed, community_id)
            .map_err(|e| SchedulerError::store("list_by_community", format!("{e:#}")))?;

        let report = self
            .reconciler
            .reconcile(&self.feed, &entities, subscriptions, None, now)
            .await;

        metrics::record_report(feed, &report);
        tracing::info!(
            feed = feed.as_str(),
            community_id = community_id,
            report = %report,
            "Manual reconciliation finished"
        );

        Ok(report)
    }

    async fn record_status(&self, outcome: &PassOutcome, tracked: usize, now: DateTime<Utc>) {
        let mut status = self.status.write().await;
        status.passes += 1;
        status.last_pass_at = Some(now);
        status.last_outcome = Some(outcome.label().to_string());
        status.tracked_entities = tracked;

        if outcome.is_failure() {
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        } else {
            status.consecutive_failures = 0;
        }

        if let PassOutcome::Propagated(report) = outcome {
            status.last_significant_at = Some(now);
            status.last_report = Some(report.clone());
        }
    }
}
