//! Engine wiring every enabled feed together
//!
//! Each feed gets its own [`FeedScheduler`] task. The engine only knows them
//! through the object-safe [`FeedRunner`] trait, so feeds with different
//! attribute types sit in one map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::error::{SchedulerError, SchedulerResult};
use super::feed::{FeedScheduler, PassOutcome, SchedulerStatus};
use crate::config::Config;
use crate::error::Result;
use crate::feeds::{ArbitrationFeed, Feed, FissureFeed, TraderFeed};
use crate::localization::LocalizationResolver;
use crate::models::{FeedKind, ReconcileReport};
use crate::notifications::channels::DiscordTarget;
use crate::notifications::{DeliveryTarget, PingJanitor, Reconciler, ReconcilerConfig};
use crate::storage::{create_sqlite_store, SharedSubscriptionStore};
use crate::worldstate::{SnapshotSource, WorldStateFetcher};

/// Type-erased handle on one feed's scheduler
#[async_trait]
pub trait FeedRunner: Send + Sync {
    fn kind(&self) -> FeedKind;

    /// Run one scheduled pass right now
    async fn run_pass(&self) -> PassOutcome;

    async fn trigger_manual(&self, community_id: &str) -> SchedulerResult<ReconcileReport>;

    async fn status(&self) -> SchedulerStatus;

    fn stop(&self);

    /// Spawn the polling loop
    fn spawn(self: Arc<Self>) -> JoinHandle<()>;
}

#[async_trait]
impl<F: Feed> FeedRunner for FeedScheduler<F> {
    fn kind(&self) -> FeedKind {
        FeedScheduler::kind(self)
    }

    async fn run_pass(&self) -> PassOutcome {
        self.run_scheduled_pass().await
    }

    async fn trigger_manual(&self, community_id: &str) -> SchedulerResult<ReconcileReport> {
        FeedScheduler::trigger_manual(self, community_id).await
    }

    async fn status(&self) -> SchedulerStatus {
        FeedScheduler::status(self).await
    }

    fn stop(&self) {
        FeedScheduler::stop(self)
    }

    fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}

/// The running relay: one scheduler per enabled feed
pub struct Engine {
    runners: HashMap<FeedKind, Arc<dyn FeedRunner>>,
    store: SharedSubscriptionStore,
    janitor: Arc<PingJanitor>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Build the production engine
    ///
    /// Fails fast when lookup tables, the store or the delivery target are
    /// unusable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let resolver = Arc::new(LocalizationResolver::load(&config.localization)?);
        let (locations, names) = resolver.len();
        tracing::info!(locations = locations, names = names, "Lookup tables loaded");

        let store = create_sqlite_store(&config.storage.sqlite_path)?;
        let target: Arc<dyn DeliveryTarget> = Arc::new(DiscordTarget::from_config(&config.delivery)?);

        let timeout = config.fetch_timeout();
        let user_agent = config.worldstate.user_agent.as_str();
        let worldstate: Arc<dyn SnapshotSource> = Arc::new(WorldStateFetcher::with_timeout(
            &config.worldstate.url,
            user_agent,
            timeout,
        )?);
        let arbitration: Arc<dyn SnapshotSource> = Arc::new(WorldStateFetcher::with_timeout(
            &config.worldstate.arbitration_url,
            user_agent,
            timeout,
        )?);

        Ok(Self::assemble(config, resolver, store, target, |kind| match kind {
            FeedKind::Arbitration => Arc::clone(&arbitration),
            FeedKind::Fissures | FeedKind::Trader => Arc::clone(&worldstate),
        }))
    }

    /// Build an engine from ready-made components
    ///
    /// `source_for` picks the snapshot source of each enabled feed.
    pub fn assemble(
        config: &Config,
        resolver: Arc<LocalizationResolver>,
        store: SharedSubscriptionStore,
        target: Arc<dyn DeliveryTarget>,
        source_for: impl Fn(FeedKind) -> Arc<dyn SnapshotSource>,
    ) -> Self {
        let janitor = Arc::new(PingJanitor::new(Arc::clone(&target)));
        let reconciler = Reconciler::new(
            target,
            Arc::clone(&store),
            Arc::clone(&janitor),
            ReconcilerConfig::from_config(config),
        );

        let mut runners: HashMap<FeedKind, Arc<dyn FeedRunner>> = HashMap::new();
        for kind in config.feeds.enabled() {
            let interval = config.feeds.schedule(kind).interval();
            let source = source_for(kind);
            let resolver = Arc::clone(&resolver);
            let store = Arc::clone(&store);
            let reconciler = reconciler.clone();

            let runner: Arc<dyn FeedRunner> = match kind {
                FeedKind::Fissures => Arc::new(FeedScheduler::new(
                    FissureFeed, source, resolver, store, reconciler, interval,
                )),
                FeedKind::Trader => Arc::new(FeedScheduler::new(
                    TraderFeed, source, resolver, store, reconciler, interval,
                )),
                FeedKind::Arbitration => Arc::new(FeedScheduler::new(
                    ArbitrationFeed, source, resolver, store, reconciler, interval,
                )),
            };
            runners.insert(kind, runner);
        }

        Self {
            runners,
            store,
            janitor,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Enabled feeds, in start-up order
    pub fn feeds(&self) -> Vec<FeedKind> {
        FeedKind::ALL
            .into_iter()
            .filter(|kind| self.runners.contains_key(kind))
            .collect()
    }

    pub fn store(&self) -> &SharedSubscriptionStore {
        &self.store
    }

    pub fn janitor(&self) -> &Arc<PingJanitor> {
        &self.janitor
    }

    fn runner(&self, feed: FeedKind) -> SchedulerResult<&Arc<dyn FeedRunner>> {
        self.runners
            .get(&feed)
            .ok_or(SchedulerError::FeedDisabled { feed })
    }

    /// Run one scheduled pass of a feed immediately
    pub async fn run_pass(&self, feed: FeedKind) -> SchedulerResult<PassOutcome> {
        Ok(self.runner(feed)?.run_pass().await)
    }

    /// Re-deliver a feed's current state to one community
    pub async fn trigger_manual_reconcile(
        &self,
        feed: &str,
        community_id: &str,
    ) -> Result<ReconcileReport> {
        let kind: FeedKind = feed
            .parse()
            .map_err(|_| SchedulerError::unknown_feed(feed))?;

        let report = self.runner(kind)?.trigger_manual(community_id).await?;
        Ok(report)
    }

    /// Status of every enabled feed
    pub async fn statuses(&self) -> Vec<SchedulerStatus> {
        let mut statuses = Vec::with_capacity(self.runners.len());
        for kind in self.feeds() {
            if let Some(runner) = self.runners.get(&kind) {
                statuses.push(runner.status().await);
            }
        }
        statuses
    }

    /// Spawn every feed's polling loop
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            tracing::warn!("Engine already started");
            return;
        }

        for kind in self.feeds() {
            if let Some(runner) = self.runners.get(&kind) {
                handles.push(Arc::clone(runner).spawn());
            }
        }

        tracing::info!(feeds = ?self.feeds(), "Engine started");
    }

    /// Stop every feed, wait for passes in flight, then cancel pending pings
    pub async fn shutdown(&self) {
        for runner in self.runners.values() {
            runner.stop();
        }

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Feed task ended abnormally");
            }
        }

        self.janitor.shutdown().await;
        tracing::info!("Engine stopped");
    }
}
