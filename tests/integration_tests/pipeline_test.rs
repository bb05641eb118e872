//! Propagation through the full engine

use std::sync::Arc;
use std::time::Duration;

use lotus_relay::error::Error;
use lotus_relay::feeds::TraderFeed;
use lotus_relay::models::{FeedKind, MessageRef};
use lotus_relay::notifications::channels::{DeliveryCall, MemoryDeliveryTarget};
use lotus_relay::notifications::{PingJanitor, Reconciler, ReconcilerConfig};
use lotus_relay::scheduler::{FeedScheduler, PassOutcome, SchedulerError};
use lotus_relay::storage::{MemorySubscriptionStore, SubscriptionStore};
use serde_json::{json, Value};

use crate::common::*;

fn active_fissure(id: &str, node: &str, modifier: &str) -> Value {
    let base = now_ms();
    fissure(id, node, modifier, base - 60_000, base + HOUR_MS)
}

#[tokio::test]
async fn test_baseline_then_idempotent() {
    let h = harness(test_config());
    h.store
        .upsert(FeedKind::Fissures, "guild-a", "chan-a", &Value::Null, Some("role-a"))
        .unwrap();
    h.store
        .upsert(FeedKind::Fissures, "guild-b", "chan-b", &json!({"tiers": ["Axi"]}), None)
        .unwrap();
    h.worldstate
        .set(fissures(vec![active_fissure("f1", "SolNode1", "VoidT4")]));

    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    let report = outcome.report().cloned().unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(h.target.creates(), 2);
    assert_eq!(h.target.pings(), 0, "baseline pass must not ping");

    let calls_after_baseline = h.target.calls().len();
    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    assert_eq!(outcome, PassOutcome::Unchanged);
    assert_eq!(h.target.calls().len(), calls_after_baseline);
}

#[tokio::test]
async fn test_new_fissure_edits_and_pings() {
    let h = harness(test_config());
    h.store
        .upsert(FeedKind::Fissures, "guild-a", "chan-a", &Value::Null, Some("role-a"))
        .unwrap();
    h.worldstate
        .set(fissures(vec![active_fissure("f1", "SolNode1", "VoidT4")]));
    h.engine.run_pass(FeedKind::Fissures).await.unwrap();

    h.worldstate.set(fissures(vec![
        active_fissure("f1", "SolNode1", "VoidT4"),
        active_fissure("f2", "SolNode24", "VoidT1"),
    ]));
    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();

    assert_eq!(outcome.report().map(|r| r.succeeded), Some(1));
    assert_eq!(h.target.creates(), 1);
    assert_eq!(h.target.edits(), 1);
    assert_eq!(h.target.pings(), 1);
    assert_eq!(h.engine.janitor().pending(), 1);

    let ping = h
        .target
        .calls()
        .into_iter()
        .find_map(|call| match call {
            DeliveryCall::Send { ping: Some(role), channel_id, .. } => Some((channel_id, role)),
            _ => None,
        })
        .unwrap();
    assert_eq!(ping, ("chan-a".to_string(), "role-a".to_string()));

    h.engine.shutdown().await;
    assert_eq!(h.engine.janitor().pending(), 0);
}

#[tokio::test]
async fn test_display_only_change_is_not_significant() {
    let h = harness(test_config());
    h.store
        .upsert(FeedKind::Fissures, "guild-a", "chan-a", &Value::Null, None)
        .unwrap();

    let base = now_ms();
    let original = fissure("f1", "SolNode1", "VoidT4", base - 60_000, base + HOUR_MS);
    h.worldstate.set(fissures(vec![original.clone()]));
    h.engine.run_pass(FeedKind::Fissures).await.unwrap();

    let mut renamed = original;
    renamed["MissionType"] = json!("MT_EXTERMINATION");
    h.worldstate.set(fissures(vec![renamed]));

    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    assert_eq!(outcome, PassOutcome::Unchanged);
    assert_eq!(h.target.edits(), 0);
}

#[tokio::test]
async fn test_manual_trigger_is_independent() {
    let h = harness(test_config());
    let sub = h
        .store
        .upsert(FeedKind::Fissures, "guild-a", "chan-a", &Value::Null, Some("role-a"))
        .unwrap();
    h.store
        .upsert(FeedKind::Fissures, "guild-b", "chan-b", &Value::Null, None)
        .unwrap();
    h.worldstate
        .set(fissures(vec![active_fissure("f1", "SolNode1", "VoidT4")]));
    h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    assert_eq!(h.target.creates(), 2);

    let posted = h
        .store
        .get(&sub.subscription_id)
        .unwrap()
        .and_then(|s| s.last_message_ref)
        .unwrap();
    assert!(h.target.delete_externally("chan-a", &posted));

    let report = h
        .engine
        .trigger_manual_reconcile("fissures", "guild-a")
        .await
        .unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(h.target.creates(), 3);
    assert_eq!(h.target.pings(), 0);
    assert_eq!(h.target.messages_in("chan-b").len(), 1);

    let replaced = h
        .store
        .get(&sub.subscription_id)
        .unwrap()
        .and_then(|s| s.last_message_ref)
        .unwrap();
    assert_ne!(replaced, posted);

    // The manual run did not move the fingerprint
    assert_eq!(
        h.engine.run_pass(FeedKind::Fissures).await.unwrap(),
        PassOutcome::Unchanged
    );
}

#[tokio::test]
async fn test_manual_trigger_before_first_pass() {
    let h = harness(test_config());
    h.store
        .upsert(FeedKind::Fissures, "guild-a", "chan-a", &Value::Null, Some("role-a"))
        .unwrap();
    h.worldstate
        .set(fissures(vec![active_fissure("f1", "SolNode1", "VoidT4")]));

    h.engine
        .trigger_manual_reconcile("fissure", "guild-a")
        .await
        .unwrap();

    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    assert!(matches!(outcome, PassOutcome::Propagated(_)));
    assert_eq!(h.target.creates(), 1);
    assert_eq!(h.target.edits(), 1);
    assert_eq!(h.target.pings(), 0);
}

#[tokio::test]
async fn test_trigger_rejects_unknown_and_disabled_feeds() {
    let config = test_config().with_feed_enabled(FeedKind::Arbitration, false);
    let h = harness(config);

    assert_eq!(h.engine.feeds(), vec![FeedKind::Fissures, FeedKind::Trader]);

    let unknown = h.engine.trigger_manual_reconcile("sortie", "guild").await;
    assert!(matches!(
        unknown,
        Err(Error::Scheduler(SchedulerError::UnknownFeed { .. }))
    ));

    let disabled = h.engine.trigger_manual_reconcile("arbitration", "guild").await;
    assert!(matches!(
        disabled,
        Err(Error::Scheduler(SchedulerError::FeedDisabled {
            feed: FeedKind::Arbitration
        }))
    ));
}

#[tokio::test]
async fn test_arbitration_rotation_pings() {
    let h = harness(test_config());
    h.store
        .upsert(
            FeedKind::Arbitration,
            "guild-a",
            "chan-a",
            &json!({"missionTypes": ["Survival", "Defense"]}),
            Some("role-a"),
        )
        .unwrap();

    h.arbitration.set(arbitrations(now_ms() - 60_000));
    h.engine.run_pass(FeedKind::Arbitration).await.unwrap();
    assert_eq!(h.target.creates(), 1);

    // Next rotation is already live
    h.arbitration.set(arbitrations(now_ms() - HOUR_MS - 60_000));
    let outcome = h.engine.run_pass(FeedKind::Arbitration).await.unwrap();

    assert_eq!(outcome.report().map(|r| r.succeeded), Some(1));
    assert_eq!(h.target.edits(), 1);
    assert_eq!(h.target.pings(), 1);
    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_trader_arrival_pings_wanted_items() {
    let store = Arc::new(MemorySubscriptionStore::new());
    let target = Arc::new(MemoryDeliveryTarget::new());
    let janitor = Arc::new(PingJanitor::new(target.clone()));
    let reconciler = Reconciler::new(
        target.clone(),
        store.clone(),
        janitor.clone(),
        ReconcilerConfig::default(),
    );
    let source = ScriptedSource::serving(trader("baro", T0, primed_manifest()));
    let scheduler = FeedScheduler::new(
        TraderFeed,
        source,
        resolver(),
        store.clone(),
        reconciler,
        Duration::from_secs(300),
    );

    let sub = store
        .upsert(FeedKind::Trader, "guild", "chan", &json!({"items": ["serration"]}), Some("role"))
        .unwrap();

    let upcoming = scheduler.run_scheduled_pass_at(at(-HOUR_MS)).await;
    assert_eq!(upcoming.report().map(|r| r.skipped), Some(1));
    assert_eq!(
        scheduler.run_scheduled_pass_at(at(-HOUR_MS + 1000)).await,
        PassOutcome::Unchanged
    );

    let arrived = scheduler.run_scheduled_pass_at(at(1000)).await;
    assert_eq!(arrived.report().map(|r| r.succeeded), Some(1));
    assert_eq!(target.creates(), 1);
    assert_eq!(target.pings(), 1);

    let stored = store.get(&sub.subscription_id).unwrap().unwrap();
    assert_eq!(stored.last_message_ref, Some(MessageRef::new("1")));

    janitor.shutdown().await;
}
