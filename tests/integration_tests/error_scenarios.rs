//! Error scenario integration tests
//!
//! Failure modes of a pass and how the engine recovers from them:
//! 1. Unreachable or broken channels
//! 2. Unavailable or unclassifiable snapshots
//! 3. Subscription store outages

use lotus_relay::models::FeedKind;
use lotus_relay::scheduler::PassOutcome;
use lotus_relay::storage::SubscriptionStore;
use serde_json::{json, Value};

use crate::common::*;

fn live(id: &str) -> Value {
    let base = now_ms();
    fissure(id, "SolNode1", "VoidT4", base - 60_000, base + HOUR_MS)
}

// ============================================================================
// Delivery Failures
// ============================================================================

#[tokio::test]
async fn test_one_broken_channel_does_not_block_others() {
    let h = harness(test_config());
    for (community, channel) in [("g1", "c1"), ("g2", "c2"), ("g3", "c3")] {
        h.store
            .upsert(FeedKind::Fissures, community, channel, &Value::Null, None)
            .unwrap();
    }
    h.target.remove_channel("c2");
    h.worldstate.set(fissures(vec![live("f1")]));

    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    let report = outcome.report().unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.is_clean());
    assert_eq!(h.target.messages_in("c1").len(), 1);
    assert_eq!(h.target.messages_in("c3").len(), 1);

    // Delivery failures do not hold the fingerprint
    assert_eq!(
        h.engine.run_pass(FeedKind::Fissures).await.unwrap(),
        PassOutcome::Unchanged
    );
}

#[tokio::test]
async fn test_slow_channel_times_out() {
    let h = harness(test_config());
    h.store
        .upsert(FeedKind::Fissures, "g1", "fast", &Value::Null, None)
        .unwrap();
    let slow = h
        .store
        .upsert(FeedKind::Fissures, "g2", "slow", &Value::Null, None)
        .unwrap();
    h.target.slow_channel("slow");
    h.worldstate.set(fissures(vec![live("f1")]));

    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    let report = outcome.report().unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].subscription_id, slow.subscription_id);
    assert_eq!(h.target.messages_in("fast").len(), 1);
}

#[tokio::test]
async fn test_unpersisted_reference_counts_as_delivered() {
    let h = harness(test_config());
    let sub = h
        .store
        .upsert(FeedKind::Fissures, "g1", "c1", &Value::Null, None)
        .unwrap();
    h.store.set_fail_updates(true);
    h.worldstate.set(fissures(vec![live("f1")]));

    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.persistence_failures, 1);

    let stored = h.store.get(&sub.subscription_id).unwrap().unwrap();
    assert!(stored.last_message_ref.is_none());

    // Without a stored reference the next change posts a fresh message
    h.store.set_fail_updates(false);
    h.worldstate.set(fissures(vec![live("f1"), live("f2")]));
    h.engine.run_pass(FeedKind::Fissures).await.unwrap();

    assert_eq!(h.target.creates(), 2);
    assert_eq!(h.target.edits(), 0);
    assert!(h
        .store
        .get(&sub.subscription_id)
        .unwrap()
        .unwrap()
        .last_message_ref
        .is_some());
}

// ============================================================================
// Snapshot Failures
// ============================================================================

#[tokio::test]
async fn test_fetch_failure_is_reported_and_retried() {
    let h = harness(test_config());
    h.store
        .upsert(FeedKind::Fissures, "g1", "c1", &Value::Null, None)
        .unwrap();
    h.worldstate.fail();

    for _ in 0..2 {
        let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
        assert!(matches!(outcome, PassOutcome::FetchFailed(_)));
    }
    assert_eq!(h.worldstate.fetches(), 2);
    assert!(h.target.calls().is_empty());

    let status = h
        .engine
        .statuses()
        .await
        .into_iter()
        .find(|s| s.feed == FeedKind::Fissures)
        .unwrap();
    assert_eq!(status.passes, 2);
    assert_eq!(status.consecutive_failures, 2);
    assert_eq!(status.last_outcome.as_deref(), Some("fetch_failed"));

    h.worldstate.set(fissures(vec![live("f1")]));
    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    assert!(matches!(outcome, PassOutcome::Propagated(_)));
    assert_eq!(h.target.creates(), 1);
}

#[tokio::test]
async fn test_unclassifiable_snapshot_holds_fingerprint() {
    let h = harness(test_config());
    h.store
        .upsert(FeedKind::Fissures, "g1", "c1", &Value::Null, Some("role"))
        .unwrap();
    h.worldstate.set(fissures(vec![live("f1")]));
    h.engine.run_pass(FeedKind::Fissures).await.unwrap();

    h.worldstate.set(json!({"Sorties": []}));
    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    assert!(matches!(outcome, PassOutcome::ClassifyFailed(_)));

    // The previous state is still the reference
    h.worldstate.set(fissures(vec![live("f1")]));
    assert_eq!(
        h.engine.run_pass(FeedKind::Fissures).await.unwrap(),
        PassOutcome::Unchanged
    );
    assert_eq!(h.target.pings(), 0);
}

#[tokio::test]
async fn test_manual_trigger_surfaces_fetch_failure() {
    let h = harness(test_config());
    h.worldstate.fail();

    let result = h.engine.trigger_manual_reconcile("fissures", "g1").await;
    assert!(result.is_err());
}

// ============================================================================
// Store Failures
// ============================================================================

#[tokio::test]
async fn test_store_outage_defers_propagation() {
    let h = harness(test_config());
    h.store
        .upsert(FeedKind::Fissures, "g1", "c1", &Value::Null, Some("role"))
        .unwrap();
    h.worldstate.set(fissures(vec![live("f1")]));
    h.engine.run_pass(FeedKind::Fissures).await.unwrap();

    h.worldstate.set(fissures(vec![live("f1"), live("f2")]));
    h.store.set_fail_listing(true);
    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    assert!(matches!(outcome, PassOutcome::StoreFailed(_)));
    assert_eq!(h.target.edits(), 0);

    // The new fissure is still news once the store is back
    h.store.set_fail_listing(false);
    let outcome = h.engine.run_pass(FeedKind::Fissures).await.unwrap();
    assert_eq!(outcome.report().map(|r| r.succeeded), Some(1));
    assert_eq!(h.target.edits(), 1);
    assert_eq!(h.target.pings(), 1);

    h.engine.shutdown().await;
}
