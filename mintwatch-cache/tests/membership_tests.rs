//! End-to-end behavior of the mint tracker against mock collaborators.
//!
//! Covers cold-start fallback, warm short-circuit, non-regression under both
//! publish policies, single-flight coalescing, event-driven updates with
//! replay, and recovery after a failed counter query.

use futures_util::StreamExt;
use mintwatch_cache::{MembershipResolver, MintTracker, PublishOutcome, ResolvePath, WatermarkStore};
use mintwatch_core::{
    MintWatchError, PublishPolicy, SequenceNumber, SourceError, WatchConfig,
};
use mintwatch_test_utils::{MockCounterSource, MockEventFeed};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

const STEP: Duration = Duration::from_secs(5);

fn resolver(source: &Arc<MockCounterSource>, policy: PublishPolicy) -> MembershipResolver {
    let store = Arc::new(WatermarkStore::new(policy, 16));
    MembershipResolver::new(store, source.clone(), None)
}

async fn wait_for_waiters(resolver: &MembershipResolver, expected: usize) {
    timeout(STEP, async {
        while resolver.pending_waiters() < expected {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("waiters never attached");
}

// ============================================================================
// COLD AND WARM PATHS
// ============================================================================

#[tokio::test]
async fn cold_start_issues_exactly_one_query() {
    let source = Arc::new(MockCounterSource::returning(10));
    let resolver = resolver(&source, PublishPolicy::KeepMax);

    assert!(resolver.is_minted(5).await.unwrap());
    assert_eq!(source.calls(), 1);
    assert_eq!(resolver.current_watermark(), Some(SequenceNumber::new(10)));
}

#[tokio::test]
async fn warm_watermark_answers_without_query() {
    let source = Arc::new(MockCounterSource::returning(10));
    let resolver = resolver(&source, PublishPolicy::KeepMax);

    // Warmed by the fallback.
    assert!(resolver.is_minted(1).await.unwrap());
    assert_eq!(source.calls(), 1);

    let check = resolver.check(11).await.unwrap();
    assert!(!check.minted);
    assert_eq!(check.path, ResolvePath::Warm);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn warm_from_feed_never_queries() {
    let feed = MockEventFeed::new();
    let source = Arc::new(MockCounterSource::returning(99));
    let tracker = MintTracker::start(&WatchConfig::default(), &feed, source.clone())
        .await
        .unwrap();

    let mut updates = tracker.watermark_updates().boxed();
    feed.mint(10);
    assert_eq!(
        timeout(STEP, updates.next()).await.unwrap(),
        Some(SequenceNumber::new(10))
    );

    assert!(!tracker.is_minted(11).await.unwrap());
    assert!(tracker.is_minted(10).await.unwrap());
    assert_eq!(source.calls(), 0);

    tracker.shutdown().await.unwrap();
}

// ============================================================================
// NON-REGRESSION
// ============================================================================

#[tokio::test]
async fn keep_max_never_regresses() {
    let source = Arc::new(MockCounterSource::returning(0));
    let resolver = resolver(&source, PublishPolicy::KeepMax);
    let store = resolver.store();

    assert_eq!(store.publish(SequenceNumber::new(7)), PublishOutcome::Seeded);
    assert!(resolver.is_minted(7).await.unwrap());

    assert_eq!(store.publish(SequenceNumber::new(3)), PublishOutcome::Ignored);
    assert!(resolver.is_minted(7).await.unwrap());
    assert_eq!(resolver.current_watermark(), Some(SequenceNumber::new(7)));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn last_value_wins_follows_latest_publish() {
    let source = Arc::new(MockCounterSource::returning(0));
    let resolver = resolver(&source, PublishPolicy::LastValueWins);
    let store = resolver.store();

    store.publish(SequenceNumber::new(7));
    assert!(resolver.is_minted(7).await.unwrap());

    assert_eq!(store.publish(SequenceNumber::new(3)), PublishOutcome::Regressed);
    // The lower value is trusted as-is under this policy.
    assert!(!resolver.is_minted(7).await.unwrap());
    assert!(resolver.is_minted(3).await.unwrap());
}

// ============================================================================
// SINGLE FLIGHT
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fifty_cold_callers_share_one_query() {
    let source = Arc::new(MockCounterSource::returning(25).gated());
    let resolver = resolver(&source, PublishPolicy::KeepMax);

    let callers: Vec<_> = (0..50)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.is_minted(20).await })
        })
        .collect();

    wait_for_waiters(&resolver, 50).await;
    assert_eq!(source.calls(), 1);
    source.release();

    for caller in callers {
        let minted = timeout(STEP, caller).await.unwrap().unwrap().unwrap();
        assert!(minted);
    }
    assert_eq!(source.calls(), 1);

    let stats = resolver.stats();
    assert_eq!(stats.cold_queries, 1);
    assert_eq!(stats.coalesced_waits, 49);
    assert!(!resolver.has_pending_fetch());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn callers_after_resolution_are_warm() {
    let source = Arc::new(MockCounterSource::returning(5).with_delay(Duration::from_millis(20)));
    let resolver = resolver(&source, PublishPolicy::KeepMax);

    let first = resolver.check(5).await.unwrap();
    assert!(first.was_cold());

    let second = resolver.check(6).await.unwrap();
    assert_eq!(second.path, ResolvePath::Warm);
    assert_eq!(source.calls(), 1);
}

// ============================================================================
// EVENT-DRIVEN UPDATES
// ============================================================================

#[tokio::test]
async fn feed_update_reaches_early_and_late_subscribers() {
    let feed = MockEventFeed::new();
    let source = Arc::new(MockCounterSource::returning(0));
    let tracker = MintTracker::start(&WatchConfig::default(), &feed, source.clone())
        .await
        .unwrap();

    let mut early = tracker.watermark_updates().boxed();
    feed.mint(3);
    assert_eq!(
        timeout(STEP, early.next()).await.unwrap(),
        Some(SequenceNumber::new(3))
    );

    // Replays the current value with no new feed event.
    let mut late = tracker.watermark_updates().boxed();
    assert_eq!(
        timeout(STEP, late.next()).await.unwrap(),
        Some(SequenceNumber::new(3))
    );
    assert_eq!(source.calls(), 0);

    let summary = tracker.shutdown().await.unwrap();
    assert_eq!(summary.mints_published, 1);
    assert!(feed.is_released());
}

// ============================================================================
// FAILURE ISOLATION
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_query_reaches_all_waiters_then_retries() {
    let source = Arc::new(
        MockCounterSource::failing(SourceError::Unavailable {
            reason: "node unreachable".to_string(),
        })
        .gated(),
    );
    let resolver = resolver(&source, PublishPolicy::KeepMax);

    let callers: Vec<_> = (0..5)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.is_minted(1).await })
        })
        .collect();
    wait_for_waiters(&resolver, 5).await;
    source.release();

    for caller in callers {
        let err = timeout(STEP, caller).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(
            err,
            MintWatchError::Source(SourceError::Unavailable { .. })
        ));
    }
    assert!(!resolver.has_pending_fetch());
    assert_eq!(resolver.current_watermark(), None);
    assert_eq!(source.calls(), 1);

    source.set_count(8);
    assert!(resolver.is_minted(2).await.unwrap());
    assert_eq!(source.calls(), 2);
    assert_eq!(resolver.stats().query_failures, 1);
}
