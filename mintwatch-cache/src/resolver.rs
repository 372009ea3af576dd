//! Membership resolver: answers "is token N minted?" from the watermark
//! store, falling back to the counter source only while the store is cold.
//!
//! # Single flight
//!
//! While cold, at most one counter query is outstanding. The first cold
//! caller creates the pending fetch and spawns the query; every cold caller
//! arriving before it resolves attaches to the same fetch and receives the
//! same result. The fetch runs in its own task, so abandoning any caller
//! (the issuer included) detaches only that caller.
//!
//! ```text
//! caller ──► store warm? ──yes──► token_id <= watermark
//!                │ no
//!                ▼
//!           lock state ──► pending? ──yes──► attach as waiter
//!                             │ no
//!                             ▼
//!                     create pending, spawn query, attach
//!
//! query done ──► lock state ──► publish seed ──► send to waiters ──► clear
//! ```

use futures_util::Stream;
use mintwatch_core::{
    CounterSource, MintWatchError, MintWatchResult, SequenceNumber, SourceError, WatchConfig,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::check::{MintCheck, ResolvePath};
use crate::stats::{ResolverCounters, ResolverStats};
use crate::watermark::{PublishOutcome, WatermarkStore};

type FetchResult = MintWatchResult<SequenceNumber>;

/// The single pending-fetch slot. `Some` while a counter query is outstanding.
#[derive(Default)]
struct ResolverState {
    pending: Option<broadcast::Sender<FetchResult>>,
}

struct ResolverInner {
    store: Arc<WatermarkStore>,
    source: Arc<dyn CounterSource>,
    state: Mutex<ResolverState>,
    query_timeout: Option<Duration>,
    counters: ResolverCounters,
}

impl ResolverInner {
    fn lock_state(&self) -> MintWatchResult<MutexGuard<'_, ResolverState>> {
        self.state.lock().map_err(|_| MintWatchError::LockPoisoned)
    }

    // Completion and introspection must work even after a poisoning panic,
    // otherwise waiters would never be released.
    fn lock_state_unpoisoned(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn query(&self) -> FetchResult {
        let result = match self.query_timeout {
            Some(after) => match tokio::time::timeout(after, self.source.current_count()).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout { after }),
            },
            None => self.source.current_count().await,
        };
        result.map_err(MintWatchError::from)
    }

    /// Resolve the pending fetch: seed the store, deliver to every waiter,
    /// clear the slot. All three happen under the state lock.
    fn complete(&self, result: FetchResult) {
        let mut state = self.lock_state_unpoisoned();

        match &result {
            Ok(count) => {
                let outcome = self.store.publish(*count);
                if outcome == PublishOutcome::Ignored {
                    ResolverCounters::bump(&self.counters.ignored_seeds);
                    warn!(
                        count = %count,
                        watermark = ?self.store.current_value(),
                        "Counter query seed below feed watermark, not applied"
                    );
                } else {
                    info!(count = %count, outcome = ?outcome, "Counter query resolved");
                }
            }
            Err(e) => {
                ResolverCounters::bump(&self.counters.query_failures);
                warn!(error = %e, "Counter query failed");
            }
        }

        if let Some(tx) = state.pending.take() {
            let waiters = tx.receiver_count();
            // Every waiter may have been cancelled; nothing to deliver then.
            let _ = tx.send(result);
            debug!(waiters, "Delivered counter query result");
        }
    }
}

/// Clears the pending slot if the fetch task ends without completing
/// (panic in the source, runtime shutdown). Dropping the sender wakes every
/// waiter with `FetchAbandoned` instead of leaving them parked.
struct PendingGuard {
    inner: Arc<ResolverInner>,
    armed: bool,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.lock_state_unpoisoned();
            if state.pending.take().is_some() {
                ResolverCounters::bump(&self.inner.counters.query_failures);
                warn!("Counter query abandoned before resolving");
            }
        }
    }
}

async fn run_fetch(inner: Arc<ResolverInner>) {
    let mut guard = PendingGuard {
        inner: Arc::clone(&inner),
        armed: true,
    };
    let result = inner.query().await;
    inner.complete(result);
    guard.armed = false;
}

/// Answers membership queries against the watermark, with a single-flight
/// fallback to the counter source while cold.
///
/// Cheap to clone; clones share the store, the source and the pending slot.
#[derive(Clone)]
pub struct MembershipResolver {
    inner: Arc<ResolverInner>,
}

impl MembershipResolver {
    pub fn new(
        store: Arc<WatermarkStore>,
        source: Arc<dyn CounterSource>,
        query_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                store,
                source,
                state: Mutex::new(ResolverState::default()),
                query_timeout,
                counters: ResolverCounters::default(),
            }),
        }
    }

    /// Build a resolver and its store from configuration.
    pub fn from_config(config: &WatchConfig, source: Arc<dyn CounterSource>) -> Self {
        let store = Arc::new(WatermarkStore::new(
            config.publish_policy,
            config.update_capacity,
        ));
        Self::new(store, source, config.query_timeout())
    }

    pub fn store(&self) -> &Arc<WatermarkStore> {
        &self.inner.store
    }

    /// Is `token_id` at or below the known watermark?
    pub async fn is_minted(&self, token_id: impl Into<SequenceNumber>) -> MintWatchResult<bool> {
        self.check(token_id).await.map(|check| check.minted)
    }

    /// Like [`is_minted`](Self::is_minted), also reporting which path answered.
    ///
    /// Never suspends while the store is warm. While cold, waits on the
    /// single outstanding counter query, issuing it if none exists.
    pub async fn check(&self, token_id: impl Into<SequenceNumber>) -> MintWatchResult<MintCheck> {
        let token_id = token_id.into();

        if let Some(check) = self.warm_check(token_id) {
            return Ok(check);
        }

        let (mut rx, path) = {
            let mut state = self.inner.lock_state()?;

            // A seed or a feed event may have landed since the first read.
            if let Some(check) = self.warm_check(token_id) {
                return Ok(check);
            }

            match &state.pending {
                Some(tx) => {
                    ResolverCounters::bump(&self.inner.counters.coalesced_waits);
                    debug!(token_id = %token_id, "Joining outstanding counter query");
                    (tx.subscribe(), ResolvePath::ColdJoined)
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    state.pending = Some(tx);
                    ResolverCounters::bump(&self.inner.counters.cold_queries);
                    info!(token_id = %token_id, "Watermark cold, issuing counter query");
                    tokio::spawn(run_fetch(Arc::clone(&self.inner)));
                    (rx, ResolvePath::ColdIssued)
                }
            }
        };

        let count = match rx.recv().await {
            Ok(result) => result?,
            Err(_) => return Err(MintWatchError::FetchAbandoned),
        };
        Ok(MintCheck::new(token_id, count, path))
    }

    fn warm_check(&self, token_id: SequenceNumber) -> Option<MintCheck> {
        let watermark = self.inner.store.current_value()?;
        ResolverCounters::bump(&self.inner.counters.warm_hits);
        debug!(token_id = %token_id, watermark = %watermark, "Warm watermark hit");
        Some(MintCheck::new(token_id, watermark, ResolvePath::Warm))
    }

    /// Callers currently attached to the outstanding counter query.
    pub fn pending_waiters(&self) -> usize {
        self.inner
            .lock_state_unpoisoned()
            .pending
            .as_ref()
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn has_pending_fetch(&self) -> bool {
        self.inner.lock_state_unpoisoned().pending.is_some()
    }

    pub fn current_watermark(&self) -> Option<SequenceNumber> {
        self.inner.store.current_value()
    }

    /// Replaying stream of watermark values.
    pub fn watermark_updates(&self) -> impl Stream<Item = SequenceNumber> + Send + 'static {
        self.inner.store.updates()
    }

    pub fn stats(&self) -> ResolverStats {
        self.inner.counters.snapshot()
    }
}
