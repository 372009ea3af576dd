//! Event feed adapter: pumps mint notifications into the watermark store.
//!
//! The adapter subscribes once at start and owns the resulting stream in a
//! background task. Only mints (transfers from the null address) are
//! published; ownership transfers are counted and skipped. There is no
//! reconnection here: a feed error ends the pump and is reported to
//! whoever holds the [`FeedHandle`].
//!
//! ```ignore
//! let handle = FeedAdapter::start(&feed, Arc::clone(&store)).await?;
//! // ...
//! let summary = handle.shutdown().await?;
//! ```

use futures_util::StreamExt;
use mintwatch_core::{EventFeed, FeedError, MintWatchError, MintWatchResult, TransferStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::watermark::WatermarkStore;

#[derive(Debug, Default)]
struct FeedCounters {
    events_seen: AtomicU64,
    mints_published: AtomicU64,
}

impl FeedCounters {
    fn snapshot(&self) -> FeedSummary {
        FeedSummary {
            events_seen: self.events_seen.load(Ordering::Relaxed),
            mints_published: self.mints_published.load(Ordering::Relaxed),
        }
    }
}

/// Activity of a feed adapter over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// Every transfer received, mint or not.
    pub events_seen: u64,
    /// Mints forwarded to the store.
    pub mints_published: u64,
}

/// Why the pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedExit {
    /// `shutdown()` was called or the handle was dropped.
    Shutdown,
    /// The feed ended its stream.
    Exhausted,
}

pub struct FeedAdapter;

impl FeedAdapter {
    /// Subscribe to `feed` and start forwarding mints into `store`.
    pub async fn start<F>(feed: &F, store: Arc<WatermarkStore>) -> MintWatchResult<FeedHandle>
    where
        F: EventFeed + ?Sized,
    {
        let stream = feed.subscribe().await?;
        info!("Event feed subscribed");
        Ok(Self::spawn(stream, store))
    }

    /// Start forwarding from an already-open stream.
    pub fn spawn(stream: TransferStream, store: Arc<WatermarkStore>) -> FeedHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(FeedCounters::default());
        let task = tokio::spawn(pump(stream, store, shutdown_rx, Arc::clone(&counters)));
        FeedHandle {
            shutdown_tx,
            task,
            counters,
        }
    }
}

async fn pump(
    mut stream: TransferStream,
    store: Arc<WatermarkStore>,
    mut shutdown_rx: watch::Receiver<bool>,
    counters: Arc<FeedCounters>,
) -> Result<FeedExit, FeedError> {
    let exit = loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                // A dropped handle counts as a shutdown request.
                if changed.is_err() || *shutdown_rx.borrow() {
                    break FeedExit::Shutdown;
                }
            }

            item = stream.next() => match item {
                Some(Ok(event)) => {
                    counters.events_seen.fetch_add(1, Ordering::Relaxed);
                    if event.is_mint() {
                        debug!(token_id = %event.token_id, to = %event.to, "Mint event");
                        store.publish(event.token_id);
                        counters.mints_published.fetch_add(1, Ordering::Relaxed);
                    } else {
                        debug!(
                            token_id = %event.token_id,
                            from = %event.from,
                            to = %event.to,
                            "Skipping ownership transfer"
                        );
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "Event feed failed");
                    return Err(e);
                }
                None => break FeedExit::Exhausted,
            },
        }
    };

    // Release the subscription before reporting.
    drop(stream);

    let summary = counters.snapshot();
    info!(
        exit = ?exit,
        events_seen = summary.events_seen,
        mints_published = summary.mints_published,
        "Event feed adapter stopped"
    );
    Ok(exit)
}

/// Owner of a running feed adapter. Dropping it also stops the pump.
pub struct FeedHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Result<FeedExit, FeedError>>,
    counters: Arc<FeedCounters>,
}

impl FeedHandle {
    /// Counters so far, without stopping the pump.
    pub fn progress(&self) -> FeedSummary {
        self.counters.snapshot()
    }

    /// Whether the pump has stopped on its own (feed error or end of stream).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the pump, release the subscription and report what it did.
    ///
    /// A feed error that ended the pump earlier is returned here.
    pub async fn shutdown(self) -> MintWatchResult<FeedSummary> {
        let _ = self.shutdown_tx.send(true);
        self.join().await
    }

    /// Wait for the pump to stop on its own, without requesting shutdown.
    pub async fn finished(self) -> MintWatchResult<FeedSummary> {
        self.join().await
    }

    async fn join(self) -> MintWatchResult<FeedSummary> {
        let FeedHandle {
            shutdown_tx,
            task,
            counters,
        } = self;
        let joined = task.await;
        drop(shutdown_tx);

        match joined {
            Ok(Ok(_exit)) => Ok(counters.snapshot()),
            Ok(Err(e)) => Err(MintWatchError::Feed(e)),
            Err(e) => Err(MintWatchError::Feed(FeedError::Disconnected {
                reason: format!("feed task failed: {}", e),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mintwatch_core::{PublishPolicy, SequenceNumber};
    use mintwatch_test_utils::{holder, MockEventFeed};

    fn store() -> Arc<WatermarkStore> {
        Arc::new(WatermarkStore::new(PublishPolicy::KeepMax, 16))
    }

    #[tokio::test]
    async fn test_mints_are_published() {
        let feed = MockEventFeed::new();
        let store = store();
        let mut updates = store.subscribe();
        let handle = FeedAdapter::start(&feed, Arc::clone(&store)).await.unwrap();

        feed.mint(1);
        feed.mint(2);
        assert_eq!(updates.next().await, Some(SequenceNumber::new(1)));
        assert_eq!(updates.next().await, Some(SequenceNumber::new(2)));

        let summary = handle.shutdown().await.unwrap();
        assert_eq!(summary.events_seen, 2);
        assert_eq!(summary.mints_published, 2);
    }

    #[tokio::test]
    async fn test_ownership_transfers_are_skipped() {
        let feed = MockEventFeed::new();
        let store = store();
        let mut updates = store.subscribe();
        let handle = FeedAdapter::start(&feed, Arc::clone(&store)).await.unwrap();

        feed.transfer(holder(1), holder(2), 40);
        feed.mint(3);
        assert_eq!(updates.next().await, Some(SequenceNumber::new(3)));
        assert_eq!(store.current_value(), Some(SequenceNumber::new(3)));

        let summary = handle.shutdown().await.unwrap();
        assert_eq!(summary.events_seen, 2);
        assert_eq!(summary.mints_published, 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscription() {
        let feed = MockEventFeed::new();
        let handle = FeedAdapter::start(&feed, store()).await.unwrap();
        assert!(feed.is_subscribed());
        assert!(!feed.is_released());

        handle.shutdown().await.unwrap();
        assert!(feed.is_released());
    }

    #[tokio::test]
    async fn test_feed_error_is_surfaced() {
        let feed = MockEventFeed::new();
        let handle = FeedAdapter::start(&feed, store()).await.unwrap();

        feed.fail(FeedError::Disconnected {
            reason: "websocket closed".to_string(),
        });
        let err = handle.finished().await.unwrap_err();
        assert!(matches!(
            err,
            MintWatchError::Feed(FeedError::Disconnected { .. })
        ));
        assert!(feed.is_released());
    }

    #[tokio::test]
    async fn test_end_of_stream_stops_cleanly() {
        let feed = MockEventFeed::new();
        let handle = FeedAdapter::start(&feed, store()).await.unwrap();
        feed.mint(1);
        feed.close();

        let summary = handle.finished().await.unwrap();
        assert_eq!(summary.mints_published, 1);
    }

    #[tokio::test]
    async fn test_subscribe_failure() {
        let feed = MockEventFeed::refusing(FeedError::SubscribeFailed {
            reason: "no provider".to_string(),
        });
        let err = FeedAdapter::start(&feed, store()).await.err().unwrap();
        assert!(matches!(
            err,
            MintWatchError::Feed(FeedError::SubscribeFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_pump() {
        let feed = MockEventFeed::new();
        let handle = FeedAdapter::start(&feed, store()).await.unwrap();
        drop(handle);

        while !feed.is_released() {
            tokio::task::yield_now().await;
        }
    }
}
