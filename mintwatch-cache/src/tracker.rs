//! One-stop handle bundling the store, the resolver and the feed adapter.

use chrono::TimeDelta;
use futures_util::Stream;
use mintwatch_core::{CounterSource, EventFeed, MintWatchResult, SequenceNumber, WatchConfig};
use std::sync::Arc;
use tracing::info;

use crate::check::MintCheck;
use crate::feed::{FeedAdapter, FeedHandle, FeedSummary};
use crate::resolver::MembershipResolver;
use crate::stats::ResolverStats;

/// A running mint tracker: answers membership queries and keeps the
/// watermark current from the event feed until shut down.
pub struct MintTracker {
    resolver: MembershipResolver,
    feed: FeedHandle,
}

impl MintTracker {
    /// Validate `config`, subscribe to `feed` and start tracking.
    ///
    /// The store starts cold; the first lookup seeds it from `source`
    /// unless a mint arrives first.
    pub async fn start<F>(
        config: &WatchConfig,
        feed: &F,
        source: Arc<dyn CounterSource>,
    ) -> MintWatchResult<Self>
    where
        F: EventFeed + ?Sized,
    {
        config.validate()?;
        let resolver = MembershipResolver::from_config(config, source);
        let feed = FeedAdapter::start(feed, Arc::clone(resolver.store())).await?;
        info!(
            policy = ?config.publish_policy,
            query_timeout_ms = config.query_timeout_ms,
            "Mint tracker started"
        );
        Ok(Self { resolver, feed })
    }

    pub async fn is_minted(&self, token_id: impl Into<SequenceNumber>) -> MintWatchResult<bool> {
        self.resolver.is_minted(token_id).await
    }

    pub async fn check(&self, token_id: impl Into<SequenceNumber>) -> MintWatchResult<MintCheck> {
        self.resolver.check(token_id).await
    }

    pub fn watermark_updates(&self) -> impl Stream<Item = SequenceNumber> + Send + 'static {
        self.resolver.watermark_updates()
    }

    pub fn current_watermark(&self) -> Option<SequenceNumber> {
        self.resolver.current_watermark()
    }

    /// How long ago the current watermark was recorded; `None` while cold.
    pub fn watermark_age(&self) -> Option<TimeDelta> {
        self.resolver.store().current().map(|w| w.age())
    }

    pub fn stats(&self) -> ResolverStats {
        self.resolver.stats()
    }

    pub fn feed_progress(&self) -> FeedSummary {
        self.feed.progress()
    }

    /// A resolver sharing this tracker's store, usable after the tracker
    /// itself has been moved into `shutdown`.
    pub fn resolver(&self) -> MembershipResolver {
        self.resolver.clone()
    }

    /// Stop the feed adapter and release its subscription. Surfaces any
    /// feed error that ended the adapter early.
    pub async fn shutdown(self) -> MintWatchResult<FeedSummary> {
        let summary = self.feed.shutdown().await?;
        info!(
            mints_published = summary.mints_published,
            "Mint tracker stopped"
        );
        Ok(summary)
    }
}
