//! Contracts for the two external collaborators: the authoritative counter
//! and the transfer notification feed.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::{FeedError, SourceError};
use crate::identity::SequenceNumber;
use crate::transfer::TransferEvent;

/// Live stream of transfer notifications. Dropping it releases the
/// underlying subscription.
pub type TransferStream = BoxStream<'static, Result<TransferEvent, FeedError>>;

/// The authoritative, expensive counter query against the ledger.
///
/// Implementations are expected to hit the network on every call; the
/// cache is responsible for calling it as rarely as possible.
#[async_trait]
pub trait CounterSource: Send + Sync {
    /// Total number of units issued so far.
    async fn current_count(&self) -> Result<SequenceNumber, SourceError>;
}

/// A push-style source of transfer notifications.
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Open a subscription. Reconnection, if any, is the feed's concern.
    async fn subscribe(&self) -> Result<TransferStream, FeedError>;
}
