//! MintWatch Cache - Mint Watermark Tracking
//!
//! Answers "has token N been minted?" for a ledger whose token ids are
//! issued sequentially, without querying the ledger on every call.
//!
//! # Design
//!
//! Sequential issuance means the minted set is always a prefix `1..=count`,
//! so the whole state is one number: the [`Watermark`]. The store holds it
//! and replays it to late subscribers. An event feed keeps it current from
//! mint notifications. Until either the feed or a counter query has
//! produced a value the store is cold, and the [`MembershipResolver`]
//! coalesces every cold lookup onto a single counter query.
//!
//! # Example
//!
//! ```ignore
//! let tracker = MintTracker::start(&WatchConfig::from_env()?, &feed, source).await?;
//!
//! // Cold: one counter query, shared by every concurrent caller.
//! let minted = tracker.is_minted(42).await?;
//!
//! // Warm from here on: answered from the watermark, no query.
//! let check = tracker.check(43).await?;
//! assert_eq!(check.path, ResolvePath::Warm);
//!
//! tracker.shutdown().await?;
//! ```

pub mod check;
pub mod feed;
pub mod resolver;
pub mod stats;
pub mod tracker;
pub mod watermark;

pub use check::{MintCheck, ResolvePath};
pub use feed::{FeedAdapter, FeedExit, FeedHandle, FeedSummary};
pub use resolver::MembershipResolver;
pub use stats::ResolverStats;
pub use tracker::MintTracker;
pub use watermark::{PublishOutcome, Watermark, WatermarkStore, WatermarkSubscription};
