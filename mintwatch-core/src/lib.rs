//! MintWatch Core - Shared Types
//!
//! Data types, errors and configuration shared by every mintwatch crate.
//! The cache itself lives in `mintwatch-cache`; this crate has no async
//! behavior of its own.

pub mod config;
pub mod error;
pub mod identity;
pub mod source;
pub mod telemetry;
pub mod transfer;

pub use config::{LogConfig, LogFormat, PublishPolicy, WatchConfig};
pub use error::{ConfigError, FeedError, MintWatchError, MintWatchResult, SourceError};
pub use identity::{Address, SequenceNumber};
pub use source::{CounterSource, EventFeed, TransferStream};
pub use transfer::TransferEvent;
