//! Error types for mintwatch operations

use std::time::Duration;
use thiserror::Error;

/// Failures of the external counter query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Counter source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Counter query timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Counter source returned an invalid response: {reason}")]
    InvalidResponse { reason: String },
}

/// Failures of the mint event feed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("Event feed disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("Invalid address {value}: {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("Event feed subscription failed: {reason}")]
    SubscribeFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },
}

/// Master error type for all mintwatch errors.
///
/// Cloneable so a single fallback-query failure can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MintWatchError {
    #[error("Counter source error: {0}")]
    Source(#[from] SourceError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resolver lock poisoned")]
    LockPoisoned,

    #[error("Counter query ended without a result")]
    FetchAbandoned,
}

/// Result type alias for mintwatch operations.
pub type MintWatchResult<T> = Result<T, MintWatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Timeout {
            after: Duration::from_millis(250),
        };
        assert_eq!(format!("{}", err), "Counter query timed out after 250ms");
    }

    #[test]
    fn test_wrapping_keeps_inner_message() {
        let err: MintWatchError = SourceError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.starts_with("Counter source error"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_feed_error_from() {
        let err: MintWatchError = FeedError::Disconnected {
            reason: "socket closed".to_string(),
        }
        .into();
        assert!(matches!(err, MintWatchError::Feed(FeedError::Disconnected { .. })));
    }

    #[test]
    fn test_errors_are_cloneable_and_comparable() {
        let err = MintWatchError::FetchAbandoned;
        assert_eq!(err.clone(), err);
    }
}
