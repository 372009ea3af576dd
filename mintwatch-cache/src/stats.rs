//! Resolver counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated lock-free from the resolver.
#[derive(Debug, Default)]
pub(crate) struct ResolverCounters {
    pub warm_hits: AtomicU64,
    pub cold_queries: AtomicU64,
    pub coalesced_waits: AtomicU64,
    pub query_failures: AtomicU64,
    pub ignored_seeds: AtomicU64,
}

impl ResolverCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ResolverStats {
        ResolverStats {
            warm_hits: self.warm_hits.load(Ordering::Relaxed),
            cold_queries: self.cold_queries.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
            ignored_seeds: self.ignored_seeds.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about resolver usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Answers served straight from a warm watermark.
    pub warm_hits: u64,
    /// Counter queries actually issued.
    pub cold_queries: u64,
    /// Cold callers that joined an already outstanding query.
    pub coalesced_waits: u64,
    /// Counter queries that failed or timed out.
    pub query_failures: u64,
    /// Successful counter queries whose result was below a watermark the
    /// feed had already published, and so was not applied.
    pub ignored_seeds: u64,
}

impl ResolverStats {
    /// Fraction of lookups answered without waiting on a query (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.warm_hits + self.cold_queries + self.coalesced_waits;
        if total == 0 {
            0.0
        } else {
            self.warm_hits as f64 / total as f64
        }
    }
}
