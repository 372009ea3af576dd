//! Watermark store: the single-slot, replaying broadcast of the highest
//! minted sequence number this process knows about.
//!
//! The store is written from two places (feed events on the hot path, the
//! resolver's fallback seed on the cold path) through the same
//! [`WatermarkStore::publish`] call and does not distinguish between them.
//! New subscribers receive the current value first, then every later
//! publish.

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::Stream;
use mintwatch_core::{PublishPolicy, SequenceNumber};
use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// A published sequence number and when the store recorded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub sequence: SequenceNumber,
    pub observed_at: DateTime<Utc>,
}

impl Watermark {
    /// Create a new watermark observed now.
    pub fn new(sequence: SequenceNumber) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
        }
    }

    /// Time elapsed since the store recorded this value.
    pub fn age(&self) -> TimeDelta {
        Utc::now() - self.observed_at
    }
}

/// What a single publish did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// First value; the store went from cold to warm.
    Seeded,
    /// Strictly greater than the previous value.
    Advanced,
    /// Equal to the previous value.
    Unchanged,
    /// Lower than the previous value and recorded anyway (`LastValueWins`).
    Regressed,
    /// Lower than the previous value and dropped (`KeepMax`).
    Ignored,
}

/// Single-slot, last-value broadcast of the watermark.
///
/// The slot and the broadcast sender are guarded by one mutex, so a
/// subscriber created concurrently with a publish sees each value exactly
/// once: either as its replayed first item or as a broadcast, never both.
pub struct WatermarkStore {
    slot: Mutex<Option<Watermark>>,
    tx: broadcast::Sender<SequenceNumber>,
    policy: PublishPolicy,
}

impl WatermarkStore {
    /// Create a cold store. `capacity` bounds how far a slow subscriber can
    /// fall behind before it skips to newer values.
    pub fn new(policy: PublishPolicy, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            slot: Mutex::new(None),
            tx,
            policy,
        }
    }

    pub fn policy(&self) -> PublishPolicy {
        self.policy
    }

    // The slot holds a Copy value, so a panic elsewhere cannot leave it
    // half-written; recover the guard instead of propagating poison.
    fn slot(&self) -> MutexGuard<'_, Option<Watermark>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `value` and deliver it to every live subscriber.
    pub fn publish(&self, value: SequenceNumber) -> PublishOutcome {
        let mut slot = self.slot();
        let previous = *slot;

        let outcome = match previous {
            None => PublishOutcome::Seeded,
            Some(current) => match value.cmp(&current.sequence) {
                Ordering::Greater => PublishOutcome::Advanced,
                Ordering::Equal => PublishOutcome::Unchanged,
                Ordering::Less => match self.policy {
                    PublishPolicy::KeepMax => PublishOutcome::Ignored,
                    PublishPolicy::LastValueWins => PublishOutcome::Regressed,
                },
            },
        };

        let broadcast = match outcome {
            PublishOutcome::Ignored => false,
            PublishOutcome::Unchanged => self.policy == PublishPolicy::LastValueWins,
            _ => true,
        };

        if outcome != PublishOutcome::Ignored {
            *slot = Some(Watermark::new(value));
        }
        if broadcast {
            // No subscribers is fine; the slot still replays to future ones.
            let _ = self.tx.send(value);
        }
        drop(slot);

        match (outcome, previous) {
            (PublishOutcome::Seeded, _) => {
                info!(watermark = %value, "Watermark seeded");
            }
            (PublishOutcome::Advanced, Some(prev)) => {
                debug!(
                    watermark = %value,
                    advanced_by = value.get() - prev.sequence.get(),
                    "Watermark advanced"
                );
            }
            (PublishOutcome::Regressed, Some(prev)) => {
                warn!(
                    watermark = %value,
                    previous = %prev.sequence,
                    "Watermark moved backwards"
                );
            }
            (PublishOutcome::Ignored, Some(prev)) => {
                warn!(
                    published = %value,
                    watermark = %prev.sequence,
                    "Ignoring publish below current watermark"
                );
            }
            _ => {}
        }

        outcome
    }

    /// Non-blocking snapshot of the current value; `None` while cold.
    pub fn current_value(&self) -> Option<SequenceNumber> {
        self.slot().map(|w| w.sequence)
    }

    /// Snapshot including when the value was recorded.
    pub fn current(&self) -> Option<Watermark> {
        *self.slot()
    }

    pub fn is_warm(&self) -> bool {
        self.slot().is_some()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Open a subscription that replays the current value (if any) and then
    /// yields every later publish.
    pub fn subscribe(&self) -> WatermarkSubscription {
        let slot = self.slot();
        let rx = self.tx.subscribe();
        WatermarkSubscription {
            replay: slot.map(|w| w.sequence),
            rx: Some(rx),
        }
    }

    /// [`subscribe`](Self::subscribe) as a `Stream`.
    pub fn updates(&self) -> impl Stream<Item = SequenceNumber> + Send + 'static {
        self.subscribe().into_stream()
    }
}

/// Live handle on the store's update feed.
///
/// Independent of every other subscription: closing or dropping one
/// affects nothing else.
#[derive(Debug)]
pub struct WatermarkSubscription {
    replay: Option<SequenceNumber>,
    rx: Option<broadcast::Receiver<SequenceNumber>>,
}

impl WatermarkSubscription {
    /// Wait for the next value. Returns `None` once closed or once the
    /// store is gone.
    pub async fn next(&mut self) -> Option<SequenceNumber> {
        if let Some(value) = self.replay.take() {
            return Some(value);
        }
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Watermark subscriber lagged, skipping to newer values");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Take an already-delivered value without waiting.
    pub fn try_next(&mut self) -> Option<SequenceNumber> {
        if let Some(value) = self.replay.take() {
            return Some(value);
        }
        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(value) => return Some(value),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Stop receiving. Pending values are discarded.
    pub fn close(&mut self) {
        self.replay = None;
        self.rx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.replay.is_none() && self.rx.is_none()
    }

    pub fn into_stream(mut self) -> impl Stream<Item = SequenceNumber> + Send + 'static {
        async_stream::stream! {
            while let Some(value) = self.next().await {
                yield value;
            }
        }
    }
}
