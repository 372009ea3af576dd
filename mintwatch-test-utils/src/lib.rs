//! MintWatch Test Utilities
//!
//! Shared test infrastructure for the mintwatch workspace:
//! - Mock counter source with scripted responses and a hold gate
//! - Mock event feed backed by a channel
//! - Proptest generators for core types
//! - Address fixtures

pub use mintwatch_core::{
    Address, CounterSource, EventFeed, FeedError, MintWatchError, SequenceNumber, SourceError,
    TransferEvent, TransferStream,
};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

// ============================================================================
// MOCK COUNTER SOURCE
// ============================================================================

/// What a mock counter query does when called.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Count(u64),
    Fail(SourceError),
    Panic,
}

/// Counter source for tests.
///
/// Answers from a queue of scripted responses, then from a fallback. Every
/// call is counted on entry, so a call held at the gate is already visible
/// through [`calls`](Self::calls).
#[derive(Debug)]
pub struct MockCounterSource {
    scripted: Mutex<VecDeque<MockResponse>>,
    fallback: Mutex<MockResponse>,
    calls: AtomicUsize,
    gate: Option<watch::Sender<bool>>,
    delay: Option<Duration>,
}

impl MockCounterSource {
    fn with_fallback(fallback: MockResponse) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            calls: AtomicUsize::new(0),
            gate: None,
            delay: None,
        }
    }

    pub fn returning(count: u64) -> Self {
        Self::with_fallback(MockResponse::Count(count))
    }

    pub fn failing(error: SourceError) -> Self {
        Self::with_fallback(MockResponse::Fail(error))
    }

    pub fn panicking() -> Self {
        Self::with_fallback(MockResponse::Panic)
    }

    /// Hold every call until [`release`](Self::release) is called.
    pub fn gated(mut self) -> Self {
        let (tx, _rx) = watch::channel(false);
        self.gate = Some(tx);
        self
    }

    /// Sleep before answering (after the gate, if any).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Open the gate. Calls already waiting and all later calls proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.send_replace(true);
        }
    }

    /// Answer the next call with `response`, ahead of the fallback.
    pub fn push_response(&self, response: MockResponse) {
        self.scripted
            .lock()
            .expect("mock lock poisoned")
            .push_back(response);
    }

    /// Replace the fallback with a successful count.
    pub fn set_count(&self, count: u64) {
        *self.fallback.lock().expect("mock lock poisoned") = MockResponse::Count(count);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> MockResponse {
        let scripted = self
            .scripted
            .lock()
            .expect("mock lock poisoned")
            .pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().expect("mock lock poisoned").clone())
    }
}

#[async_trait]
impl CounterSource for MockCounterSource {
    async fn current_count(&self) -> Result<SequenceNumber, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let mut rx = gate.subscribe();
            rx.wait_for(|open| *open)
                .await
                .expect("gate sender lives as long as the mock");
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_response() {
            MockResponse::Count(count) => Ok(SequenceNumber::new(count)),
            MockResponse::Fail(error) => Err(error),
            MockResponse::Panic => panic!("mock counter source panicked"),
        }
    }
}

// ============================================================================
// MOCK EVENT FEED
// ============================================================================

type FeedItem = Result<TransferEvent, FeedError>;

/// Transfer stream that flags its release when dropped.
struct GuardedStream {
    inner: UnboundedReceiverStream<FeedItem>,
    released: Arc<AtomicBool>,
}

impl Stream for GuardedStream {
    type Item = FeedItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FeedItem>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for GuardedStream {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Channel-backed event feed for tests.
///
/// Supports a single subscription. Events emitted before subscribing are
/// buffered and delivered once the stream is polled.
pub struct MockEventFeed {
    tx: Mutex<Option<mpsc::UnboundedSender<FeedItem>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<FeedItem>>>,
    refusal: Option<FeedError>,
    released: Arc<AtomicBool>,
}

impl Default for MockEventFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEventFeed {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            refusal: None,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A feed whose `subscribe` always fails with `error`.
    pub fn refusing(error: FeedError) -> Self {
        Self {
            refusal: Some(error),
            ..Self::new()
        }
    }

    pub fn emit(&self, event: TransferEvent) {
        self.send(Ok(event));
    }

    /// Emit a mint of `token_id` to a fixed holder.
    pub fn mint(&self, token_id: u64) {
        self.emit(TransferEvent::mint(holder(1), token_id));
    }

    pub fn transfer(&self, from: Address, to: Address, token_id: u64) {
        self.emit(TransferEvent::new(from, to, token_id));
    }

    /// Deliver a feed error; the stream stays open afterwards.
    pub fn fail(&self, error: FeedError) {
        self.send(Err(error));
    }

    /// End the stream once buffered events are drained.
    pub fn close(&self) {
        self.tx.lock().expect("mock lock poisoned").take();
    }

    pub fn is_subscribed(&self) -> bool {
        self.rx.lock().expect("mock lock poisoned").is_none()
    }

    /// Whether the subscriber dropped its stream.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn send(&self, item: FeedItem) {
        if let Some(tx) = self.tx.lock().expect("mock lock poisoned").as_ref() {
            // A released subscriber simply misses the event.
            let _ = tx.send(item);
        }
    }
}

#[async_trait]
impl EventFeed for MockEventFeed {
    async fn subscribe(&self) -> Result<TransferStream, FeedError> {
        if let Some(error) = &self.refusal {
            return Err(error.clone());
        }
        let rx = self
            .rx
            .lock()
            .expect("mock lock poisoned")
            .take()
            .ok_or_else(|| FeedError::SubscribeFailed {
                reason: "mock feed supports a single subscription".to_string(),
            })?;
        Ok(GuardedStream {
            inner: UnboundedReceiverStream::new(rx),
            released: Arc::clone(&self.released),
        }
        .boxed())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Small values, so generated sequences collide and reorder often.
    pub fn arb_small_sequence_number() -> impl Strategy<Value = SequenceNumber> {
        (0u64..64).prop_map(SequenceNumber::new)
    }

    pub fn arb_address() -> impl Strategy<Value = Address> {
        any::<[u8; 20]>().prop_map(Address::from_bytes)
    }

    pub fn arb_holder_address() -> impl Strategy<Value = Address> {
        arb_address().prop_filter("holders are never the null address", |a| !a.is_zero())
    }

    pub fn arb_mint() -> impl Strategy<Value = TransferEvent> {
        (arb_holder_address(), arb_small_sequence_number())
            .prop_map(|(to, id)| TransferEvent::mint(to, id))
    }

    pub fn arb_ownership_transfer() -> impl Strategy<Value = TransferEvent> {
        (
            arb_holder_address(),
            arb_holder_address(),
            arb_small_sequence_number(),
        )
            .prop_map(|(from, to, id)| TransferEvent::new(from, to, id))
    }

    /// A feed's worth of events, mixing mints and ownership transfers.
    pub fn arb_transfer_events(max_len: usize) -> impl Strategy<Value = Vec<TransferEvent>> {
        prop::collection::vec(
            prop_oneof![3 => arb_mint(), 1 => arb_ownership_transfer()],
            0..max_len,
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

/// A deterministic non-null address distinguished by its last byte.
pub fn holder(n: u8) -> Address {
    let mut bytes = [0x11u8; 20];
    bytes[19] = n;
    Address::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_then_fallback() {
        let source = MockCounterSource::returning(9);
        source.push_response(MockResponse::Fail(SourceError::Unavailable {
            reason: "flaky".to_string(),
        }));
        source.push_response(MockResponse::Count(3));

        assert!(source.current_count().await.is_err());
        assert_eq!(source.current_count().await.unwrap(), SequenceNumber::new(3));
        assert_eq!(source.current_count().await.unwrap(), SequenceNumber::new(9));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_second_subscription_is_refused() {
        let feed = MockEventFeed::new();
        let _stream = feed.subscribe().await.unwrap();
        assert!(matches!(
            feed.subscribe().await,
            Err(FeedError::SubscribeFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_buffered_events_and_release() {
        let feed = MockEventFeed::new();
        feed.mint(4);
        let mut stream = feed.subscribe().await.unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert!(event.is_mint());
        assert_eq!(event.token_id, SequenceNumber::new(4));

        assert!(!feed.is_released());
        drop(stream);
        assert!(feed.is_released());
    }

    #[test]
    fn test_holder_is_never_null() {
        assert!(!holder(0).is_zero());
        assert_ne!(holder(1), holder(2));
    }
}
