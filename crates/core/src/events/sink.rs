//! Event sink trait and implementations.

use std::sync::{Arc, Mutex};

use log::error;
use tokio::sync::mpsc;

use super::EventEnvelope;

/// Trait for receiving committed taxonomy events.
///
/// The command side emits through this trait after events are durably
/// appended and folded into the aggregate. The projection feed is one
/// implementation.
///
/// # Design Rules
///
/// - `emit()` must be fast and non-blocking (no network calls, no DB writes)
/// - Implementations should queue events for async processing
/// - Failure to emit must not affect the command outcome; the projection
///   catches up from the log
pub trait DomainEventSink: Send + Sync {
    /// Emit a single event.
    fn emit(&self, envelope: EventEnvelope);

    /// Emit multiple events, preserving order.
    fn emit_batch(&self, envelopes: Vec<EventEnvelope>) {
        for envelope in envelopes {
            self.emit(envelope);
        }
    }
}

/// No-op implementation for tests or contexts that don't need events.
#[derive(Clone, Default)]
pub struct NoOpDomainEventSink;

impl DomainEventSink for NoOpDomainEventSink {
    fn emit(&self, _envelope: EventEnvelope) {}
}

/// Mock sink for testing - collects emitted events.
#[derive(Clone, Default)]
pub struct MockDomainEventSink {
    envelopes: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl MockDomainEventSink {
    pub fn new() -> Self {
        Self {
            envelopes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns all collected events.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.envelopes.lock().unwrap().clone()
    }

    /// Clears collected events.
    pub fn clear(&self) {
        self.envelopes.lock().unwrap().clear();
    }

    /// Returns the number of collected events.
    pub fn len(&self) -> usize {
        self.envelopes.lock().unwrap().len()
    }

    /// Returns true if no events have been collected.
    pub fn is_empty(&self) -> bool {
        self.envelopes.lock().unwrap().is_empty()
    }
}

impl DomainEventSink for MockDomainEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        self.envelopes.lock().unwrap().push(envelope);
    }
}

/// Sink that forwards events to an unbounded channel drained by the
/// projection worker.
pub struct ChannelDomainEventSink {
    sender: mpsc::UnboundedSender<EventEnvelope>,
}

impl ChannelDomainEventSink {
    /// Creates the sink and the receiver the projection worker consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DomainEventSink for ChannelDomainEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        let aggregate_id = envelope.aggregate_id.clone();
        let sequence = envelope.sequence;
        if let Err(e) = self.sender.send(envelope) {
            error!(
                "taxonomy={} seq={} failed to forward event to projection feed: {}",
                aggregate_id, sequence, e
            );
        }
    }
}
