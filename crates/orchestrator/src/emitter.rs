//! Sequenced event emission with non-blocking fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use events::{EventBus, EventEnvelope, EventSink, TeamEvent};
use tokio::sync::mpsc;

/// Fans one run's events out to the caller stream, the optional broadcast
/// bus, and the configured sink, stamping a monotonically increasing
/// sequence number on each envelope.
///
/// Every destination is non-blocking, so a slow observer can never stall a
/// producing worker task. Clones share the sequence counter; events from
/// different agents interleave, but each agent emits its own events in
/// order.
#[derive(Clone)]
pub struct TeamEventEmitter {
    stream: mpsc::UnboundedSender<TeamEvent>,
    bus: Option<EventBus>,
    sink: Arc<dyn EventSink>,
    sequence: Arc<AtomicU64>,
}

impl TeamEventEmitter {
    pub fn new(
        stream: mpsc::UnboundedSender<TeamEvent>,
        bus: Option<EventBus>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            stream,
            bus,
            sink,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to every destination.
    pub fn emit(&self, event: TeamEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope::new(sequence, event.clone());

        self.sink.emit(&envelope);
        if let Some(ref bus) = self.bus {
            bus.publish(envelope);
        }
        // A closed receiver means the caller dropped the stream; the run
        // still finishes and reports through the deferred result.
        let _ = self.stream.send(event);
    }

    /// Number of events emitted so far.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
