//! Lifecycle events for team orchestration runs: the `TeamEvent` sum type,
//! a broadcast bus for multi-observer fan-out, and write-only sinks.

pub mod bus;
pub mod sink;
pub mod types;

pub use bus::EventBus;
pub use sink::{EventSink, JsonlSink, NoopSink, RecordingSink};
pub use types::{EventEnvelope, MergePhase, TeamEvent};
