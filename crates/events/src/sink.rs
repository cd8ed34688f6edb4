//! Write-only event sinks.
//!
//! A sink is the injected observability port of the orchestrator: it sees
//! every envelope, never blocks a producer, and never reports errors back
//! into the run. The default is `NoopSink`; tests use `RecordingSink`;
//! `JsonlSink` gives a persistent append-only log.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::types::EventEnvelope;

/// Write-only observer of orchestration events.
///
/// `emit` is fire-and-forget: implementations must swallow their own errors
/// rather than letting them travel back into the orchestrator.
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: &EventEnvelope);
}

/// Sink that drops every event. Used when no observer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _envelope: &EventEnvelope) {}
}

/// Sink that keeps every envelope in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in emission order
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, envelope: &EventEnvelope) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(envelope.clone());
    }
}

/// Sink appending one JSON object per line to a log file.
///
/// The file (and its parent directory) is created lazily on the first emit.
/// IO and serialization errors are logged and dropped.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn open(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, envelope: &EventEnvelope) {
        let line = match serde_json::to_string(envelope) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize event for JSONL sink");
                return;
            }
        };

        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if guard.is_none() {
            match self.open() {
                Ok(file) => *guard = Some(file),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "failed to open JSONL event log");
                    return;
                }
            }
        }

        if let Some(file) = guard.as_mut() {
            if let Err(e) = writeln!(file, "{}", line) {
                warn!(path = %self.path.display(), error = %e, "failed to append to JSONL event log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TeamEvent;
    use tempfile::TempDir;

    fn envelope(sequence: u64) -> EventEnvelope {
        EventEnvelope::new(
            sequence,
            TeamEvent::TeamStart {
                team_name: "review".to_string(),
                agent_count: 1,
            },
        )
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        assert!(sink.is_empty());

        sink.emit(&envelope(0));
        sink.emit(&envelope(1));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 0);
        assert_eq!(events[1].sequence, 1);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("run.jsonl");
        let sink = JsonlSink::new(&path);

        sink.emit(&envelope(0));
        sink.emit(&envelope(1));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"team_start\""));

        // each line is standalone JSON
        let parsed: EventEnvelope = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.sequence, 1);
    }

    #[test]
    fn test_noop_sink_is_silent() {
        // nothing to observe; just exercise the path
        NoopSink.emit(&envelope(0));
    }
}
