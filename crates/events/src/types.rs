//! Event types for team orchestration runs

use chrono::{DateTime, Utc};
use crew_core::{AgentResult, TeamResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping an event with delivery metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Monotonically increasing position within the run
    pub sequence: u64,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: TeamEvent,
}

impl EventEnvelope {
    /// Create a new envelope with auto-generated ID and timestamp
    pub fn new(sequence: u64, event: TeamEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Phases of a verification merge, in the order the engine runs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePhase {
    Parsing,
    Clustering,
    Verifying,
    Ranking,
    Synthesizing,
}

impl MergePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergePhase::Parsing => "parsing",
            MergePhase::Clustering => "clustering",
            MergePhase::Verifying => "verifying",
            MergePhase::Ranking => "ranking",
            MergePhase::Synthesizing => "synthesizing",
        }
    }
}

/// One lifecycle moment of a team run.
///
/// Events are immutable and form an append-only sequence per run: exactly one
/// `team_start` first, exactly one `team_end` last (unless the run fails
/// fatally), and per-agent events strictly ordered between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TeamEvent {
    /// The run was accepted and workers are about to launch
    TeamStart { team_name: String, agent_count: usize },

    /// Emitted immediately before an agent's first attempt
    AgentStart { agent_name: String, index: usize },

    /// An agent reached a terminal state (success or graceful failure)
    AgentEnd {
        agent_name: String,
        result: AgentResult,
    },

    /// An uncaught fault escaped the worker boundary on one attempt
    AgentError {
        agent_name: String,
        /// Zero-based attempt that faulted
        attempt: u32,
        will_retry: bool,
        message: String,
    },

    /// All agents are terminal; merging begins
    MergeStart,

    /// A verification merge phase is about to run
    MergeProgress { phase: MergePhase },

    /// The run completed and produced a result
    TeamEnd { result: TeamResult },
}

impl TeamEvent {
    /// Get the agent this event belongs to, if any
    pub fn agent_name(&self) -> Option<&str> {
        match self {
            TeamEvent::AgentStart { agent_name, .. } => Some(agent_name),
            TeamEvent::AgentEnd { agent_name, .. } => Some(agent_name),
            TeamEvent::AgentError { agent_name, .. } => Some(agent_name),
            TeamEvent::TeamStart { .. }
            | TeamEvent::MergeStart
            | TeamEvent::MergeProgress { .. }
            | TeamEvent::TeamEnd { .. } => None,
        }
    }

    /// True for the final event of a successful run
    pub fn is_terminal(&self) -> bool {
        matches!(self, TeamEvent::TeamEnd { .. })
    }
}
