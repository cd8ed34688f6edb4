use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::finding::Finding;

/// Token counters reported by the model provider, accumulated across round
/// trips and agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
    }
}

/// Outcome of one agent worker. Created once when the worker finishes
/// (successfully or not) and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub success: bool,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Captured failure message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub usage: TokenUsage,
    pub duration_ms: u64,
}

impl AgentResult {
    /// A completed run with whatever the agent reported.
    pub fn success(
        agent_name: impl Into<String>,
        findings: Vec<Finding>,
        summary: Option<String>,
        usage: TokenUsage,
        duration_ms: u64,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            success: true,
            findings,
            summary,
            error: None,
            usage,
            duration_ms,
        }
    }

    /// A run that ended in failure, with the captured error message.
    pub fn failure(
        agent_name: impl Into<String>,
        error: impl Into<String>,
        usage: TokenUsage,
        duration_ms: u64,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            success: false,
            findings: Vec::new(),
            summary: None,
            error: Some(error.into()),
            usage,
            duration_ms,
        }
    }

    pub fn finding_count(&self) -> usize {
        self.findings.len()
    }
}

/// A group of findings judged to describe the same underlying issue.
///
/// Members are severity-ordered; the first entry is the cluster's
/// representative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingCluster {
    pub id: String,
    pub findings: Vec<Finding>,
    /// Optional verdict note from the merge agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl FindingCluster {
    pub fn new(id: impl Into<String>, findings: Vec<Finding>) -> Self {
        Self {
            id: id.into(),
            findings,
            note: None,
        }
    }

    pub fn representative(&self) -> Option<&Finding> {
        self.findings.first()
    }

    pub fn is_singleton(&self) -> bool {
        self.findings.len() == 1
    }
}

/// Final aggregate of one team run. Created exactly once, at the end;
/// immutable thereafter and owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamResult {
    pub team_name: String,
    pub agent_results: Vec<AgentResult>,
    /// Merged findings, non-decreasing in severity rank.
    pub findings: Vec<Finding>,
    /// Populated only by verification merging.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<FindingCluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub total_usage: TokenUsage,
    pub duration_ms: u64,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
}

impl TeamResult {
    /// Assemble the aggregate. `success` requires at least one agent result
    /// and all of them successful; `total_usage` sums the per-agent usage.
    pub fn new(
        team_name: impl Into<String>,
        agent_results: Vec<AgentResult>,
        findings: Vec<Finding>,
        clusters: Vec<FindingCluster>,
        summary: Option<String>,
        duration_ms: u64,
    ) -> Self {
        let mut total_usage = TokenUsage::default();
        for result in &agent_results {
            total_usage.add(result.usage);
        }
        let success = !agent_results.is_empty() && agent_results.iter().all(|r| r.success);

        Self {
            team_name: team_name.into(),
            agent_results,
            findings,
            clusters,
            summary,
            total_usage,
            duration_ms,
            success,
            completed_at: Utc::now(),
        }
    }

    /// Number of agents whose result is a failure.
    pub fn failed_agent_count(&self) -> usize {
        self.agent_results.iter().filter(|r| !r.success).count()
    }
}
