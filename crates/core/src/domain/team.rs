use serde::{Deserialize, Serialize};

use crate::domain::preset::AgentPreset;
use crate::error::CoreError;

/// How the agents of a team are scheduled.
///
/// Only parallel execution exists at this layer: every worker runs
/// concurrently, bounded by nothing but the team size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    #[default]
    Parallel,
}

/// How the workers' findings are combined into one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Concatenate and severity-sort. No dedup, no LLM call.
    #[default]
    Union,
    /// Cluster, cross-check, rank and synthesize.
    Verification,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Union => "union",
            MergeStrategy::Verification => "verification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "union" => Some(MergeStrategy::Union),
            "verification" => Some(MergeStrategy::Verification),
            _ => None,
        }
    }
}

/// Merge policy for a team: the strategy plus an optional dedicated merge
/// agent used by verification merging.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergePolicy {
    #[serde(default)]
    pub strategy: MergeStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_agent: Option<AgentPreset>,
}

impl MergePolicy {
    pub fn union() -> Self {
        Self {
            strategy: MergeStrategy::Union,
            merge_agent: None,
        }
    }

    pub fn verification() -> Self {
        Self {
            strategy: MergeStrategy::Verification,
            merge_agent: None,
        }
    }

    pub fn with_merge_agent(mut self, preset: AgentPreset) -> Self {
        self.merge_agent = Some(preset);
        self
    }
}

fn default_continue_on_error() -> bool {
    true
}

fn default_max_retries() -> u32 {
    1
}

/// Input contract for one orchestration run. Immutable for the duration of
/// the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    pub agents: Vec<AgentPreset>,
    #[serde(default)]
    pub strategy: ExecutionStrategy,
    #[serde(default)]
    pub merge: MergePolicy,
    /// Retries per agent for uncaught worker faults. Agents that complete
    /// with `success: false` are final and never retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// When false, the first agent failure stops the agents still waiting
    /// and the run merges whatever completed.
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
}

impl TeamConfig {
    pub fn new(name: impl Into<String>, agents: Vec<AgentPreset>) -> Self {
        Self {
            name: name.into(),
            agents,
            strategy: ExecutionStrategy::Parallel,
            merge: MergePolicy::union(),
            max_retries: default_max_retries(),
            continue_on_error: default_continue_on_error(),
        }
    }

    pub fn with_merge(mut self, merge: MergePolicy) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Reject configurations the orchestrator cannot run: empty teams and
    /// duplicate agent names (events are keyed by agent name).
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.agents.is_empty() {
            return Err(CoreError::EmptyTeam {
                team: self.name.clone(),
            });
        }
        for (i, agent) in self.agents.iter().enumerate() {
            if self.agents[..i].iter().any(|a| a.name == agent.name) {
                return Err(CoreError::DuplicateAgent {
                    team: self.name.clone(),
                    name: agent.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::preset::ModelRef;

    fn preset(name: &str) -> AgentPreset {
        AgentPreset::new(name, ModelRef::new("anthropic", "claude-sonnet-4"), "prompt")
    }

    #[test]
    fn test_config_defaults() {
        let config = TeamConfig::new("review", vec![preset("a")]);

        assert_eq!(config.strategy, ExecutionStrategy::Parallel);
        assert_eq!(config.merge.strategy, MergeStrategy::Union);
        assert_eq!(config.max_retries, 1);
        assert!(config.continue_on_error);
    }

    #[test]
    fn test_validate_empty_team() {
        let config = TeamConfig::new("empty", Vec::new());
        assert!(matches!(
            config.validate(),
            Err(CoreError::EmptyTeam { .. })
        ));
    }

    #[test]
    fn test_validate_duplicate_agent() {
        let config = TeamConfig::new("dup", vec![preset("a"), preset("b"), preset("a")]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn test_merge_strategy_parse() {
        assert_eq!(MergeStrategy::parse("union"), Some(MergeStrategy::Union));
        assert_eq!(
            MergeStrategy::parse("verification"),
            Some(MergeStrategy::Verification)
        );
        assert_eq!(MergeStrategy::parse("majority"), None);
    }

    #[test]
    fn test_config_deserialization_fills_defaults() {
        let json = r#"{
            "name": "security",
            "agents": [{
                "name": "auditor",
                "model": {"provider": "anthropic", "model": "claude-sonnet-4"},
                "system_prompt": "Audit."
            }]
        }"#;

        let config: TeamConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "security");
        assert_eq!(config.max_retries, 1);
        assert!(config.continue_on_error);
        assert_eq!(config.merge.strategy, MergeStrategy::Union);
        assert!(config.validate().is_ok());
    }
}
