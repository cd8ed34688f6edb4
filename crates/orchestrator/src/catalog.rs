//! Preset and team catalog lookup.
//!
//! The orchestrator consumes the catalog through the `PresetCatalog` trait;
//! `StaticCatalog` is the in-memory implementation, optionally populated
//! from a TOML document.

use std::collections::HashMap;

use crew_core::{
    AgentPreset, MergePolicy, MergeStrategy, ModelRef, SamplingParams, TeamConfig,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::{OrchestratorError, Result};

/// Catalog boundary: resolve presets and team definitions by name.
pub trait PresetCatalog: Send + Sync {
    fn resolve_preset(&self, name: &str) -> Option<AgentPreset>;
    fn resolve_team(&self, name: &str) -> Option<TeamConfig>;
    /// Known team names, sorted, for the lead analyzer.
    fn team_names(&self) -> Vec<String>;
}

/// In-memory catalog.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    presets: HashMap<String, AgentPreset>,
    teams: HashMap<String, TeamConfig>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    presets: HashMap<String, RawPreset>,
    #[serde(default)]
    teams: HashMap<String, RawTeam>,
}

#[derive(Debug, Deserialize)]
struct RawPreset {
    provider: String,
    model: String,
    system_prompt: String,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    top_p: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawTeam {
    agents: Vec<String>,
    #[serde(default)]
    merge: Option<String>,
    #[serde(default)]
    merge_agent: Option<String>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    continue_on_error: Option<bool>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_preset(&mut self, preset: AgentPreset) {
        self.presets.insert(preset.name.clone(), preset);
    }

    pub fn insert_team(&mut self, team: TeamConfig) {
        self.teams.insert(team.name.clone(), team);
    }

    /// Build a team config out of preset names, failing on unknown names.
    pub fn build_team(
        &self,
        name: impl Into<String>,
        agent_names: &[&str],
        merge: MergePolicy,
    ) -> Result<TeamConfig> {
        let mut agents = Vec::with_capacity(agent_names.len());
        for agent_name in agent_names {
            let preset = self
                .resolve_preset(agent_name)
                .ok_or_else(|| OrchestratorError::UnknownPreset((*agent_name).to_string()))?;
            agents.push(preset);
        }
        Ok(TeamConfig::new(name, agents).with_merge(merge))
    }

    /// Load presets and teams from a TOML document.
    ///
    /// ```toml
    /// [presets.rust-auditor]
    /// provider = "anthropic"
    /// model = "claude-sonnet-4-20250514"
    /// system_prompt = "Audit Rust code for memory and concurrency issues."
    /// temperature = 0.2
    ///
    /// [teams.security-audit]
    /// agents = ["rust-auditor"]
    /// merge = "verification"
    /// merge_agent = "arbiter"
    /// ```
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(input)
            .map_err(|e| OrchestratorError::Catalog(format!("invalid catalog TOML: {e}")))?;

        let mut catalog = Self::new();
        for (name, raw) in file.presets {
            let preset = AgentPreset::new(
                name,
                ModelRef::new(raw.provider, raw.model),
                raw.system_prompt,
            )
            .with_sampling(SamplingParams {
                temperature: raw.temperature,
                top_p: raw.top_p,
                max_tokens: raw.max_tokens,
            });
            catalog.insert_preset(preset);
        }

        for (name, raw) in file.teams {
            let mut agents = Vec::with_capacity(raw.agents.len());
            for agent_name in &raw.agents {
                let preset = catalog
                    .resolve_preset(agent_name)
                    .ok_or_else(|| OrchestratorError::UnknownPreset(agent_name.clone()))?;
                agents.push(preset);
            }

            let strategy = match raw.merge.as_deref() {
                None => MergeStrategy::Union,
                Some(label) => MergeStrategy::parse(label).ok_or_else(|| {
                    OrchestratorError::Catalog(format!(
                        "team '{name}' has unknown merge strategy '{label}'"
                    ))
                })?,
            };
            let mut merge = MergePolicy {
                strategy,
                merge_agent: None,
            };
            if let Some(ref merge_agent) = raw.merge_agent {
                let preset = catalog
                    .resolve_preset(merge_agent)
                    .ok_or_else(|| OrchestratorError::UnknownPreset(merge_agent.clone()))?;
                merge = merge.with_merge_agent(preset);
            }

            let mut team = TeamConfig::new(name, agents).with_merge(merge);
            if let Some(max_retries) = raw.max_retries {
                team = team.with_max_retries(max_retries);
            }
            if let Some(continue_on_error) = raw.continue_on_error {
                team = team.with_continue_on_error(continue_on_error);
            }
            team.validate().map_err(OrchestratorError::Setup)?;
            catalog.insert_team(team);
        }

        debug!(
            presets = catalog.presets.len(),
            teams = catalog.teams.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }
}

impl PresetCatalog for StaticCatalog {
    fn resolve_preset(&self, name: &str) -> Option<AgentPreset> {
        self.presets.get(name).cloned()
    }

    fn resolve_team(&self, name: &str) -> Option<TeamConfig> {
        self.teams.get(name).cloned()
    }

    fn team_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.teams.keys().cloned().collect();
        names.sort();
        names
    }
}
