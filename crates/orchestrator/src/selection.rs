//! Lead analyzer: a control-plane agent that inspects the project and
//! decides which teams to run for a free-text intent, optionally staged
//! into execution waves.

use std::sync::Arc;

use agents::{AgentWorker, ApiKeyProvider, ModelClient, ToolRegistry};
use crew_core::AgentPreset;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::prompts::SelectionPrompt;
use crate::selection_parser;

/// How deep the analyzer should look before deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl AnalysisDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDepth::Quick => "quick",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Deep => "deep",
        }
    }
}

/// What the caller wants analyzed.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub intent: String,
    pub scope: Option<String>,
    pub depth: AnalysisDepth,
    pub focus: Option<String>,
    pub project_context: Option<String>,
}

impl SelectionRequest {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            scope: None,
            depth: AnalysisDepth::default(),
            focus: None,
            project_context: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_depth(mut self, depth: AnalysisDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_focus(mut self, focus: impl Into<String>) -> Self {
        self.focus = Some(focus.into());
        self
    }

    pub fn with_project_context(mut self, context: impl Into<String>) -> Self {
        self.project_context = Some(context.into());
        self
    }
}

/// The analyzer's structured decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSelection {
    pub selected_teams: Vec<String>,
    /// Staged execution: sequential by wave, parallel within a wave.
    pub execution_waves: Vec<Vec<String>>,
    pub reasoning: String,
}

/// Single agent invocation that selects teams for an intent.
pub struct LeadAnalyzer {
    worker: AgentWorker,
    preset: AgentPreset,
    known_teams: Vec<String>,
}

impl LeadAnalyzer {
    pub fn new(
        model: Arc<dyn ModelClient>,
        keys: Arc<dyn ApiKeyProvider>,
        preset: AgentPreset,
        known_teams: Vec<String>,
    ) -> Self {
        Self {
            worker: AgentWorker::new(model, keys),
            preset,
            known_teams,
        }
    }

    /// Run the analyzer and parse its decision: strict JSON first, markdown
    /// fallback second. Both failing is a selection fault, distinct from
    /// worker and run faults so the caller can ask the user to rephrase.
    pub async fn select_teams(
        &self,
        request: &SelectionRequest,
        tools: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Result<TeamSelection> {
        let prompt = SelectionPrompt::build(request, &self.known_teams);
        let output = self
            .worker
            .run_raw(&self.preset, &prompt, tools, cancel)
            .await
            .map_err(|e| {
                OrchestratorError::SelectionFailed(format!("lead analyzer did not complete: {e}"))
            })?;

        let selection = self.parse_selection(&output.text)?;
        info!(
            teams = ?selection.selected_teams,
            waves = selection.execution_waves.len(),
            "lead analyzer selected teams"
        );
        Ok(selection)
    }

    fn parse_selection(&self, text: &str) -> Result<TeamSelection> {
        if let Some(selection) = selection_parser::parse_structured(text, &self.known_teams) {
            return Ok(selection);
        }

        debug!("structured selection parse failed, trying markdown fallback");
        let teams = selection_parser::extract_known_teams(text, &self.known_teams);
        if teams.is_empty() {
            return Err(OrchestratorError::SelectionFailed(
                "the analyzer named no known team; rephrase the request or pick teams explicitly"
                    .to_string(),
            ));
        }

        Ok(TeamSelection {
            execution_waves: vec![teams.clone()],
            selected_teams: teams,
            reasoning: text.trim().to_string(),
        })
    }
}
