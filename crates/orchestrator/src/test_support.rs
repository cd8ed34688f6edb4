//! Shared mock collaborators for orchestrator tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use agents::{ApiKeyProvider, ModelClient, ModelRequest, ModelResponse, WorkerError};
use async_trait::async_trait;
use crew_core::{AgentPreset, ModelRef, TokenUsage};

pub(crate) struct StaticKeys;

impl ApiKeyProvider for StaticKeys {
    fn api_key(&self, _provider: &str) -> Result<String, WorkerError> {
        Ok("test-key".to_string())
    }
}

/// Per-agent scripted behavior, keyed by the preset's system prompt.
#[derive(Clone)]
pub(crate) enum Script {
    /// Immediately answer with this final text.
    Text(String),
    /// Answer cut off at the provider token limit (a graceful failure).
    Truncated(String),
    /// Fault with a provider error on every attempt.
    Fault(String),
    /// Never answer; resolves only through cancellation.
    Hang,
}

pub(crate) struct ScriptedClient {
    scripts: HashMap<String, Script>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<(&str, Script)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(key, script)| (key.to_string(), script))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Total model invocations across all agents.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(&request.system_prompt)
            .cloned()
            .unwrap_or_else(|| Script::Text("{}".to_string()));
        match script {
            Script::Text(text) => Ok(ModelResponse::text(text, TokenUsage::new(10, 5))),
            Script::Truncated(text) => {
                let mut response = ModelResponse::text(text, TokenUsage::new(10, 5));
                response.stop_reason = agents::StopReason::MaxTokens;
                Ok(response)
            }
            Script::Fault(message) => Err(WorkerError::Provider(message)),
            Script::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Preset whose system prompt doubles as the script key.
pub(crate) fn preset(name: &str) -> AgentPreset {
    AgentPreset::new(name, ModelRef::new("anthropic", "claude-sonnet-4"), name)
}

/// Render a minimal findings report for a scripted agent.
pub(crate) fn report(findings: &[(&str, &str)]) -> String {
    let items: Vec<String> = findings
        .iter()
        .map(|(severity, title)| format!(r#"{{"title": "{title}", "severity": "{severity}"}}"#))
        .collect();
    format!(r#"{{"summary": "done", "findings": [{}]}}"#, items.join(","))
}
