//! The agent worker: one preset, one task, one structured result.
//!
//! A worker is unaware of siblings and shares no mutable state with them;
//! everything it needs arrives by value or behind an `Arc` at construction.

use std::sync::Arc;
use std::time::Instant;

use crew_core::{AgentPreset, AgentResult, TokenUsage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::provider::{ApiKeyProvider, ChatMessage, ModelClient, ModelRequest, StopReason};
use crate::report::parse_agent_report;
use crate::tool::ToolRegistry;

/// Default round-trip budget for one agent run.
pub const DEFAULT_MAX_TURNS: usize = 8;

/// Terminal output of the internal agent loop.
#[derive(Debug)]
pub struct LoopOutput {
    /// Final text the model produced; empty when the budget ran out.
    pub text: String,
    pub usage: TokenUsage,
    /// Round trips actually performed.
    pub turns: usize,
    /// The loop hit its turn budget without a final answer.
    pub budget_exhausted: bool,
    /// The final answer was cut off at the provider's token limit.
    pub truncated: bool,
}

/// Executes one preset against one task through an agent loop: send the
/// transcript, execute any requested tools, repeat until the model answers
/// or the budget runs out.
pub struct AgentWorker {
    model: Arc<dyn ModelClient>,
    keys: Arc<dyn ApiKeyProvider>,
    max_turns: usize,
}

impl AgentWorker {
    pub fn new(model: Arc<dyn ModelClient>, keys: Arc<dyn ApiKeyProvider>) -> Self {
        Self {
            model,
            keys,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Run the agent and normalize its report into an `AgentResult`.
    ///
    /// Failures the agent caused itself (budget exhausted, truncated answer)
    /// come back as `Ok` with `success: false`; only cancellation and
    /// infrastructure faults are `Err`.
    pub async fn run(
        &self,
        preset: &AgentPreset,
        task: &str,
        tools: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Result<AgentResult, WorkerError> {
        let started = Instant::now();
        let output = self.run_raw(preset, task, tools, cancel).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        if output.budget_exhausted {
            return Ok(AgentResult::failure(
                &preset.name,
                format!("no final answer after {} turns", output.turns),
                output.usage,
                duration_ms,
            ));
        }
        if output.truncated {
            return Ok(AgentResult::failure(
                &preset.name,
                "final answer truncated at the provider token limit",
                output.usage,
                duration_ms,
            ));
        }

        let report = parse_agent_report(&preset.name, &output.text);
        info!(
            agent = %preset.name,
            findings = report.findings.len(),
            turns = output.turns,
            duration_ms,
            "agent run complete"
        );

        Ok(AgentResult::success(
            &preset.name,
            report.findings,
            report.summary,
            output.usage,
            duration_ms,
        ))
    }

    /// Run the agent loop and return its terminal text untouched. Used by
    /// callers that parse their own structure out of the answer.
    pub async fn run_raw(
        &self,
        preset: &AgentPreset,
        task: &str,
        tools: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Result<LoopOutput, WorkerError> {
        let api_key = self.keys.api_key(&preset.model.provider)?;
        let schemas = tools.schemas();
        let mut messages = vec![ChatMessage::user(task)];
        let mut usage = TokenUsage::default();

        for turn in 0..self.max_turns {
            if cancel.is_cancelled() {
                return Err(WorkerError::Cancelled);
            }

            let request = ModelRequest {
                model: preset.model.clone(),
                system_prompt: preset.system_prompt.clone(),
                messages: messages.clone(),
                tools: schemas.clone(),
                sampling: preset.sampling.clone(),
                api_key: api_key.clone(),
            };

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(WorkerError::Cancelled),
                result = self.model.invoke(request) => result?,
            };
            usage.add(response.usage);

            if response.tool_calls.is_empty() {
                let truncated = response.stop_reason == StopReason::MaxTokens;
                return Ok(LoopOutput {
                    text: response.content,
                    usage,
                    turns: turn + 1,
                    budget_exhausted: false,
                    truncated,
                });
            }

            debug!(
                agent = %preset.name,
                turn,
                calls = response.tool_calls.len(),
                "executing requested tools"
            );
            messages.push(ChatMessage::assistant_with_calls(
                response.content,
                response.tool_calls.clone(),
            ));

            for call in response.tool_calls {
                if cancel.is_cancelled() {
                    return Err(WorkerError::Cancelled);
                }
                let outcome = tools.dispatch(&call.name, call.arguments, cancel).await;
                if outcome.is_error {
                    warn!(agent = %preset.name, tool = %call.name, "tool returned an error");
                }
                let content = if outcome.is_error {
                    format!("tool error: {}", outcome.content)
                } else {
                    outcome.content
                };
                messages.push(ChatMessage::tool_result(call.id, content));
            }
        }

        warn!(
            agent = %preset.name,
            max_turns = self.max_turns,
            "turn budget exhausted without a final answer"
        );
        Ok(LoopOutput {
            text: String::new(),
            usage,
            turns: self.max_turns,
            budget_exhausted: true,
            truncated: false,
        })
    }
}
