//! Tool execution boundary.
//!
//! Tools are named, schema-described callables the model can request during
//! an agent loop. A tool reports failure through `ToolOutcome::is_error`
//! rather than an error type — the outcome is fed back to the model either
//! way.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Schema advertised to the model for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A callable the model may request during its loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (what the model addresses it by)
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// Parameter JSON Schema advertised to the model. Defaults to an
    /// unconstrained object.
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// Execute with the model-supplied arguments. Long-running tools must
    /// watch the cancellation token and return promptly when it fires.
    async fn call(&self, args: Value, cancel: &CancellationToken) -> ToolOutcome;
}

/// Tool registry: stores `Arc<dyn Tool>` by name and dispatches calls.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas of every registered tool, name-sorted for a stable prompt.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Execute a requested call. Unknown tool names produce an error outcome
    /// fed back to the model, not a crash.
    pub async fn dispatch(
        &self,
        name: &str,
        args: Value,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        match self.tools.get(name) {
            Some(tool) => tool.call(args, cancel).await,
            None => {
                debug!(tool = %name, "model requested unknown tool");
                ToolOutcome::error(format!("unknown tool: {name}"))
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
