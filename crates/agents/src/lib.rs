//! Agent workers: one model-backed preset executing a single task to
//! completion through an internal tool-calling loop.

pub mod error;
pub mod provider;
pub mod report;
pub mod tool;
pub mod worker;

pub use error::WorkerError;
pub use provider::{
    ApiKeyProvider, ChatMessage, EnvKeyProvider, ModelClient, ModelRequest, ModelResponse, Role,
    StopReason, ToolCall,
};
pub use report::{extract_json_block, parse_agent_report, AgentReport};
pub use tool::{Tool, ToolOutcome, ToolRegistry, ToolSchema};
pub use worker::{AgentWorker, LoopOutput, DEFAULT_MAX_TURNS};
