use thiserror::Error;

/// Errors that escape the agent worker boundary.
///
/// Everything the agent itself gets wrong is captured inside its
/// `AgentResult` instead; only cancellation and infrastructure faults
/// surface here.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The run was aborted through the cancellation signal.
    #[error("agent run cancelled")]
    Cancelled,

    #[error("credential lookup failed: {0}")]
    Credentials(String),

    #[error("model provider error: {0}")]
    Provider(String),
}

impl WorkerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }
}
