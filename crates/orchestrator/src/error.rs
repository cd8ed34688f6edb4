use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Orchestration could not start; no agent was launched.
    #[error("team setup failed: {0}")]
    Setup(#[from] crew_core::CoreError),

    /// The merge engine failed unrecoverably; the run produced no result.
    #[error("merge failed: {0}")]
    Merge(String),

    /// The run driver terminated without reporting a result.
    #[error("team run interrupted before completion")]
    Interrupted,

    /// The lead analyzer could not produce a usable team selection.
    #[error("team selection failed: {0}")]
    SelectionFailed(String),

    #[error("unknown agent preset: {0}")]
    UnknownPreset(String),

    #[error("catalog error: {0}")]
    Catalog(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_wraps_core_error() {
        let core = crew_core::CoreError::EmptyTeam {
            team: "review".to_string(),
        };
        let err: OrchestratorError = core.into();
        assert!(err.to_string().contains("team setup failed"));
        assert!(err.to_string().contains("review"));
    }
}
