pub mod domain;
pub mod error;

pub use domain::finding::{Finding, FindingOrigin, Severity};
pub use domain::preset::{AgentPreset, ModelRef, SamplingParams};
pub use domain::result::{AgentResult, FindingCluster, TeamResult, TokenUsage};
pub use domain::team::{ExecutionStrategy, MergePolicy, MergeStrategy, TeamConfig};
pub use error::CoreError;
