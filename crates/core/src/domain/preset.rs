use serde::{Deserialize, Serialize};

/// Provider and model id pair identifying one model backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Provider id (e.g. "anthropic")
    pub provider: String,
    /// Model id (e.g. "claude-sonnet-4-20250514")
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// Sampling parameters forwarded verbatim to the model provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One model-backed agent configuration: system prompt, model reference and
/// sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPreset {
    pub name: String,
    pub model: ModelRef,
    pub system_prompt: String,
    #[serde(default)]
    pub sampling: SamplingParams,
}

impl AgentPreset {
    pub fn new(
        name: impl Into<String>,
        model: ModelRef,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            system_prompt: system_prompt.into(),
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }
}
