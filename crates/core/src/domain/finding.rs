use serde::{Deserialize, Serialize};

/// Severity of a finding.
///
/// The ordering is total and fixed: `Critical` sorts first, `Unknown` last.
/// Variant order matters — `Ord` derives from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Unknown,
}

impl Severity {
    /// Fixed sort rank: critical=0, high=1, medium=2, low=3, info=4, unknown=5.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
            Severity::Unknown => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }

    /// Parse a severity label, case-insensitively. Unrecognized labels map to
    /// `Unknown` rather than failing — agent output is not trusted to be
    /// well-formed.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "info" => Severity::Info,
            _ => Severity::Unknown,
        }
    }

    /// One step down the scale. `Info` and `Unknown` stay where they are.
    pub fn demoted(&self) -> Self {
        match self {
            Severity::Critical => Severity::High,
            Severity::High => Severity::Medium,
            Severity::Medium => Severity::Low,
            Severity::Low => Severity::Info,
            Severity::Info => Severity::Info,
            Severity::Unknown => Severity::Unknown,
        }
    }
}

/// Where a finding came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingOrigin {
    /// Reported by a named agent worker.
    Agent { name: String },
    /// Synthesized by the merge agent during verification.
    Merge,
}

impl FindingOrigin {
    pub fn agent(name: impl Into<String>) -> Self {
        FindingOrigin::Agent { name: name.into() }
    }
}

/// One normalized observation reported by an agent.
///
/// Immutable once created; ownership moves to the aggregated `TeamResult`
/// when the run is merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub origin: FindingOrigin,
}

impl Finding {
    pub fn new(
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        origin: FindingOrigin,
    ) -> Self {
        Self {
            severity,
            title: title.into(),
            description: description.into(),
            file: None,
            line_start: None,
            line_end: None,
            category: None,
            suggestion: None,
            origin,
        }
    }

    pub fn with_location(
        mut self,
        file: impl Into<String>,
        line_start: Option<u32>,
        line_end: Option<u32>,
    ) -> Self {
        self.file = Some(file.into());
        self.line_start = line_start;
        self.line_end = line_end;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Name of the agent that reported this finding, if agent-originated.
    pub fn agent_name(&self) -> Option<&str> {
        match &self.origin {
            FindingOrigin::Agent { name } => Some(name),
            FindingOrigin::Merge => None,
        }
    }

    /// Inclusive line range, when the finding carries one. A missing
    /// `line_end` means a single line.
    pub fn line_range(&self) -> Option<(u32, u32)> {
        let start = self.line_start?;
        let end = self.line_end.unwrap_or(start).max(start);
        Some((start, end))
    }
}
