//! Tolerant parsing of structured agent reports out of model text.
//!
//! Agents are asked to end their run with a JSON report, but model output is
//! not trusted: the JSON may be fenced, embedded in prose, partially
//! malformed, or missing entirely. Individual findings that fail to decode
//! are dropped; a report with no JSON at all becomes a summary-only report.

use crew_core::{Finding, FindingOrigin, Severity};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// What an agent reported, normalized.
#[derive(Debug, Default)]
pub struct AgentReport {
    pub summary: Option<String>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    findings: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_severity")]
    severity: String,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    line_start: Option<u32>,
    #[serde(default)]
    line_end: Option<u32>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
}

fn default_severity() -> String {
    "unknown".to_string()
}

/// Parse an agent's terminal text into a normalized report, attributing
/// every decoded finding to `agent_name`.
pub fn parse_agent_report(agent_name: &str, text: &str) -> AgentReport {
    let Some(json) = extract_json_block(text) else {
        let trimmed = text.trim();
        return AgentReport {
            summary: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            findings: Vec::new(),
        };
    };

    let value: Value = match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(e) => {
            debug!(agent = %agent_name, error = %e, "report JSON did not parse, keeping text as summary");
            let trimmed = text.trim();
            return AgentReport {
                summary: (!trimmed.is_empty()).then(|| trimmed.to_string()),
                findings: Vec::new(),
            };
        }
    };

    // Either {summary, findings: [...]} or a bare findings array.
    let (summary, raw_findings) = match value {
        Value::Array(items) => (None, items),
        object => match serde_json::from_value::<RawReport>(object) {
            Ok(report) => (report.summary, report.findings),
            Err(e) => {
                debug!(agent = %agent_name, error = %e, "report object had unexpected shape");
                (None, Vec::new())
            }
        },
    };

    let total = raw_findings.len();
    let findings: Vec<Finding> = raw_findings
        .into_iter()
        .filter_map(|value| decode_finding(agent_name, value))
        .collect();

    if findings.len() < total {
        debug!(
            agent = %agent_name,
            dropped = total - findings.len(),
            "dropped malformed findings from report"
        );
    }

    AgentReport { summary, findings }
}

fn decode_finding(agent_name: &str, value: Value) -> Option<Finding> {
    let raw: RawFinding = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(agent = %agent_name, error = %e, "skipping unparseable finding");
            return None;
        }
    };

    if raw.title.trim().is_empty() {
        return None;
    }

    let mut finding = Finding::new(
        Severity::parse(&raw.severity),
        raw.title,
        raw.description,
        FindingOrigin::agent(agent_name),
    );
    if let Some(file) = raw.file {
        finding = finding.with_location(file, raw.line_start, raw.line_end);
    }
    if let Some(category) = raw.category {
        finding = finding.with_category(category);
    }
    if let Some(suggestion) = raw.suggestion {
        finding = finding.with_suggestion(suggestion);
    }
    Some(finding)
}

/// Extract the JSON block from model text.
///
/// Tries, in order: a ```json fenced block, a bare fenced block opening with
/// `{` or `[`, the outermost brace pair, the outermost bracket pair. Returns
/// `None` when the text plainly contains no JSON.
pub fn extract_json_block(content: &str) -> Option<String> {
    if let Some(start) = content.find("```json") {
        let body = &content[start + 7..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim().to_string());
        }
    }

    for opener in ["```\n{", "```\n["] {
        if let Some(start) = content.find(opener) {
            let body = &content[start + 4..];
            if let Some(end) = body.find("\n```") {
                return Some(body[..end].trim().to_string());
            }
        }
    }

    // Outermost braces or brackets, whichever opens first.
    let object = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some((start, &content[start..=end])),
        _ => None,
    };
    let array = match (content.find('['), content.rfind(']')) {
        (Some(start), Some(end)) if start < end => Some((start, &content[start..=end])),
        _ => None,
    };

    match (object, array) {
        (Some((obj_start, obj)), Some((arr_start, arr))) => {
            Some(if arr_start < obj_start { arr } else { obj }.to_string())
        }
        (Some((_, obj)), None) => Some(obj.to_string()),
        (None, Some((_, arr))) => Some(arr.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_json() {
        let content = "Here is my report:\n```json\n{\"findings\": []}\n```\nDone.";
        let json = extract_json_block(content).unwrap();
        assert_eq!(json, "{\"findings\": []}");
    }

    #[test]
    fn test_extract_bare_fence() {
        let content = "Report:\n```\n{\"summary\": \"ok\"}\n```";
        let json = extract_json_block(content).unwrap();
        assert!(json.contains("summary"));
    }

    #[test]
    fn test_extract_raw_braces() {
        let content = "Result: {\"summary\": \"clean\", \"findings\": []} -- end";
        let json = extract_json_block(content).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn test_extract_bare_array() {
        let content = "findings: [{\"title\": \"x\"}]";
        let json = extract_json_block(content).unwrap();
        assert!(json.starts_with('['));
    }

    #[test]
    fn test_extract_no_json() {
        assert!(extract_json_block("All clear, nothing to report.").is_none());
    }

    #[test]
    fn test_parse_full_report() {
        let text = r#"```json
{
  "summary": "Two issues found.",
  "findings": [
    {"title": "SQL injection", "description": "Unescaped input", "severity": "critical",
     "file": "src/db.rs", "line_start": 40, "line_end": 44},
    {"title": "Unused import", "severity": "info"}
  ]
}
```"#;

        let report = parse_agent_report("auditor", text);
        assert_eq!(report.summary.as_deref(), Some("Two issues found."));
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[0].severity, Severity::Critical);
        assert_eq!(report.findings[0].file.as_deref(), Some("src/db.rs"));
        assert_eq!(report.findings[0].agent_name(), Some("auditor"));
        assert_eq!(report.findings[1].severity, Severity::Info);
    }

    #[test]
    fn test_parse_drops_malformed_findings() {
        let text = r#"{"findings": [
            {"title": "Valid", "severity": "low"},
            {"no_title": true},
            {"title": "   "},
            42
        ]}"#;

        let report = parse_agent_report("a", text);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].title, "Valid");
    }

    #[test]
    fn test_parse_bare_array() {
        let text = r#"[{"title": "One", "severity": "high"}]"#;
        let report = parse_agent_report("a", text);
        assert_eq!(report.findings.len(), 1);
        assert!(report.summary.is_none());
    }

    #[test]
    fn test_parse_unknown_severity_sorts_last() {
        let text = r#"{"findings": [{"title": "Odd", "severity": "catastrophic"}]}"#;
        let report = parse_agent_report("a", text);
        assert_eq!(report.findings[0].severity, Severity::Unknown);
    }

    #[test]
    fn test_parse_prose_only() {
        let report = parse_agent_report("a", "  The code looks fine to me.  ");
        assert!(report.findings.is_empty());
        assert_eq!(report.summary.as_deref(), Some("The code looks fine to me."));
    }

    #[test]
    fn test_parse_empty_text() {
        let report = parse_agent_report("a", "   ");
        assert!(report.findings.is_empty());
        assert!(report.summary.is_none());
    }
}
