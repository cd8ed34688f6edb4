//! Prompt builders for the control-plane agents.

use crate::selection::SelectionRequest;

/// Prompt for the merge agent: cross-check clustered findings.
pub struct ArbiterPrompt;

impl ArbiterPrompt {
    pub fn build(clusters_json: &str) -> String {
        format!(
            r#"You are the merge reviewer for a team of code-analysis agents. The clusters
below group findings that likely describe the same underlying issue.

For each cluster decide whether it is a real issue:
- "keep" it as reported,
- "drop" it if it is a false positive or a duplicate of a higher-confidence cluster,
- "downgrade" it if it is real but overstated (optionally give the corrected severity).

Clusters:

{clusters_json}

Answer with a single JSON object:

```json
{{
  "summary": "<2-4 sentence overview of the combined findings>",
  "verdicts": [
    {{"cluster": "cluster-1", "action": "keep"}},
    {{"cluster": "cluster-2", "action": "drop", "note": "duplicate of cluster-1"}},
    {{"cluster": "cluster-3", "action": "downgrade", "severity": "low"}}
  ]
}}
```"#
        )
    }
}

/// Prompt for the lead analyzer: pick teams for an intent.
pub struct SelectionPrompt;

impl SelectionPrompt {
    pub fn build(request: &SelectionRequest, known_teams: &[String]) -> String {
        let mut prompt = format!(
            "You are the lead analyzer. Inspect the project with the read-only tools \
available to you and decide which analysis teams should run for this request.\n\n\
Request: {}\n",
            request.intent
        );
        if let Some(ref scope) = request.scope {
            prompt.push_str(&format!("Scope: {}\n", scope));
        }
        prompt.push_str(&format!("Depth: {}\n", request.depth.as_str()));
        if let Some(ref focus) = request.focus {
            prompt.push_str(&format!("Focus: {}\n", focus));
        }
        if let Some(ref context) = request.project_context {
            prompt.push_str(&format!("\nProject context:\n{}\n", context));
        }

        prompt.push_str("\nAvailable teams:\n");
        for team in known_teams {
            prompt.push_str(&format!("- {}\n", team));
        }

        prompt.push_str(
            "\nAnswer with a single JSON object:\n\n```json\n{\n  \"selected_teams\": [\"<team>\", ...],\n  \
\"execution_waves\": [[\"<teams to run first>\"], [\"<teams to run next>\"]],\n  \
\"reasoning\": \"<why these teams, in this order>\"\n}\n```\n\
Only name teams from the available list.",
        );
        prompt
    }
}
