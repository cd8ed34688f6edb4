//! Parsing of lead-analyzer output into a team selection.
//!
//! The strict JSON path lives next to the markdown fallback so both stay
//! independently testable: the fallback (backticks, bold spans, "selected
//! teams:" phrases, bare words) is best-effort by nature and the most likely
//! piece to drift.

use std::collections::HashSet;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::selection::TeamSelection;

#[derive(Debug, Deserialize)]
struct RawSelection {
    #[serde(default)]
    selected_teams: Vec<String>,
    #[serde(default)]
    execution_waves: Vec<Vec<String>>,
    #[serde(default)]
    reasoning: String,
}

/// Strict parse path: a JSON block naming at least one known team.
/// Unknown team names are filtered out; `None` sends the caller to the
/// markdown fallback.
pub fn parse_structured(text: &str, known: &[String]) -> Option<TeamSelection> {
    let json = agents::extract_json_block(text)?;
    let raw: RawSelection = match serde_json::from_str(&json) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "selection JSON did not decode");
            return None;
        }
    };

    let mut selected = Vec::new();
    for name in &raw.selected_teams {
        if let Some(team) = canonical(name, known) {
            if !selected.contains(&team) {
                selected.push(team);
            }
        } else {
            debug!(team = %name, "analyzer selected unknown team, dropping");
        }
    }
    if selected.is_empty() {
        return None;
    }

    let execution_waves = normalize_waves(raw.execution_waves, &selected);
    Some(TeamSelection {
        selected_teams: selected,
        execution_waves,
        reasoning: raw.reasoning,
    })
}

/// Normalize wave lists against the selected teams: drop unknown entries and
/// duplicates, default to a single wave when empty, and append teams the
/// waves forgot as a final wave.
pub fn normalize_waves(raw: Vec<Vec<String>>, selected: &[String]) -> Vec<Vec<String>> {
    let mut placed: HashSet<String> = HashSet::new();
    let mut waves: Vec<Vec<String>> = Vec::new();

    for raw_wave in raw {
        let mut wave = Vec::new();
        for name in raw_wave {
            if let Some(team) = canonical(&name, selected) {
                if placed.insert(team.clone()) {
                    wave.push(team);
                }
            }
        }
        if !wave.is_empty() {
            waves.push(wave);
        }
    }

    if waves.is_empty() {
        return vec![selected.to_vec()];
    }

    let unplaced: Vec<String> = selected
        .iter()
        .filter(|team| !placed.contains(*team))
        .cloned()
        .collect();
    if !unplaced.is_empty() {
        waves.push(unplaced);
    }
    waves
}

/// Markdown fallback: scan code spans, bold spans, "selected teams:" lines,
/// then bare-word occurrences for known team names. First-seen order,
/// deduplicated.
pub fn extract_known_teams(text: &str, known: &[String]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    fn push(team: String, found: &mut Vec<String>) {
        if !found.contains(&team) {
            found.push(team);
        }
    }

    let backtick = Regex::new(r"`([^`\n]+)`").expect("Invalid code span pattern");
    for caps in backtick.captures_iter(text) {
        if let Some(team) = canonical(&caps[1], known) {
            push(team, &mut found);
        }
    }

    let bold = Regex::new(r"\*\*([^*\n]+)\*\*").expect("Invalid bold span pattern");
    for caps in bold.captures_iter(text) {
        if let Some(team) = canonical(&caps[1], known) {
            push(team, &mut found);
        }
    }

    let listed = Regex::new(r"(?im)^.*?selected teams?\s*[:\-]\s*(.+)$")
        .expect("Invalid selected-teams pattern");
    for caps in listed.captures_iter(text) {
        for candidate in caps[1].split([',', ';']) {
            let cleaned = candidate.trim().trim_matches(['`', '*', '"', '\'', '.']);
            if let Some(team) = canonical(cleaned, known) {
                push(team, &mut found);
            }
        }
    }

    for name in known {
        if contains_word(text, name) {
            push(name.clone(), &mut found);
        }
    }

    found
}

/// Case-insensitive lookup of a candidate against the known team names,
/// returning the canonical spelling.
pub(crate) fn canonical(candidate: &str, known: &[String]) -> Option<String> {
    let candidate = candidate.trim();
    known
        .iter()
        .find(|team| team.eq_ignore_ascii_case(candidate))
        .cloned()
}

/// Whole-word occurrence check; hyphens inside team names are respected.
fn contains_word(text: &str, name: &str) -> bool {
    let pattern = format!(r"(?i)(^|[^\w-]){}($|[^\w-])", regex::escape(name));
    if let Ok(re) = Regex::new(&pattern) {
        re.is_match(text)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec![
            "security-audit".to_string(),
            "perf-review".to_string(),
            "docs-check".to_string(),
        ]
    }

    #[test]
    fn test_backtick_extraction() {
        // prose with a code span and no structured block
        let text = "I recommend running the `security-audit` team first.";
        assert_eq!(
            extract_known_teams(text, &known()),
            vec!["security-audit".to_string()]
        );
    }

    #[test]
    fn test_bold_extraction() {
        let text = "Run **perf-review** and then **docs-check**.";
        assert_eq!(
            extract_known_teams(text, &known()),
            vec!["perf-review".to_string(), "docs-check".to_string()]
        );
    }

    #[test]
    fn test_selected_teams_line() {
        let text = "Analysis done.\nSelected teams: security-audit, docs-check\nGood luck.";
        assert_eq!(
            extract_known_teams(text, &known()),
            vec!["security-audit".to_string(), "docs-check".to_string()]
        );
    }

    #[test]
    fn test_bare_word_occurrence() {
        let text = "The perf-review angle matters most here.";
        assert_eq!(
            extract_known_teams(text, &known()),
            vec!["perf-review".to_string()]
        );
    }

    #[test]
    fn test_bare_word_respects_boundaries() {
        let text = "The superperf-reviewer module is unrelated.";
        assert!(extract_known_teams(text, &known()).is_empty());
    }

    #[test]
    fn test_extraction_dedupes_in_first_seen_order() {
        let text = "`docs-check` then **security-audit**, i.e. docs-check again.";
        assert_eq!(
            extract_known_teams(text, &known()),
            vec!["docs-check".to_string(), "security-audit".to_string()]
        );
    }

    #[test]
    fn test_extraction_is_case_insensitive() {
        let text = "Run `Security-Audit` please.";
        assert_eq!(
            extract_known_teams(text, &known()),
            vec!["security-audit".to_string()]
        );
    }

    #[test]
    fn test_no_known_teams() {
        let text = "Nothing here matches the catalog at all.";
        assert!(extract_known_teams(text, &known()).is_empty());
    }

    #[test]
    fn test_structured_parse() {
        let text = r#"```json
{
  "selected_teams": ["security-audit", "perf-review"],
  "execution_waves": [["security-audit"], ["perf-review"]],
  "reasoning": "Security first."
}
```"#;
        let selection = parse_structured(text, &known()).unwrap();
        assert_eq!(
            selection.selected_teams,
            vec!["security-audit".to_string(), "perf-review".to_string()]
        );
        assert_eq!(selection.execution_waves.len(), 2);
        assert_eq!(selection.reasoning, "Security first.");
    }

    #[test]
    fn test_structured_parse_filters_unknown_teams() {
        let text = r#"{"selected_teams": ["security-audit", "made-up-team"]}"#;
        let selection = parse_structured(text, &known()).unwrap();
        assert_eq!(selection.selected_teams, vec!["security-audit".to_string()]);
        // waves defaulted to a single wave with everything selected
        assert_eq!(selection.execution_waves, vec![vec!["security-audit".to_string()]]);
    }

    #[test]
    fn test_structured_parse_rejects_all_unknown() {
        let text = r#"{"selected_teams": ["made-up-team"]}"#;
        assert!(parse_structured(text, &known()).is_none());
    }

    #[test]
    fn test_normalize_waves_appends_unplaced() {
        let selected = vec!["security-audit".to_string(), "perf-review".to_string()];
        let waves = normalize_waves(vec![vec!["security-audit".to_string()]], &selected);
        assert_eq!(
            waves,
            vec![
                vec!["security-audit".to_string()],
                vec!["perf-review".to_string()],
            ]
        );
    }

    #[test]
    fn test_normalize_waves_drops_duplicates_and_unknowns() {
        let selected = vec!["security-audit".to_string()];
        let waves = normalize_waves(
            vec![
                vec!["security-audit".to_string(), "ghost".to_string()],
                vec!["security-audit".to_string()],
            ],
            &selected,
        );
        assert_eq!(waves, vec![vec!["security-audit".to_string()]]);
    }
}
