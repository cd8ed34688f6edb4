//! Merge engine: combine N worker outputs into one ranked, deduplicated
//! result.
//!
//! Union merging is deterministic and synchronous. Verification merging runs
//! five phases (parsing, clustering, verifying, ranking, synthesizing) and
//! may consult a dedicated merge agent; any failure on that path falls back
//! to the union output — merging never turns a successful batch of worker
//! results into a hard failure.

use std::collections::{BTreeSet, HashMap};

use agents::{AgentWorker, ToolRegistry, WorkerError};
use async_trait::async_trait;
use crew_core::{AgentPreset, AgentResult, Finding, FindingCluster, MergePolicy, MergeStrategy, Severity};
use events::{MergePhase, TeamEvent};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::emitter::TeamEventEmitter;
use crate::error::OrchestratorError;
use crate::prompts::ArbiterPrompt;

/// Minimum title-token Jaccard overlap for two findings to be considered
/// the same issue.
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Boundary for invoking the dedicated merge agent.
#[async_trait]
pub trait MergeArbiter: Send + Sync {
    /// Run the merge agent over the rendered prompt and return its raw
    /// terminal text.
    async fn review(&self, prompt: &str, cancel: &CancellationToken)
        -> Result<String, WorkerError>;
}

/// `MergeArbiter` backed by an `AgentWorker` running the configured merge
/// preset with no tools.
pub struct WorkerArbiter {
    worker: AgentWorker,
    preset: AgentPreset,
}

impl WorkerArbiter {
    pub fn new(worker: AgentWorker, preset: AgentPreset) -> Self {
        Self { worker, preset }
    }
}

#[async_trait]
impl MergeArbiter for WorkerArbiter {
    async fn review(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, WorkerError> {
        let output = self
            .worker
            .run_raw(&self.preset, prompt, &ToolRegistry::new(), cancel)
            .await?;
        Ok(output.text)
    }
}

/// What a merge produced: the ranked findings, the clusters behind them
/// (verification only), and an optional synthesized summary.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub findings: Vec<Finding>,
    pub clusters: Vec<FindingCluster>,
    pub summary: Option<String>,
}

pub struct MergeEngine;

impl MergeEngine {
    /// Merge worker results per the policy, emitting `merge_progress` events
    /// as verification phases begin.
    pub async fn merge(
        results: &[AgentResult],
        policy: &MergePolicy,
        arbiter: Option<&dyn MergeArbiter>,
        emitter: &TeamEventEmitter,
        cancel: &CancellationToken,
    ) -> Result<MergeOutcome, OrchestratorError> {
        match policy.strategy {
            MergeStrategy::Union => Ok(MergeOutcome {
                findings: union(results),
                ..MergeOutcome::default()
            }),
            MergeStrategy::Verification => {
                Self::verification(results, arbiter, emitter, cancel).await
            }
        }
    }

    async fn verification(
        results: &[AgentResult],
        arbiter: Option<&dyn MergeArbiter>,
        emitter: &TeamEventEmitter,
        cancel: &CancellationToken,
    ) -> Result<MergeOutcome, OrchestratorError> {
        let progress = |phase: MergePhase| emitter.emit(TeamEvent::MergeProgress { phase });

        progress(MergePhase::Parsing);
        let findings = sanitize(results);

        progress(MergePhase::Clustering);
        let mut clusters = cluster(findings);
        debug!(clusters = clusters.len(), "clustering complete");

        progress(MergePhase::Verifying);
        let mut summary = None;
        if let Some(arbiter) = arbiter {
            if cancel.is_cancelled() {
                debug!("run cancelled, skipping merge agent and keeping deterministic dedup");
            } else if !clusters.is_empty() {
                let payload: Vec<_> = clusters
                    .iter()
                    .map(|c| json!({"id": &c.id, "findings": &c.findings}))
                    .collect();
                let clusters_json = serde_json::to_string_pretty(&payload)
                    .map_err(|e| OrchestratorError::Merge(format!("failed to render clusters: {e}")))?;
                let prompt = ArbiterPrompt::build(&clusters_json);

                match arbiter.review(&prompt, cancel).await {
                    Ok(text) => match parse_arbiter_reply(&text) {
                        Some(reply) => {
                            apply_verdicts(&mut clusters, reply.verdicts);
                            summary = reply.summary;
                        }
                        None => {
                            warn!("merge agent reply had no usable verdicts, falling back to union merge");
                            return Ok(MergeOutcome {
                                findings: union(results),
                                ..MergeOutcome::default()
                            });
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "merge agent failed, falling back to union merge");
                        return Ok(MergeOutcome {
                            findings: union(results),
                            ..MergeOutcome::default()
                        });
                    }
                }
            }
        }

        progress(MergePhase::Ranking);
        clusters.sort_by_key(|c| {
            c.representative()
                .map(|f| f.severity.rank())
                .unwrap_or(u8::MAX)
        });
        let merged: Vec<Finding> = clusters
            .iter()
            .filter_map(|c| c.representative().cloned())
            .collect();

        progress(MergePhase::Synthesizing);
        info!(
            findings = merged.len(),
            clusters = clusters.len(),
            summarized = summary.is_some(),
            "verification merge complete"
        );

        Ok(MergeOutcome {
            findings: merged,
            clusters,
            summary,
        })
    }
}

/// Union merge: concatenate the successful agents' findings in agent order
/// and stable-sort by severity. Ties keep agent order, then finding order.
pub fn union(results: &[AgentResult]) -> Vec<Finding> {
    let mut findings: Vec<Finding> = results
        .iter()
        .filter(|r| r.success)
        .flat_map(|r| r.findings.iter().cloned())
        .collect();
    findings.sort_by_key(|f| f.severity.rank());
    findings
}

/// Parsing phase: collect successful agents' findings and drop entries with
/// no usable title. Unparseable findings were already dropped at the worker
/// boundary; this guards against agents that hand back blank rows.
fn sanitize(results: &[AgentResult]) -> Vec<Finding> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    for result in results.iter().filter(|r| r.success) {
        for finding in &result.findings {
            if finding.title.trim().is_empty() {
                dropped += 1;
            } else {
                kept.push(finding.clone());
            }
        }
    }
    if dropped > 0 {
        debug!(dropped, "dropped blank findings during merge parsing");
    }
    kept
}

/// Clustering phase: greedy grouping against each cluster's first member.
/// Two findings describe the same issue when they point at the same file
/// with overlapping lines, or their titles are near-duplicates.
fn cluster(findings: Vec<Finding>) -> Vec<FindingCluster> {
    let mut groups: Vec<Vec<Finding>> = Vec::new();
    for finding in findings {
        match groups.iter_mut().find(|g| same_issue(&g[0], &finding)) {
            Some(group) => group.push(finding),
            None => groups.push(vec![finding]),
        }
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(i, mut members)| {
            // representative first: highest severity, earliest reported
            members.sort_by_key(|f| f.severity.rank());
            FindingCluster::new(format!("cluster-{}", i + 1), members)
        })
        .collect()
}

fn same_issue(a: &Finding, b: &Finding) -> bool {
    if let (Some(file_a), Some(file_b)) = (&a.file, &b.file) {
        if file_a == file_b && lines_overlap(a, b) {
            return true;
        }
    }
    titles_match(&a.title, &b.title)
}

fn lines_overlap(a: &Finding, b: &Finding) -> bool {
    match (a.line_range(), b.line_range()) {
        (Some((a_start, a_end)), Some((b_start, b_end))) => a_start <= b_end && b_start <= a_end,
        _ => false,
    }
}

/// Near-duplicate title check: equal token sets, or Jaccard overlap at or
/// above the threshold.
fn titles_match(a: &str, b: &str) -> bool {
    let tokens_a = title_tokens(a);
    let tokens_b = title_tokens(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return false;
    }
    if tokens_a == tokens_b {
        return true;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union_count = tokens_a.union(&tokens_b).count();
    intersection as f64 / union_count as f64 >= TITLE_SIMILARITY_THRESHOLD
}

fn title_tokens(title: &str) -> BTreeSet<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[derive(Debug, Deserialize)]
struct ArbiterReply {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    verdicts: Vec<ArbiterVerdict>,
}

#[derive(Debug, Deserialize)]
struct ArbiterVerdict {
    cluster: String,
    action: VerdictAction,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VerdictAction {
    Keep,
    Drop,
    Downgrade,
}

/// Decode the merge agent's reply. `None` means the reply was unusable and
/// the caller should fall back to union output.
fn parse_arbiter_reply(text: &str) -> Option<ArbiterReply> {
    let json = agents::extract_json_block(text)?;
    let reply: ArbiterReply = match serde_json::from_str(&json) {
        Ok(reply) => reply,
        Err(e) => {
            debug!(error = %e, "merge agent reply did not decode");
            return None;
        }
    };
    if reply.verdicts.is_empty() && reply.summary.is_none() {
        return None;
    }
    Some(reply)
}

/// Apply verdicts in place. Verdicts naming unknown clusters are ignored.
fn apply_verdicts(clusters: &mut Vec<FindingCluster>, verdicts: Vec<ArbiterVerdict>) {
    let mut by_cluster: HashMap<String, ArbiterVerdict> = verdicts
        .into_iter()
        .map(|v| (v.cluster.clone(), v))
        .collect();

    clusters.retain_mut(|cluster| {
        let Some(verdict) = by_cluster.remove(&cluster.id) else {
            return true;
        };
        match verdict.action {
            VerdictAction::Drop => {
                debug!(cluster = %cluster.id, "merge agent dropped cluster");
                false
            }
            VerdictAction::Keep => {
                cluster.note = verdict.note;
                true
            }
            VerdictAction::Downgrade => {
                let severity = verdict
                    .severity
                    .as_deref()
                    .map(Severity::parse)
                    .filter(|s| *s != Severity::Unknown);
                for finding in &mut cluster.findings {
                    finding.severity = severity.unwrap_or_else(|| finding.severity.demoted());
                }
                cluster.note = verdict.note;
                true
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crew_core::{FindingOrigin, TokenUsage};
    use events::NoopSink;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn emitter() -> (TeamEventEmitter, mpsc::UnboundedReceiver<TeamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TeamEventEmitter::new(tx, None, Arc::new(NoopSink)), rx)
    }

    fn finding(agent: &str, severity: Severity, title: &str) -> Finding {
        Finding::new(severity, title, "description", FindingOrigin::agent(agent))
    }

    fn located(
        agent: &str,
        severity: Severity,
        title: &str,
        file: &str,
        line: u32,
    ) -> Finding {
        finding(agent, severity, title).with_location(file, Some(line), None)
    }

    fn ok_result(agent: &str, findings: Vec<Finding>) -> AgentResult {
        AgentResult::success(agent, findings, None, TokenUsage::default(), 10)
    }

    struct CannedArbiter(Result<String, ()>);

    #[async_trait]
    impl MergeArbiter for CannedArbiter {
        async fn review(
            &self,
            _prompt: &str,
            _cancel: &CancellationToken,
        ) -> Result<String, WorkerError> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(WorkerError::Provider("merge agent timeout".to_string())),
            }
        }
    }

    #[test]
    fn test_union_sorts_by_severity() {
        let results = vec![
            ok_result("a", vec![finding("a", Severity::Low, "Style nit")]),
            ok_result("b", vec![finding("b", Severity::Critical, "RCE")]),
            ok_result("c", vec![finding("c", Severity::Medium, "Slow query")]),
        ];

        let merged = union(&results);
        let ranks: Vec<u8> = merged.iter().map(|f| f.severity.rank()).collect();
        assert_eq!(ranks, vec![0, 2, 3]);
    }

    #[test]
    fn test_union_skips_failed_agents() {
        let results = vec![
            ok_result("a", vec![finding("a", Severity::High, "Real issue")]),
            AgentResult::failure("b", "crashed", TokenUsage::default(), 5),
        ];

        let merged = union(&results);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].agent_name(), Some("a"));
    }

    #[test]
    fn test_union_ties_keep_agent_order() {
        let results = vec![
            ok_result(
                "first",
                vec![
                    finding("first", Severity::High, "A1"),
                    finding("first", Severity::High, "A2"),
                ],
            ),
            ok_result("second", vec![finding("second", Severity::High, "B1")]),
        ];

        let merged = union(&results);
        let titles: Vec<&str> = merged.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["A1", "A2", "B1"]);
    }

    #[test]
    fn test_union_idempotent_under_agent_order() {
        let critical = finding("x", Severity::Critical, "Crash on empty input");
        let low = finding("y", Severity::Low, "Verbose log line");

        let forward = union(&[
            ok_result("x", vec![critical.clone()]),
            ok_result("y", vec![low.clone()]),
        ]);
        let backward = union(&[
            ok_result("y", vec![low.clone()]),
            ok_result("x", vec![critical.clone()]),
        ]);

        let titles = |fs: &[Finding]| fs.iter().map(|f| f.title.clone()).collect::<Vec<_>>();
        assert_eq!(titles(&forward), titles(&backward));
    }

    #[test]
    fn test_titles_match() {
        assert!(titles_match("Unchecked index panic", "unchecked INDEX panic"));
        assert!(titles_match(
            "SQL injection in query builder",
            "SQL injection in the query builder"
        ));
        assert!(!titles_match("SQL injection", "Missing documentation"));
        assert!(!titles_match("", "Missing documentation"));
    }

    #[tokio::test]
    async fn test_verification_dedups_identical_findings() {
        // Scenario: two agents report the identical finding (same
        // file+line+title); deterministic dedup collapses to one.
        let results = vec![
            ok_result(
                "a",
                vec![located("a", Severity::High, "Unchecked unwrap", "src/db.rs", 40)],
            ),
            ok_result(
                "b",
                vec![located("b", Severity::High, "Unchecked unwrap", "src/db.rs", 40)],
            ),
        ];
        let policy = MergePolicy::verification();
        let (emitter, _rx) = emitter();

        let outcome = MergeEngine::merge(
            &results,
            &policy,
            None,
            &emitter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].findings.len(), 2);
        assert!(outcome.summary.is_none());
        // provenance survives the merge
        assert_eq!(outcome.findings[0].agent_name(), Some("a"));
    }

    #[tokio::test]
    async fn test_verification_clusters_by_line_overlap() {
        let results = vec![
            ok_result(
                "a",
                vec![
                    finding("a", Severity::Medium, "Blocking IO in async fn")
                        .with_location("src/net.rs", Some(10), Some(20)),
                ],
            ),
            ok_result(
                "b",
                vec![
                    finding("b", Severity::High, "Synchronous file read stalls runtime")
                        .with_location("src/net.rs", Some(18), Some(25)),
                ],
            ),
        ];
        let (emitter, _rx) = emitter();

        let outcome = MergeEngine::merge(
            &results,
            &MergePolicy::verification(),
            None,
            &emitter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        // overlapping ranges in the same file cluster despite distinct titles
        assert_eq!(outcome.clusters.len(), 1);
        // representative is the higher severity member
        assert_eq!(outcome.findings[0].severity, Severity::High);
        assert_eq!(outcome.findings[0].agent_name(), Some("b"));
    }

    #[tokio::test]
    async fn test_verification_keeps_singletons() {
        let results = vec![
            ok_result("a", vec![located("a", Severity::Low, "Dead code", "src/a.rs", 1)]),
            ok_result("b", vec![located("b", Severity::High, "Race condition", "src/b.rs", 9)]),
        ];
        let (emitter, _rx) = emitter();

        let outcome = MergeEngine::merge(
            &results,
            &MergePolicy::verification(),
            None,
            &emitter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.clusters.len(), 2);
        assert!(outcome.clusters.iter().all(|c| c.is_singleton()));
        // ranked: high before low
        assert_eq!(outcome.findings[0].severity, Severity::High);
        assert_eq!(outcome.findings[1].severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_verification_emits_phases_in_order() {
        let results = vec![ok_result("a", vec![finding("a", Severity::Info, "Note")])];
        let (emitter, mut rx) = emitter();

        MergeEngine::merge(
            &results,
            &MergePolicy::verification(),
            None,
            &emitter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TeamEvent::MergeProgress { phase } = event {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                MergePhase::Parsing,
                MergePhase::Clustering,
                MergePhase::Verifying,
                MergePhase::Ranking,
                MergePhase::Synthesizing,
            ]
        );
    }

    #[tokio::test]
    async fn test_arbiter_verdicts_applied() {
        let results = vec![
            ok_result("a", vec![located("a", Severity::Critical, "False alarm", "src/a.rs", 1)]),
            ok_result("b", vec![located("b", Severity::Critical, "Overstated issue", "src/b.rs", 2)]),
            ok_result("c", vec![located("c", Severity::High, "Real issue", "src/c.rs", 3)]),
        ];
        let reply = r#"```json
{
  "summary": "One real issue; one downgraded; one dropped.",
  "verdicts": [
    {"cluster": "cluster-1", "action": "drop", "note": "not reachable"},
    {"cluster": "cluster-2", "action": "downgrade", "severity": "low"},
    {"cluster": "cluster-3", "action": "keep"}
  ]
}
```"#;
        let arbiter = CannedArbiter(Ok(reply.to_string()));
        let (emitter, _rx) = emitter();

        let outcome = MergeEngine::merge(
            &results,
            &MergePolicy::verification(),
            Some(&arbiter),
            &emitter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.summary.as_deref(), Some("One real issue; one downgraded; one dropped."));
        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.findings.len(), 2);
        // ranked: the kept High first, the downgraded Low second
        assert_eq!(outcome.findings[0].title, "Real issue");
        assert_eq!(outcome.findings[1].title, "Overstated issue");
        assert_eq!(outcome.findings[1].severity, Severity::Low);
        let downgraded = outcome.clusters.iter().find(|c| c.findings[0].title == "Overstated issue").unwrap();
        assert!(downgraded.note.is_none());
    }

    #[tokio::test]
    async fn test_arbiter_failure_falls_back_to_union() {
        let results = vec![
            ok_result("a", vec![located("a", Severity::High, "Dup", "src/x.rs", 5)]),
            ok_result("b", vec![located("b", Severity::High, "Dup", "src/x.rs", 5)]),
        ];
        let arbiter = CannedArbiter(Err(()));
        let (emitter, _rx) = emitter();

        let outcome = MergeEngine::merge(
            &results,
            &MergePolicy::verification(),
            Some(&arbiter),
            &emitter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        // exactly what union would have produced: no dedup, no clusters
        let expected = union(&results);
        assert_eq!(outcome.findings, expected);
        assert!(outcome.clusters.is_empty());
        assert!(outcome.summary.is_none());
    }

    #[tokio::test]
    async fn test_unusable_arbiter_reply_falls_back_to_union() {
        let results = vec![ok_result("a", vec![finding("a", Severity::Low, "Nit")])];
        let arbiter = CannedArbiter(Ok("I could not decide, sorry.".to_string()));
        let (emitter, _rx) = emitter();

        let outcome = MergeEngine::merge(
            &results,
            &MergePolicy::verification(),
            Some(&arbiter),
            &emitter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.findings, union(&results));
        assert!(outcome.clusters.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_arbiter() {
        let results = vec![
            ok_result("a", vec![located("a", Severity::High, "Dup", "src/x.rs", 5)]),
            ok_result("b", vec![located("b", Severity::High, "Dup", "src/x.rs", 5)]),
        ];
        // an arbiter that would fail the test if consulted
        struct PanicArbiter;
        #[async_trait]
        impl MergeArbiter for PanicArbiter {
            async fn review(
                &self,
                _prompt: &str,
                _cancel: &CancellationToken,
            ) -> Result<String, WorkerError> {
                panic!("arbiter must not run after cancellation");
            }
        }
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (emitter, _rx) = emitter();

        let outcome = MergeEngine::merge(
            &results,
            &MergePolicy::verification(),
            Some(&PanicArbiter),
            &emitter,
            &cancel,
        )
        .await
        .unwrap();

        // deterministic dedup still happened
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.clusters.len(), 1);
    }
}
