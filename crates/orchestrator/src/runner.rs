//! Team orchestrator: fan agent workers out over one task, stream ordered
//! lifecycle events, and merge whatever completes.
//!
//! A run is resilient by construction: failures local to one agent are
//! recorded and never abort siblings. The only fatal paths are setup
//! validation and an unrecoverable merge fault.

use std::sync::Arc;
use std::time::Instant;

use agents::{AgentWorker, ApiKeyProvider, ModelClient, ToolRegistry, WorkerError};
use crew_core::{AgentPreset, AgentResult, TeamConfig, TeamResult, TokenUsage};
use events::{EventBus, EventSink, NoopSink, TeamEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::emitter::TeamEventEmitter;
use crate::error::{OrchestratorError, Result};
use crate::merge::{MergeArbiter, MergeEngine, WorkerArbiter};

/// Handle on one running team: the ordered event stream and the deferred
/// result, two views of the same execution.
///
/// The supported pattern is to consume every event and then await the
/// result; the result never resolves before `team_end` has been emitted.
pub struct TeamRun {
    events: mpsc::UnboundedReceiver<TeamEvent>,
    result: oneshot::Receiver<Result<TeamResult>>,
}

impl TeamRun {
    /// Next lifecycle event, or `None` once the stream has closed.
    pub async fn next_event(&mut self) -> Option<TeamEvent> {
        self.events.recv().await
    }

    /// Split into a `Stream` of events and the deferred result receiver,
    /// for callers that consume the two views from different tasks.
    pub fn split(
        self,
    ) -> (
        UnboundedReceiverStream<TeamEvent>,
        oneshot::Receiver<Result<TeamResult>>,
    ) {
        (UnboundedReceiverStream::new(self.events), self.result)
    }

    /// Drain any remaining events and await the final result.
    pub async fn result(mut self) -> Result<TeamResult> {
        while self.events.recv().await.is_some() {}
        match self.result.await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::Interrupted),
        }
    }
}

/// Owns the boundary collaborators and launches team runs against them.
pub struct TeamRuntime {
    model: Arc<dyn ModelClient>,
    keys: Arc<dyn ApiKeyProvider>,
    tools: ToolRegistry,
    sink: Arc<dyn EventSink>,
    bus: Option<EventBus>,
    max_turns: usize,
}

impl TeamRuntime {
    pub fn new(model: Arc<dyn ModelClient>, keys: Arc<dyn ApiKeyProvider>) -> Self {
        Self {
            model,
            keys,
            tools: ToolRegistry::new(),
            sink: Arc::new(NoopSink),
            bus: None,
            max_turns: agents::DEFAULT_MAX_TURNS,
        }
    }

    /// Tools made available to every agent worker.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Persistent write-only observer of every run's events.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Broadcast bus for additional (lossy) observers.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Launch a team run. Returns immediately; the run proceeds on spawned
    /// tasks and reports through the returned handle.
    pub fn run_team(
        &self,
        config: TeamConfig,
        task: impl Into<String>,
        cancel: CancellationToken,
    ) -> TeamRun {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let emitter = TeamEventEmitter::new(event_tx, self.bus.clone(), Arc::clone(&self.sink));

        let model = Arc::clone(&self.model);
        let keys = Arc::clone(&self.keys);
        let tools = self.tools.clone();
        let max_turns = self.max_turns;
        let task = task.into();

        tokio::spawn(async move {
            let outcome = drive(model, keys, tools, max_turns, config, task, cancel, emitter).await;
            if let Err(ref e) = outcome {
                error!(error = %e, "team run failed");
            }
            let _ = result_tx.send(outcome);
        });

        TeamRun {
            events: event_rx,
            result: result_rx,
        }
    }
}

/// The run driver: validate, fan out, join, merge, finish.
#[allow(clippy::too_many_arguments)]
async fn drive(
    model: Arc<dyn ModelClient>,
    keys: Arc<dyn ApiKeyProvider>,
    tools: ToolRegistry,
    max_turns: usize,
    config: TeamConfig,
    task: String,
    cancel: CancellationToken,
    emitter: TeamEventEmitter,
) -> Result<TeamResult> {
    config.validate()?;
    let started = Instant::now();

    info!(
        team = %config.name,
        agents = config.agents.len(),
        merge = %config.merge.strategy.as_str(),
        "team run starting"
    );
    emitter.emit(TeamEvent::TeamStart {
        team_name: config.name.clone(),
        agent_count: config.agents.len(),
    });

    // Run-local stop token: cancelled by the caller's token, or by the first
    // terminal failure when continue_on_error is off.
    let stop = cancel.child_token();

    let mut workers: JoinSet<Option<(usize, AgentResult)>> = JoinSet::new();
    for (index, preset) in config.agents.iter().cloned().enumerate() {
        let worker = AgentWorker::new(Arc::clone(&model), Arc::clone(&keys))
            .with_max_turns(max_turns);
        let task = task.clone();
        let tools = tools.clone();
        let emitter = emitter.clone();
        let stop = stop.clone();
        let max_retries = config.max_retries;
        let continue_on_error = config.continue_on_error;

        workers.spawn(async move {
            run_agent(
                worker,
                preset,
                index,
                task,
                tools,
                emitter,
                stop,
                max_retries,
                continue_on_error,
            )
            .await
        });
    }

    let mut collected: Vec<(usize, AgentResult)> = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Some(entry)) => collected.push(entry),
            Ok(None) => {} // skipped by cancellation or early stop
            Err(e) => error!(error = %e, "agent task aborted outside the worker boundary"),
        }
    }
    // agent_results in configured order, regardless of completion order
    collected.sort_by_key(|(index, _)| *index);
    let agent_results: Vec<AgentResult> = collected.into_iter().map(|(_, r)| r).collect();

    debug!(
        completed = agent_results.len(),
        configured = config.agents.len(),
        "all agents terminal, merging"
    );
    emitter.emit(TeamEvent::MergeStart);

    let arbiter = config.merge.merge_agent.clone().map(|preset| {
        let worker =
            AgentWorker::new(Arc::clone(&model), Arc::clone(&keys)).with_max_turns(max_turns);
        WorkerArbiter::new(worker, preset)
    });
    let outcome = MergeEngine::merge(
        &agent_results,
        &config.merge,
        arbiter.as_ref().map(|a| a as &dyn MergeArbiter),
        &emitter,
        &cancel,
    )
    .await?;

    let result = TeamResult::new(
        config.name.clone(),
        agent_results,
        outcome.findings,
        outcome.clusters,
        outcome.summary,
        started.elapsed().as_millis() as u64,
    );
    info!(
        team = %result.team_name,
        findings = result.findings.len(),
        failed_agents = result.failed_agent_count(),
        success = result.success,
        duration_ms = result.duration_ms,
        "team run complete"
    );
    emitter.emit(TeamEvent::TeamEnd {
        result: result.clone(),
    });

    Ok(result)
}

/// One agent's lifecycle: start event, attempt loop with retries for hard
/// faults, terminal event. Returns `None` when the agent was cancelled
/// before reaching a terminal state.
#[allow(clippy::too_many_arguments)]
async fn run_agent(
    worker: AgentWorker,
    preset: AgentPreset,
    index: usize,
    task: String,
    tools: ToolRegistry,
    emitter: TeamEventEmitter,
    stop: CancellationToken,
    max_retries: u32,
    continue_on_error: bool,
) -> Option<(usize, AgentResult)> {
    let agent_name = preset.name.clone();
    emitter.emit(TeamEvent::AgentStart {
        agent_name: agent_name.clone(),
        index,
    });

    let started = Instant::now();
    let mut attempt: u32 = 0;

    let result = loop {
        match worker.run(&preset, &task, &tools, &stop).await {
            Ok(result) => break result,
            Err(WorkerError::Cancelled) => {
                debug!(agent = %agent_name, "agent cancelled before completion");
                return None;
            }
            Err(e) => {
                let will_retry = attempt < max_retries && !stop.is_cancelled();
                warn!(
                    agent = %agent_name,
                    attempt,
                    will_retry,
                    error = %e,
                    "uncaught fault escaped the worker"
                );
                emitter.emit(TeamEvent::AgentError {
                    agent_name: agent_name.clone(),
                    attempt,
                    will_retry,
                    message: e.to_string(),
                });
                if !will_retry {
                    break AgentResult::failure(
                        &agent_name,
                        e.to_string(),
                        TokenUsage::default(),
                        started.elapsed().as_millis() as u64,
                    );
                }
                attempt += 1;
            }
        }
    };

    emitter.emit(TeamEvent::AgentEnd {
        agent_name: agent_name.clone(),
        result: result.clone(),
    });

    if !result.success && !continue_on_error {
        info!(
            agent = %agent_name,
            "agent failed with continue_on_error disabled, stopping remaining agents"
        );
        stop.cancel();
    }

    Some((index, result))
}
