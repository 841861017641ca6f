use super::step_executor::StepExecutor;
use crate::config::{ExecutorConfig, FailurePolicy};
use crate::error::{Result, WorkflowError};
use crate::events::{Event, EventLog, EventType};
use crate::tools::ToolExecutor;
use crate::types::{StepId, StepStatus, Workflow, WorkflowId, WorkflowStatus, WorkflowStep};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Outputs of a workflow run, keyed by step id
pub type StepOutputs = HashMap<StepId, Value>;

type ActiveRuns = Mutex<HashMap<WorkflowId, watch::Sender<bool>>>;

/// Workflow executor that drives a workflow through its dependency waves
pub struct WorkflowExecutor {
    step_executor: Arc<StepExecutor>,
    event_log: Arc<dyn EventLog>,
    config: ExecutorConfig,
    // Pause signals for workflows currently inside `execute`
    active_runs: ActiveRuns,
}

impl WorkflowExecutor {
    pub fn new(tools: Arc<dyn ToolExecutor>, event_log: Arc<dyn EventLog>) -> Self {
        Self::with_config(tools, event_log, ExecutorConfig::default())
    }

    pub fn with_config(
        tools: Arc<dyn ToolExecutor>,
        event_log: Arc<dyn EventLog>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            step_executor: Arc::new(StepExecutor::new(tools)),
            event_log,
            config,
            active_runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a workflow and return the output of every step.
    ///
    /// Steps already `completed` keep their outputs, so a paused or failed
    /// workflow resumes where it stopped. Steps left `failed`, `skipped` or
    /// `running` by an earlier attempt are dispatched again.
    pub async fn execute(&self, workflow: &mut Workflow) -> Result<StepOutputs> {
        match workflow.status {
            WorkflowStatus::Active => return Err(WorkflowError::AlreadyActive),
            WorkflowStatus::Completed => {
                return Err(WorkflowError::InvalidState {
                    status: workflow.status,
                    operation: "execute",
                })
            }
            WorkflowStatus::Draft | WorkflowStatus::Paused | WorkflowStatus::Failed => {}
        }
        ensure_unique_step_ids(workflow)?;

        let workflow_id = workflow.id;
        let started_at = Instant::now();

        // A clone of a running workflow shares its id and is refused here
        let (pause_tx, pause_rx) = watch::channel(false);
        let _active = ActiveRun::register(&self.active_runs, workflow_id, pause_tx)?;

        for step in &mut workflow.steps {
            if matches!(
                step.status,
                StepStatus::Running | StepStatus::Failed | StepStatus::Skipped
            ) {
                step.clear_execution();
            }
        }
        workflow.status = WorkflowStatus::Active;

        tracing::info!(
            "Starting workflow execution: workflow_id={}, name={}",
            workflow_id,
            workflow.name
        );

        self.emit(
            workflow_id,
            EventType::WorkflowStarted {
                name: workflow.name.clone(),
                step_count: workflow.steps.len(),
            },
        )
        .await;

        let result = self.run_waves(workflow, pause_rx).await;
        let duration_ms = millis(started_at.elapsed());

        match result {
            Ok(outputs) => {
                workflow.status = WorkflowStatus::Completed;
                self.emit(workflow_id, EventType::WorkflowCompleted { duration_ms })
                    .await;
                tracing::info!("Workflow execution completed: workflow_id={}", workflow_id);
                Ok(outputs)
            }
            Err(WorkflowError::Paused) => {
                workflow.status = WorkflowStatus::Paused;
                self.emit(workflow_id, EventType::WorkflowPaused).await;
                tracing::info!("Workflow execution paused: workflow_id={}", workflow_id);
                Err(WorkflowError::Paused)
            }
            Err(e) => {
                workflow.status = WorkflowStatus::Failed;
                self.emit(
                    workflow_id,
                    EventType::WorkflowFailed {
                        error: e.to_string(),
                        duration_ms,
                    },
                )
                .await;
                tracing::error!(
                    "Workflow execution failed: workflow_id={}, error={}",
                    workflow_id,
                    e
                );
                Err(e)
            }
        }
    }

    /// Dispatch waves until nothing is pending
    async fn run_waves(
        &self,
        workflow: &mut Workflow,
        pause_rx: watch::Receiver<bool>,
    ) -> Result<StepOutputs> {
        let mut outputs: StepOutputs = workflow
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| (s.id.clone(), s.outputs.clone().unwrap_or(Value::Null)))
            .collect();
        let mut completed_steps: HashSet<StepId> = outputs.keys().cloned().collect();

        loop {
            let ready: Vec<StepId> = workflow
                .steps
                .iter()
                .filter(|s| {
                    s.status == StepStatus::Pending
                        && s.dependencies.iter().all(|d| completed_steps.contains(d))
                })
                .map(|s| s.id.clone())
                .collect();

            if ready.is_empty() {
                let pending = workflow.pending_steps();
                if pending.is_empty() {
                    break;
                }
                tracing::warn!(
                    "Workflow {} blocked with {} pending steps",
                    workflow.id,
                    pending.len()
                );
                return Err(WorkflowError::Blocked { pending });
            }

            let paused = *pause_rx.borrow();
            if paused {
                return Err(WorkflowError::Paused);
            }

            tracing::debug!("Dispatching wave of {} steps", ready.len());
            self.run_wave(workflow, ready, &mut completed_steps, &mut outputs)
                .await?;
        }

        Ok(outputs)
    }

    /// Run one wave concurrently and record every result that comes back
    async fn run_wave(
        &self,
        workflow: &mut Workflow,
        ready: Vec<StepId>,
        completed_steps: &mut HashSet<StepId>,
        outputs: &mut StepOutputs,
    ) -> Result<()> {
        let limit = self.config.concurrency_limit();
        let mut queue: VecDeque<StepId> = ready.into();
        let mut in_flight = FuturesUnordered::new();
        let mut running: HashSet<StepId> = HashSet::new();
        let mut first_error: Option<WorkflowError> = None;

        loop {
            // No new dispatches once a step in this wave has failed
            while first_error.is_none() && in_flight.len() < limit {
                let Some(step_id) = queue.pop_front() else {
                    break;
                };
                let Some((tool_id, input)) = self.start_step(workflow, &step_id, outputs).await
                else {
                    continue;
                };

                running.insert(step_id.clone());
                let step_executor = self.step_executor.clone();
                in_flight.push(async move { step_executor.invoke(step_id, tool_id, input).await });
            }

            let Some(outcome) = in_flight.next().await else {
                break;
            };
            running.remove(&outcome.step_id);

            match outcome.result {
                Ok(output) => {
                    self.complete_step(workflow, &outcome.step_id, output.clone(), outcome.duration)
                        .await;
                    completed_steps.insert(outcome.step_id.clone());
                    outputs.insert(outcome.step_id, output);
                }
                Err(message) => {
                    self.fail_step(workflow, &outcome.step_id, &message).await;
                    if first_error.is_none() {
                        first_error = Some(WorkflowError::StepFailed {
                            step_id: outcome.step_id,
                            message,
                        });
                    }
                    if self.config.failure_policy == FailurePolicy::AbortWave {
                        break;
                    }
                }
            }
        }

        // Only non-empty when the wave was aborted
        drop(in_flight);
        for step_id in running {
            self.skip_step(workflow, &step_id, "Aborted after a sibling step failed")
                .await;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn start_step(
        &self,
        workflow: &mut Workflow,
        step_id: &StepId,
        outputs: &StepOutputs,
    ) -> Option<(String, Value)> {
        let workflow_id = workflow.id;
        let step = workflow.step_mut(step_id)?;

        let input = effective_input(step, outputs);
        step.status = StepStatus::Running;
        step.start_time = Some(Utc::now());
        let tool_id = step.tool_id.clone();

        tracing::info!("Executing step: {}", step_id);
        self.emit(
            workflow_id,
            EventType::StepStarted {
                step_id: step_id.clone(),
                tool_id: tool_id.clone(),
            },
        )
        .await;

        Some((tool_id, input))
    }

    async fn complete_step(
        &self,
        workflow: &mut Workflow,
        step_id: &StepId,
        output: Value,
        duration: Duration,
    ) {
        let workflow_id = workflow.id;
        if let Some(step) = workflow.step_mut(step_id) {
            step.outputs = Some(output);
            step.end_time = Some(Utc::now());
            step.status = StepStatus::Completed;
        }

        self.emit(
            workflow_id,
            EventType::StepCompleted {
                step_id: step_id.clone(),
                duration_ms: millis(duration),
            },
        )
        .await;
    }

    async fn fail_step(&self, workflow: &mut Workflow, step_id: &StepId, message: &str) {
        let workflow_id = workflow.id;
        if let Some(step) = workflow.step_mut(step_id) {
            step.error_message = Some(message.to_string());
            step.end_time = Some(Utc::now());
            step.status = StepStatus::Failed;
        }

        self.emit(
            workflow_id,
            EventType::StepFailed {
                step_id: step_id.clone(),
                error: message.to_string(),
            },
        )
        .await;
    }

    async fn skip_step(&self, workflow: &mut Workflow, step_id: &StepId, reason: &str) {
        let workflow_id = workflow.id;
        if let Some(step) = workflow.step_mut(step_id) {
            step.end_time = Some(Utc::now());
            step.status = StepStatus::Skipped;
        }

        tracing::info!("Skipping step {}: {}", step_id, reason);
        self.emit(
            workflow_id,
            EventType::StepSkipped {
                step_id: step_id.clone(),
                reason: reason.to_string(),
            },
        )
        .await;
    }

    /// Mark a workflow paused.
    ///
    /// This never interrupts a tool call. Steps left `running` by an
    /// abandoned execution are returned to `pending`.
    pub async fn pause(&self, workflow: &mut Workflow) -> Result<()> {
        match workflow.status {
            WorkflowStatus::Completed | WorkflowStatus::Failed => {
                return Err(WorkflowError::InvalidState {
                    status: workflow.status,
                    operation: "pause",
                })
            }
            WorkflowStatus::Paused => return Ok(()),
            WorkflowStatus::Draft | WorkflowStatus::Active => {}
        }

        for step in workflow
            .steps
            .iter_mut()
            .filter(|s| s.status == StepStatus::Running)
        {
            step.clear_execution();
        }
        workflow.status = WorkflowStatus::Paused;

        tracing::info!("Workflow paused: workflow_id={}", workflow.id);
        self.emit(workflow.id, EventType::WorkflowPaused).await;
        Ok(())
    }

    /// Ask a running `execute` to stop before its next wave.
    /// The wave in flight is allowed to settle first.
    pub fn request_pause(&self, workflow_id: WorkflowId) -> Result<()> {
        let runs = self
            .active_runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match runs.get(&workflow_id) {
            Some(pause_tx) => {
                pause_tx.send_replace(true);
                tracing::info!("Pause requested for workflow {}", workflow_id);
                Ok(())
            }
            None => Err(WorkflowError::NotRunning(workflow_id)),
        }
    }

    /// Whether `execute` is currently driving the given workflow
    pub fn is_running(&self, workflow_id: WorkflowId) -> bool {
        self.active_runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&workflow_id)
    }

    /// Return a workflow to `draft` with every step pending and cleared
    pub async fn reset(&self, workflow: &mut Workflow) -> Result<()> {
        if workflow.status == WorkflowStatus::Active {
            return Err(WorkflowError::InvalidState {
                status: workflow.status,
                operation: "reset",
            });
        }

        for step in &mut workflow.steps {
            step.clear_execution();
        }
        workflow.status = WorkflowStatus::Draft;

        tracing::info!("Workflow reset: workflow_id={}", workflow.id);
        self.emit(workflow.id, EventType::WorkflowReset).await;
        Ok(())
    }

    /// Record an event; a failing event log never fails the workflow
    async fn emit(&self, workflow_id: WorkflowId, event_type: EventType) {
        if let Err(e) = self
            .event_log
            .append(Event::new(workflow_id, event_type))
            .await
        {
            tracing::warn!("Failed to record event for workflow {}: {}", workflow_id, e);
        }
    }
}

/// Static inputs plus the output of each dependency under its step id
pub fn effective_input(step: &WorkflowStep, outputs: &StepOutputs) -> Value {
    let mut input = step.inputs.clone();
    for dep in &step.dependencies {
        if let Some(output) = outputs.get(dep) {
            input.insert(dep.0.clone(), output.clone());
        }
    }
    Value::Object(input)
}

fn ensure_unique_step_ids(workflow: &Workflow) -> Result<()> {
    let mut seen = HashSet::new();
    for step in &workflow.steps {
        if !seen.insert(&step.id) {
            return Err(WorkflowError::DuplicateStep {
                step_id: step.id.clone(),
            });
        }
    }
    Ok(())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Registration in the active-run table, removed on drop so an abandoned
/// `execute` future does not leave a stale entry behind
struct ActiveRun<'a> {
    runs: &'a ActiveRuns,
    workflow_id: WorkflowId,
}

impl<'a> ActiveRun<'a> {
    fn register(
        runs: &'a ActiveRuns,
        workflow_id: WorkflowId,
        pause_tx: watch::Sender<bool>,
    ) -> Result<Self> {
        let mut table = runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if table.contains_key(&workflow_id) {
            return Err(WorkflowError::AlreadyActive);
        }
        table.insert(workflow_id, pause_tx);
        Ok(Self { runs, workflow_id })
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.workflow_id);
    }
}
