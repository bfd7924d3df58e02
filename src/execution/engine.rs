//! Workflow Execution Engine
//!
//! Runs a compiled workflow against an execution context:
//! - Sequential steps in declaration order, stopping at the first failure
//! - Parallel steps afterwards, at most `max_parallel` at a time, with
//!   failures recorded and tolerated
//! - One deadline for the whole run; steps still running when it passes are
//!   abandoned
//!
//! Every step runs on its own worker thread and reports back over a channel.
//! The coordinating thread blocks on that channel until a result arrives or
//! the deadline passes.

use std::collections::HashSet;
use std::io;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, error, info, warn};
use serde_json::Value;

use super::context::{step_error_key, ExecutionContext, WorkflowStatus, ERROR_KEY};
use super::step::{execute_step, Step, StepResult};
use super::workflow::Workflow;
use crate::error::ExecutionError;
use crate::monitoring::{EventType, ExecutionTimeline};

/// Result of one workflow run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: WorkflowStatus,
    pub timeline: ExecutionTimeline,
}

/// Workflow execution engine.
///
/// The engine holds no per-run state and can be shared by any number of
/// concurrent runs. `max_parallel` bounds the parallel steps of one run;
/// concurrent runs, and workers left behind by timed-out runs, each count
/// separately, so the process-wide thread count grows with the number of
/// requests in flight.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use orchestrator::execution::{Engine, ExecutionContext, Workflow, WorkflowStatus};
///
/// let workflow = Workflow::new("empty", "Nothing to do", vec![], vec![]);
/// let context = Arc::new(ExecutionContext::for_request("empty", serde_json::Value::Null));
///
/// let mut engine = Engine::new();
/// engine.set_max_parallel(4);
///
/// let report = engine.run(&workflow, &context);
/// assert_eq!(report.status, WorkflowStatus::Completed);
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    max_parallel: usize,
}

impl Engine {
    /// Creates an engine running up to one parallel step per CPU.
    pub fn new() -> Self {
        Self {
            max_parallel: num_cpus::get().max(1),
        }
    }

    /// Creates an engine with an explicit parallelism bound.
    pub fn with_max_parallel(max_parallel: usize) -> Self {
        let mut engine = Self::new();
        engine.set_max_parallel(max_parallel);
        engine
    }

    /// Sets the maximum number of parallel steps running at once in a run.
    pub fn set_max_parallel(&mut self, max: usize) {
        self.max_parallel = max.max(1);
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Executes the workflow.
    ///
    /// The final status is stored in the context and returned in the report.
    /// On failure the reserved `error` key holds the reason.
    pub fn run(&self, workflow: &Workflow, context: &Arc<ExecutionContext>) -> RunReport {
        let mut timeline = ExecutionTimeline::new();
        // A timeout too large to represent means the run has no deadline
        let deadline = Instant::now().checked_add(workflow.timeout());
        context.set_status(WorkflowStatus::Running);

        info!(
            "Starting workflow: {} ({} sequential, {} parallel, parallel={})",
            workflow.id(),
            workflow.sequential_steps().len(),
            workflow.parallel_steps().len(),
            workflow.allow_parallel_execution()
        );

        let outcome = self
            .run_sequential(workflow, context, deadline, &mut timeline)
            .and_then(|()| {
                if workflow.allow_parallel_execution() {
                    self.run_parallel(workflow, context, deadline, &mut timeline)
                } else {
                    if !workflow.parallel_steps().is_empty() {
                        debug!(
                            "Parallel execution disabled for {}: skipping {} steps",
                            workflow.id(),
                            workflow.parallel_steps().len()
                        );
                    }
                    Ok(())
                }
            });

        let status = match outcome {
            Ok(()) => {
                info!(
                    "Workflow {} completed in {:.2?}",
                    workflow.id(),
                    timeline.elapsed()
                );
                WorkflowStatus::Completed
            }
            Err(err) => {
                if matches!(err, ExecutionError::TimedOut { .. }) {
                    context.cancel();
                }
                error!("Workflow {} failed: {}", workflow.id(), err);
                context.put(ERROR_KEY, Value::String(err.to_string()));
                WorkflowStatus::Failed
            }
        };

        context.set_status(status);
        RunReport { status, timeline }
    }

    /// Runs the sequential steps, fail-fast.
    fn run_sequential(
        &self,
        workflow: &Workflow,
        context: &Arc<ExecutionContext>,
        deadline: Option<Instant>,
        timeline: &mut ExecutionTimeline,
    ) -> Result<(), ExecutionError> {
        for step in workflow.sequential_steps() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(timed_out(workflow));
            }

            info!("Sequential: {}", step.id());
            timeline.add_event(step.id(), EventType::Started);

            let (tx, rx) = channel();
            let spawned = spawn_step(step, context, &tx);
            drop(tx);

            let result = match spawned {
                Ok(()) => match wait_for_result(&rx, deadline, workflow) {
                    Ok(result) => result,
                    Err(err) => {
                        timeline.add_event(step.id(), EventType::Abandoned);
                        return Err(err);
                    }
                },
                Err(e) => StepResult::failure(step.id(), format!("could not start worker: {}", e)),
            };

            if !result.success {
                timeline.add_event(step.id(), EventType::Failed);
                return Err(ExecutionError::StepFailed {
                    step_id: result.step_id,
                    message: result.error_message.unwrap_or_default(),
                });
            }

            timeline.add_event(step.id(), EventType::Completed);
        }

        Ok(())
    }

    /// Runs the parallel group, best-effort.
    ///
    /// Failures are written to the step's `<id>.error` key and do not stop
    /// the other steps. Only the deadline or a lost worker ends the batch
    /// early.
    fn run_parallel(
        &self,
        workflow: &Workflow,
        context: &Arc<ExecutionContext>,
        deadline: Option<Instant>,
        timeline: &mut ExecutionTimeline,
    ) -> Result<(), ExecutionError> {
        let steps = workflow.parallel_steps();
        if steps.is_empty() {
            return Ok(());
        }

        info!(
            "Running {} parallel steps (max parallel: {})",
            steps.len(),
            self.max_parallel
        );

        let (tx, rx) = channel();
        let mut sender = Some(tx);
        let mut pending = steps.iter();
        let mut running: HashSet<String> = HashSet::new();
        let mut failed = 0;

        loop {
            // Fill free worker slots
            if let Some(tx) = &sender {
                while running.len() < self.max_parallel {
                    let Some(step) = pending.next() else {
                        break;
                    };

                    info!("Parallel: {}", step.id());
                    timeline.add_event(step.id(), EventType::Started);

                    match spawn_step(step, context, tx) {
                        Ok(()) => {
                            running.insert(step.id().to_string());
                        }
                        Err(e) => {
                            let result = StepResult::failure(
                                step.id(),
                                format!("could not start worker: {}", e),
                            );
                            record_parallel_failure(&result, context, timeline);
                            failed += 1;
                        }
                    }
                }
            }

            // Only running workers hold senders once everything is started
            if pending.len() == 0 {
                sender = None;
            }

            if running.is_empty() {
                break;
            }

            let result = match wait_for_result(&rx, deadline, workflow) {
                Ok(result) => result,
                Err(err) => {
                    for step_id in &running {
                        timeline.add_event(step_id.as_str(), EventType::Abandoned);
                    }
                    warn!(
                        "Abandoning {} parallel steps of {}",
                        running.len(),
                        workflow.id()
                    );
                    return Err(err);
                }
            };

            running.remove(&result.step_id);

            if result.success {
                timeline.add_event(result.step_id.as_str(), EventType::Completed);
            } else {
                record_parallel_failure(&result, context, timeline);
                failed += 1;
            }
        }

        if failed > 0 {
            warn!(
                "{} of {} parallel steps failed in {} (tolerated)",
                failed,
                steps.len(),
                workflow.id()
            );
        }

        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts a worker thread running the step and reporting its result.
fn spawn_step(
    step: &Arc<Step>,
    context: &Arc<ExecutionContext>,
    tx: &Sender<StepResult>,
) -> io::Result<()> {
    let step = Arc::clone(step);
    let context = Arc::clone(context);
    let tx = tx.clone();

    thread::Builder::new()
        .name(format!("step-{}", step.id()))
        .spawn(move || {
            let result = execute_step(&step, &context);
            if tx.send(result).is_err() {
                debug!("Step '{}' finished after its run was abandoned", step.id());
            }
        })
        .map(|_| ())
}

/// Blocks until a worker reports or the deadline passes.
///
/// Fails with `WorkerLost` when every sender is gone without a result.
fn wait_for_result(
    rx: &Receiver<StepResult>,
    deadline: Option<Instant>,
    workflow: &Workflow,
) -> Result<StepResult, ExecutionError> {
    let Some(deadline) = deadline else {
        return rx.recv().map_err(|_| ExecutionError::WorkerLost);
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(result) => Ok(result),
        Err(RecvTimeoutError::Timeout) => Err(timed_out(workflow)),
        Err(RecvTimeoutError::Disconnected) => Err(ExecutionError::WorkerLost),
    }
}

fn record_parallel_failure(
    result: &StepResult,
    context: &ExecutionContext,
    timeline: &mut ExecutionTimeline,
) {
    warn!(
        "Parallel step failed (continuing): {}: {}",
        result.step_id,
        result.message()
    );
    timeline.add_event(result.step_id.as_str(), EventType::Failed);
    context.put(
        step_error_key(&result.step_id),
        Value::String(result.message().to_string()),
    );
}

fn timed_out(workflow: &Workflow) -> ExecutionError {
    ExecutionError::TimedOut {
        workflow_id: workflow.id().to_string(),
        seconds: workflow.timeout_seconds(),
    }
}
