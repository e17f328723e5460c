//! Run supervisor
//!
//! Owns one run from start to finish: navigates to the start URL, drives the
//! flow controller, dispatches steps, folds outcomes into the execution
//! context and emits one record entry per executed instruction. This is the
//! only place where failures are classified as recoverable or fatal.

use async_trait::async_trait;
use browser_driver::{BrowserDriver, SessionProvider};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use webjob_core_types::RunId;
use webjob_event_bus::EventBus;

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::errors::{StepError, SupervisorError};
use crate::events::{Progress, RunEvent};
use crate::flow::{FlowController, FlowDecision, Next};
use crate::interpreters::{execute_step, StepEnv};
use crate::model::{Instruction, Job};
use crate::record::{
    EntryStatus, RecordEntry, RecordedError, RunFailure, RunOutcome, RunRecord, RunRecorder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl From<RunOutcome> for SupervisorState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => SupervisorState::Completed,
            RunOutcome::Failed => SupervisorState::Failed,
            RunOutcome::Cancelled => SupervisorState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Record the failure and continue with the next instruction
    Recoverable,
    /// Freeze the record and end the run as failed
    Fatal,
}

/// Decide whether a step failure ends the run.
pub fn classify(err: &StepError) -> FailureClass {
    match err {
        StepError::ElementNotFound { .. }
        | StepError::DataResolution(_)
        | StepError::Interaction(_)
        | StepError::NavigationTimeout { .. }
        | StepError::Unsupported(_)
        | StepError::InvalidStep(_) => FailureClass::Recoverable,
        StepError::Navigation(_) | StepError::SessionClosed(_) => FailureClass::Fatal,
    }
}

/// Persistence or notification collaborator receiving finished records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn record_finished(&self, record: &RunRecord) -> anyhow::Result<()>;
}

/// Executes a single run attempt. Create a new supervisor to run again.
pub struct RunSupervisor {
    run_id: RunId,
    config: EngineConfig,
    cancel: CancellationToken,
    events: Option<Arc<dyn EventBus<RunEvent>>>,
    sink: Option<Arc<dyn RecordSink>>,
    state: SupervisorState,
}

impl RunSupervisor {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            run_id: RunId::new(),
            config,
            cancel: CancellationToken::new(),
            events: None,
            sink: None,
            state: SupervisorState::Idle,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_events(mut self, bus: Arc<dyn EventBus<RunEvent>>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Token that cancels this run at the next instruction boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open a session from `provider`, run the job on it and close it.
    pub async fn run_with_provider(
        &mut self,
        job: &Job,
        provider: &dyn SessionProvider,
    ) -> Result<RunRecord, SupervisorError> {
        self.begin()?;

        let driver = match provider.open_session().await {
            Ok((session_id, driver)) => {
                debug!(run_id = %self.run_id, session_id = %session_id, "Session opened");
                driver
            }
            Err(err) => {
                error!(run_id = %self.run_id, error = %err, "Driver initialization failed");
                let recorder = RunRecorder::new(
                    self.run_id.clone(),
                    job.name.clone(),
                    job.count_instructions(),
                );
                let failure = RunFailure {
                    position: None,
                    error: RecordedError::new(err.code(), err.to_string(), true),
                };
                let mut context = ExecutionContext::new();
                return Ok(self
                    .conclude(recorder, &mut context, RunOutcome::Failed, Some(failure))
                    .await);
            }
        };

        let record = self.execute(job, driver.as_ref(), ExecutionContext::new()).await;

        if let Err(err) = driver.close().await {
            debug!(run_id = %self.run_id, error = %err, "Closing session failed");
        }

        Ok(record)
    }

    /// Execute `job` against `driver`, starting from `context`.
    pub async fn run(
        &mut self,
        job: &Job,
        driver: &dyn BrowserDriver,
        context: ExecutionContext,
    ) -> Result<RunRecord, SupervisorError> {
        self.begin()?;
        Ok(self.execute(job, driver, context).await)
    }

    fn begin(&mut self) -> Result<(), SupervisorError> {
        if self.state != SupervisorState::Idle {
            return Err(SupervisorError::AlreadyStarted(self.run_id.to_string()));
        }
        self.state = SupervisorState::Running;
        Ok(())
    }

    async fn execute(
        &mut self,
        job: &Job,
        driver: &dyn BrowserDriver,
        mut context: ExecutionContext,
    ) -> RunRecord {
        let total = job.count_instructions();
        let mut recorder = RunRecorder::new(self.run_id.clone(), job.name.clone(), total);

        info!(
            run_id = %self.run_id,
            job = %job.name,
            total_instructions = total,
            "Run started"
        );
        self.emit(RunEvent::RunStarted {
            run_id: self.run_id.clone(),
            job_name: job.name.clone(),
            total_instructions: total,
            started_at: context.started_at(),
        });

        let mode = match job.validate(self.config.max_depth) {
            Ok(mode) => mode,
            Err(err) => {
                error!(run_id = %self.run_id, error = %err, "Job rejected");
                let failure = RunFailure {
                    position: None,
                    error: RecordedError::from_flow(&err),
                };
                return self
                    .conclude(recorder, &mut context, RunOutcome::Failed, Some(failure))
                    .await;
            }
        };

        if self.cancel.is_cancelled() {
            return self
                .conclude(recorder, &mut context, RunOutcome::Cancelled, None)
                .await;
        }

        if !job.start_url.trim().is_empty() {
            debug!(run_id = %self.run_id, url = %job.start_url, "Loading start URL");
            if let Err(err) = driver
                .navigate(&job.start_url, self.config.navigation_timeout())
                .await
            {
                error!(run_id = %self.run_id, error = %err, "Start URL failed to load");
                let failure = RunFailure {
                    position: None,
                    error: RecordedError::new(
                        "start_navigation",
                        format!("{}: {}", job.start_url, err),
                        true,
                    ),
                };
                return self
                    .conclude(recorder, &mut context, RunOutcome::Failed, Some(failure))
                    .await;
            }
        }

        let mut controller = FlowController::for_job(job, mode, self.config.max_steps);

        loop {
            if self.cancel.is_cancelled() {
                controller.terminate();
                info!(
                    run_id = %self.run_id,
                    executed = context.steps_executed(),
                    "Run cancelled"
                );
                return self
                    .conclude(recorder, &mut context, RunOutcome::Cancelled, None)
                    .await;
            }

            let located = match controller.next(&context) {
                Ok(Next::Instruction(located)) => located,
                Ok(Next::Terminal) => break,
                Err(err) => {
                    error!(run_id = %self.run_id, error = %err, "Flow terminated");
                    let failure = RunFailure {
                        position: None,
                        error: RecordedError::from_flow(&err),
                    };
                    return self
                        .conclude(recorder, &mut context, RunOutcome::Failed, Some(failure))
                        .await;
                }
            };

            let started_at = Utc::now();
            let started = Instant::now();
            let mut entry = RecordEntry {
                sequence: recorder.next_sequence(),
                position: located.position.clone(),
                instruction_id: located.instruction.id().map(str::to_string),
                kind: located.instruction.kind_label(),
                status: EntryStatus::Succeeded,
                started_at,
                finished_at: started_at,
                latency_ms: 0,
                attempts: 1,
                navigated: false,
                captured: None,
                decision: None,
                error: None,
            };

            match located.instruction {
                Instruction::Step(step) => {
                    let env = StepEnv::new(&context, &self.config);
                    let attempt = execute_step(step, &env, driver).await;
                    entry.attempts = attempt.attempts;

                    match attempt.result {
                        Ok(outcome) => {
                            entry.navigated = outcome.navigated;
                            if let Some(value) = outcome.captured {
                                if let Some(capture) = &step.capture {
                                    context.capture(capture, value.clone());
                                }
                                entry.captured = Some(value);
                            }
                            context.record_step_result(true);
                        }
                        Err(err) => match classify(&err) {
                            FailureClass::Recoverable => {
                                warn!(
                                    run_id = %self.run_id,
                                    position = %located.position,
                                    code = err.code(),
                                    error = %err,
                                    "Step failed, continuing"
                                );
                                entry.status = EntryStatus::Failed;
                                entry.error = Some(RecordedError::from_step(&err, false));
                                context.record_step_result(false);
                            }
                            FailureClass::Fatal => {
                                controller.terminate();
                                error!(
                                    run_id = %self.run_id,
                                    position = %located.position,
                                    code = err.code(),
                                    error = %err,
                                    "Step failed fatally"
                                );
                                let failure = RunFailure {
                                    position: Some(located.position),
                                    error: RecordedError::from_step(&err, true),
                                };
                                return self
                                    .conclude(
                                        recorder,
                                        &mut context,
                                        RunOutcome::Failed,
                                        Some(failure),
                                    )
                                    .await;
                            }
                        },
                    }
                }
                Instruction::Condition(condition) => {
                    match controller.evaluate(&located.position, condition, &context) {
                        Ok(decision) => {
                            if let FlowDecision::Jump { backward: true, .. } = decision {
                                context.clear_locals();
                            }
                            entry.decision = Some(decision);
                        }
                        Err(err) => {
                            error!(run_id = %self.run_id, error = %err, "Flow terminated");
                            let failure = RunFailure {
                                position: Some(located.position),
                                error: RecordedError::from_flow(&err),
                            };
                            return self
                                .conclude(recorder, &mut context, RunOutcome::Failed, Some(failure))
                                .await;
                        }
                    }
                }
                Instruction::AiAction(_) => {
                    let err = StepError::Unsupported(
                        "AI-resolved actions are not executable".to_string(),
                    );
                    warn!(
                        run_id = %self.run_id,
                        position = %located.position,
                        "Skipping reserved aiAction instruction"
                    );
                    entry.status = EntryStatus::Failed;
                    entry.error = Some(RecordedError::from_step(&err, false));
                    context.record_step_result(false);
                }
            }

            context.count_instruction();
            entry.finished_at = Utc::now();
            entry.latency_ms = started.elapsed().as_millis() as u64;

            let entry = recorder.append(entry).clone();
            debug!(
                run_id = %self.run_id,
                position = %entry.position,
                kind = %entry.kind,
                status = ?entry.status,
                latency_ms = entry.latency_ms,
                "Instruction finished"
            );
            self.emit(RunEvent::InstructionFinished {
                run_id: self.run_id.clone(),
                entry,
                progress: Progress {
                    executed: context.steps_executed(),
                    total,
                },
            });
        }

        self.conclude(recorder, &mut context, RunOutcome::Completed, None)
            .await
    }

    async fn conclude(
        &mut self,
        recorder: RunRecorder,
        context: &mut ExecutionContext,
        outcome: RunOutcome,
        failure: Option<RunFailure>,
    ) -> RunRecord {
        context.finish(outcome);
        self.state = outcome.into();

        let record = recorder.finish(outcome, failure, context.return_values().clone());

        info!(
            run_id = %self.run_id,
            outcome = outcome.as_str(),
            entries = record.entries.len(),
            failed_entries = record.failed_entries(),
            latency_ms = record.latency_ms,
            "Run finished"
        );
        self.emit(RunEvent::RunFinished {
            run_id: self.run_id.clone(),
            outcome,
            entries: record.entries.len(),
            failure: record.failure.clone(),
        });

        if let Some(sink) = &self.sink {
            if let Err(err) = sink.record_finished(&record).await {
                warn!(run_id = %self.run_id, error = %err, "Record sink failed");
            }
        }

        record
    }

    fn emit(&self, event: RunEvent) {
        if let Some(bus) = &self.events {
            // No subscribers is not an error for the run.
            let _ = bus.publish(event);
        }
    }
}
