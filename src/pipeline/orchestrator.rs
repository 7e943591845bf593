use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::BuildContext;
use super::error::BuildError;
use super::phase_trait::WorkflowPhase;
use super::phases::default_phases;
use super::state::JobState;
use crate::job::{BuildPhase, BuildResult, BuildStep, BuilderJob, JobStatus};
use crate::plan::BuildPlan;
use crate::progress::ProgressStatus;

const CANCELLED_MESSAGE: &str = "Job cancelled";

enum RunOutcome {
    Finished,
    Cancelled(BuildPhase),
}

/// Drives build jobs through the six phases
pub struct BuildOrchestrator {
    ctx: BuildContext,
    phases: Vec<Box<dyn WorkflowPhase>>,
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl BuildOrchestrator {
    pub fn new(ctx: BuildContext) -> Self {
        Self {
            ctx,
            phases: default_phases(),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the phase list, e.g. to inject a failing phase in tests
    pub fn with_phases(mut self, phases: Vec<Box<dyn WorkflowPhase>>) -> Self {
        self.phases = phases;
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Creates a pending job for `plan`
    pub async fn submit(
        &self,
        task_id: impl Into<String>,
        plan: BuildPlan,
    ) -> Result<BuilderJob, BuildError> {
        self.submit_job(BuilderJob::new(task_id, plan)).await
    }

    pub async fn submit_job(&self, job: BuilderJob) -> Result<BuilderJob, BuildError> {
        self.ctx.store.create(&job).await?;
        info!(job_id = %job.id, task_id = %job.task_id, steps = job.plan.steps.len(), "Job submitted");
        Ok(job)
    }

    /// Submits and runs a plan in one go
    pub async fn build(
        &self,
        task_id: impl Into<String>,
        plan: BuildPlan,
    ) -> Result<BuildResult, BuildError> {
        let job = self.submit(task_id, plan).await?;
        self.run(&job.id).await
    }

    pub async fn run(&self, job_id: &str) -> Result<BuildResult, BuildError> {
        let token = self
            .tokens
            .lock()
            .await
            .entry(job_id.to_string())
            .or_default()
            .clone();
        let result = self.run_with_token(job_id, &token).await;
        self.tokens.lock().await.remove(job_id);
        result
    }

    /// Runs a stored job to a terminal status.
    ///
    /// Phase failures do not surface as `Err`: the job is marked failed and the
    /// returned result carries the message. Only a job that already finished,
    /// or one that cannot be loaded, is an error.
    pub async fn run_with_token(
        &self,
        job_id: &str,
        token: &CancellationToken,
    ) -> Result<BuildResult, BuildError> {
        let mut job = self.ctx.store.get(job_id).await?;
        if job.is_terminal() {
            return Err(BuildError::AlreadyFinished {
                job_id: job.id,
                status: job.status,
            });
        }
        job.started_at.get_or_insert_with(Utc::now);

        let start = Instant::now();
        info!(job_id = %job.id, task_id = %job.task_id, "Starting build");

        let mut state = JobState::new(job);
        let result = match self.drive(&mut state, token).await {
            Ok(RunOutcome::Finished) => self.complete(&mut state).await,
            Ok(RunOutcome::Cancelled(phase)) => self.cancelled(&mut state, phase).await,
            Err(e) => self.fail(&mut state, e).await,
        };

        info!(
            job_id = %state.job.id,
            status = %state.job.status,
            success = result.success,
            tokens = state.job.tokens_used,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Build finished"
        );
        Ok(result)
    }

    async fn cancel_requested(
        &self,
        job_id: &str,
        token: &CancellationToken,
    ) -> Result<bool, BuildError> {
        if token.is_cancelled() {
            return Ok(true);
        }
        Ok(self.ctx.store.is_cancel_requested(job_id).await?)
    }

    async fn drive(
        &self,
        state: &mut JobState,
        token: &CancellationToken,
    ) -> Result<RunOutcome, BuildError> {
        for phase in &self.phases {
            let name = phase.phase();
            if self.cancel_requested(&state.job.id, token).await? {
                return Ok(RunOutcome::Cancelled(name));
            }

            info!(job_id = %state.job.id, "Phase: {}", name);
            state.job.current_phase = Some(name);
            state.job.set_status(name.job_status());
            self.ctx.persist(&mut state.job).await?;
            self.ctx.publish(&state.event(
                name,
                ProgressStatus::Started,
                format!("Starting {}", name),
            ));

            let phase_start = Instant::now();
            if let Err(e) = phase.execute(&self.ctx, state).await {
                self.ctx
                    .publish(&state.event(name, ProgressStatus::Failed, e.to_string()));
                return Err(e);
            }

            self.ctx.publish(&state.event(
                name,
                ProgressStatus::Completed,
                format!("Completed {}", name),
            ));
            debug!(
                "Phase {} complete in {}ms",
                name,
                phase_start.elapsed().as_millis()
            );
        }

        // A cancel that lands during the last phase must not end as complete
        if let Some(last) = self.phases.last() {
            if self.cancel_requested(&state.job.id, token).await? {
                return Ok(RunOutcome::Cancelled(last.phase()));
            }
        }
        Ok(RunOutcome::Finished)
    }

    async fn complete(&self, state: &mut JobState) -> BuildResult {
        let integration = state.integration.clone();
        let success = integration.as_ref().map_or(true, |i| i.success);

        let mut errors: Vec<String> = state
            .job
            .failed_files()
            .filter_map(|f| f.errors.last().map(|e| format!("{}: {}", f.path, e)))
            .collect();
        if let Some(integration) = &integration {
            errors.extend(integration.errors.iter().cloned());
        }

        if success {
            state.job.set_status(JobStatus::Complete);
        } else {
            state.job.error = Some(format!(
                "Validation failed after {} iterations",
                state.job.build_iterations
            ));
            state.job.set_status(JobStatus::Failed);
        }
        self.save_final(state).await;

        BuildResult {
            job_id: state.job.id.clone(),
            success,
            files: state.output_files.clone(),
            tokens_used: state.job.tokens_used,
            cost_usd: state.job.cost_usd,
            validation_output: integration.map(|i| i.output),
            errors,
        }
    }

    async fn cancelled(&self, state: &mut JobState, phase: BuildPhase) -> BuildResult {
        info!(job_id = %state.job.id, "Cancelled at {}", phase);
        state.job.error = Some(CANCELLED_MESSAGE.to_string());
        state.job.set_status(JobStatus::Cancelled);
        self.save_final(state).await;
        self.ctx
            .publish(&state.event(phase, ProgressStatus::Failed, CANCELLED_MESSAGE));
        BuildResult::failed(&state.job, CANCELLED_MESSAGE)
    }

    async fn fail(&self, state: &mut JobState, error: BuildError) -> BuildResult {
        let message = error.to_string();
        warn!(job_id = %state.job.id, "Build failed: {}", message);
        state.job.error = Some(message.clone());
        state.job.set_status(JobStatus::Failed);
        self.save_final(state).await;
        BuildResult::failed(&state.job, message)
    }

    /// Last save of a finished job; the result is returned even if this fails
    async fn save_final(&self, state: &mut JobState) {
        if let Err(e) = self.ctx.persist(&mut state.job).await {
            warn!(job_id = %state.job.id, "Failed to save final job state: {}", e);
        }
    }

    /// Soft-cancels a job. Takes effect at the next phase boundary.
    pub async fn cancel(&self, job_id: &str) -> Result<bool, BuildError> {
        if let Some(token) = self.tokens.lock().await.get(job_id) {
            token.cancel();
        }
        let cancelled = self.ctx.store.cancel(job_id).await?;
        if cancelled {
            info!(job_id = %job_id, "Cancellation requested");
        }
        Ok(cancelled)
    }

    pub async fn status(&self, job_id: &str) -> Result<BuilderJob, BuildError> {
        Ok(self.ctx.store.get(job_id).await?)
    }

    pub async fn steps(&self, job_id: &str) -> Result<Vec<BuildStep>, BuildError> {
        Ok(self.ctx.store.steps(job_id).await?)
    }
}
