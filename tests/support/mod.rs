#![allow(dead_code)]

use async_trait::async_trait;
use buildloom::job::{
    BuildPhase, BuildStep, BuilderJob, InMemoryJobStore, JobFilter, JobStore, StoreError,
};
use buildloom::progress::{ProgressEvent, ProgressHandler, ProgressStatus, PublishError};
use buildloom::{BuildConfig, BuildContext, BuildOrchestrator, MockOracle, MockSandbox};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Orchestrator wired to scripted collaborators, with handles kept for assertions
pub struct TestPipeline {
    pub sandbox: Arc<MockSandbox>,
    pub oracle: Arc<MockOracle>,
    pub store: Arc<dyn JobStore>,
    pub events: Arc<RecordingHandler>,
    pub orchestrator: BuildOrchestrator,
}

pub struct TestPipelineBuilder {
    sandbox: MockSandbox,
    oracle: MockOracle,
    store: Arc<dyn JobStore>,
    progress: Option<Arc<dyn ProgressHandler>>,
    config: BuildConfig,
}

impl TestPipelineBuilder {
    pub fn new() -> Self {
        Self {
            sandbox: MockSandbox::new(),
            oracle: MockOracle::new(),
            store: Arc::new(InMemoryJobStore::new()),
            progress: None,
            config: BuildConfig::default(),
        }
    }

    pub fn sandbox(mut self, sandbox: MockSandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = store;
        self
    }

    /// Extra handler that sees every event after the recording handler
    pub fn progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(handler);
        self
    }

    pub fn config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TestPipeline {
        let sandbox = Arc::new(self.sandbox);
        let oracle = Arc::new(self.oracle);
        let events = Arc::new(RecordingHandler::default());

        let progress: Arc<dyn ProgressHandler> = match self.progress {
            Some(extra) => {
                let recorder: Arc<dyn ProgressHandler> = events.clone();
                Arc::new(FanOut(vec![recorder, extra]))
            }
            None => events.clone() as Arc<dyn ProgressHandler>,
        };

        let ctx = BuildContext::new(sandbox.clone(), oracle.clone(), self.store.clone())
            .with_progress(progress)
            .with_config(self.config);

        TestPipeline {
            sandbox,
            oracle,
            store: self.store,
            events,
            orchestrator: BuildOrchestrator::new(ctx),
        }
    }
}

impl TestPipeline {
    pub fn new() -> Self {
        TestPipelineBuilder::new().build()
    }

    pub fn builder() -> TestPipelineBuilder {
        TestPipelineBuilder::new()
    }
}

/// Collects every published event in order
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressHandler for RecordingHandler {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct FanOut(Vec<Arc<dyn ProgressHandler>>);

impl ProgressHandler for FanOut {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), PublishError> {
        for handler in &self.0 {
            handler.on_progress(event)?;
        }
        Ok(())
    }
}

/// Cancels a token as soon as `phase` reports completion
pub struct CancelOnPhase {
    pub phase: BuildPhase,
    pub token: CancellationToken,
}

impl ProgressHandler for CancelOnPhase {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), PublishError> {
        if event.phase == self.phase && event.status == ProgressStatus::Completed {
            self.token.cancel();
        }
        Ok(())
    }
}

/// In-memory store whose `save` fails once the job enters `phase`
pub struct FailingStore {
    inner: InMemoryJobStore,
    phase: BuildPhase,
}

impl FailingStore {
    pub fn on_phase(phase: BuildPhase) -> Self {
        Self {
            inner: InMemoryJobStore::new(),
            phase,
        }
    }
}

#[async_trait]
impl JobStore for FailingStore {
    async fn create(&self, job: &BuilderJob) -> Result<(), StoreError> {
        self.inner.create(job).await
    }

    async fn get(&self, job_id: &str) -> Result<BuilderJob, StoreError> {
        self.inner.get(job_id).await
    }

    async fn save(&self, job: &BuilderJob) -> Result<(), StoreError> {
        if job.current_phase == Some(self.phase) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.save(job).await
    }

    async fn append_step(&self, step: &BuildStep) -> Result<(), StoreError> {
        self.inner.append_step(step).await
    }

    async fn complete_step(&self, job_id: &str, step_id: &str) -> Result<(), StoreError> {
        self.inner.complete_step(job_id, step_id).await
    }

    async fn steps(&self, job_id: &str) -> Result<Vec<BuildStep>, StoreError> {
        self.inner.steps(job_id).await
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<BuilderJob>, StoreError> {
        self.inner.list(filter).await
    }

    async fn cancel(&self, job_id: &str) -> Result<bool, StoreError> {
        self.inner.cancel(job_id).await
    }

    async fn is_cancel_requested(&self, job_id: &str) -> Result<bool, StoreError> {
        self.inner.is_cancel_requested(job_id).await
    }
}
