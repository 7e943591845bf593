//! Collaborators a build job runs against

use std::sync::Arc;

use tracing::warn;

use crate::job::{BuildStep, BuilderJob, JobStore};
use crate::oracle::CodeOracle;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::sandbox::Sandbox;

use super::config::BuildConfig;
use super::error::BuildError;

/// Owns every long-lived dependency of the pipeline
pub struct BuildContext {
    pub sandbox: Arc<dyn Sandbox>,
    pub oracle: Arc<dyn CodeOracle>,
    pub store: Arc<dyn JobStore>,
    pub progress: Arc<dyn ProgressHandler>,
    pub config: BuildConfig,
}

impl BuildContext {
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        oracle: Arc<dyn CodeOracle>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            sandbox,
            oracle,
            store,
            progress: Arc::new(NoOpHandler),
            config: BuildConfig::default(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Overwrites the stored job record
    pub async fn persist(&self, job: &mut BuilderJob) -> Result<(), BuildError> {
        job.touch();
        self.store.save(job).await?;
        Ok(())
    }

    /// Publishes an event, logging and dropping any failure
    pub fn publish(&self, event: &ProgressEvent) {
        if let Err(e) = self.progress.on_progress(event) {
            warn!(job_id = %event.job_id, phase = %event.phase, "{}", e);
        }
    }

    /// Appends a finished audit record
    pub async fn record_step(&self, step: BuildStep) -> Result<(), BuildError> {
        self.store.append_step(&step).await?;
        self.store.complete_step(&step.job_id, &step.id).await?;
        Ok(())
    }
}
