use crate::job::{BuildPhase, JobStatus, StoreError};
use crate::oracle::OracleError;
use crate::sandbox::SandboxError;
use thiserror::Error;

/// Errors that stop a build job
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Phase {phase} failed: {message}")]
    Phase { phase: BuildPhase, message: String },

    #[error("Job {job_id} already finished with status {status}")]
    AlreadyFinished { job_id: String, status: JobStatus },
}

impl BuildError {
    pub fn phase(phase: BuildPhase, message: impl Into<String>) -> Self {
        BuildError::Phase {
            phase,
            message: message.into(),
        }
    }
}
