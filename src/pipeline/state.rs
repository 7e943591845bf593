//! Mutable per-job state threaded through the phases

use std::collections::HashSet;

use crate::graph::CycleError;
use crate::job::{BuildPhase, BuilderJob, OutputFile};
use crate::progress::{ProgressEvent, ProgressStatus};

/// Result of the whole-project repair loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationOutcome {
    pub success: bool,
    pub output: String,
    pub errors: Vec<String>,
}

pub struct JobState {
    pub job: BuilderJob,
    /// Paths in the order the implement phase builds them
    pub build_order: Vec<String>,
    /// Set when the graph was cyclic and `build_order` is plan order
    pub cycle: Option<CycleError>,
    /// Plan step indices already run by an earlier phase
    pub executed_commands: HashSet<usize>,
    pub integration: Option<IntegrationOutcome>,
    pub output_files: Vec<OutputFile>,
}

impl JobState {
    pub fn new(job: BuilderJob) -> Self {
        Self {
            job,
            build_order: Vec::new(),
            cycle: None,
            executed_commands: HashSet::new(),
            integration: None,
            output_files: Vec::new(),
        }
    }

    pub fn event(
        &self,
        phase: BuildPhase,
        status: ProgressStatus,
        message: impl Into<String>,
    ) -> ProgressEvent {
        ProgressEvent {
            job_id: self.job.id.clone(),
            task_id: self.job.task_id.clone(),
            phase,
            step: self.job.current_step,
            total_steps: self.job.total_steps,
            current_file: None,
            status,
            message: message.into(),
        }
    }

    pub fn model(&self) -> Option<String> {
        self.job.plan.model.clone()
    }
}
