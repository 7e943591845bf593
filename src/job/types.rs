use crate::context_window::ContextWindow;
use crate::graph::DependencyGraph;
use crate::plan::{BuildPlan, StepAction};
use crate::strategy::BuildStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Planning,
    Building,
    Validating,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Planning => "planning",
            JobStatus::Building => "building",
            JobStatus::Validating => "validating",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Complete, failed and cancelled jobs never change status again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "planning" => Ok(JobStatus::Planning),
            "building" => Ok(JobStatus::Building),
            "validating" => Ok(JobStatus::Validating),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// The six pipeline phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Init,
    Scaffold,
    Dependencies,
    Implement,
    Integrate,
    Finalize,
}

impl BuildPhase {
    pub const ALL: [BuildPhase; 6] = [
        BuildPhase::Init,
        BuildPhase::Scaffold,
        BuildPhase::Dependencies,
        BuildPhase::Implement,
        BuildPhase::Integrate,
        BuildPhase::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::Init => "init",
            BuildPhase::Scaffold => "scaffold",
            BuildPhase::Dependencies => "dependencies",
            BuildPhase::Implement => "implement",
            BuildPhase::Integrate => "integrate",
            BuildPhase::Finalize => "finalize",
        }
    }

    /// Job status reported while this phase runs
    pub fn job_status(&self) -> JobStatus {
        match self {
            BuildPhase::Init => JobStatus::Planning,
            BuildPhase::Scaffold | BuildPhase::Dependencies | BuildPhase::Implement => {
                JobStatus::Building
            }
            BuildPhase::Integrate | BuildPhase::Finalize => JobStatus::Validating,
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Success,
    Failed,
    Deleted,
}

/// Outcome of one distinct file path within a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub path: String,
    pub state: FileState,
    pub attempts: u32,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub tainted: bool,
}

impl FileStatus {
    pub fn success(path: impl Into<String>, attempts: u32) -> Self {
        Self {
            path: path.into(),
            state: FileState::Success,
            attempts,
            errors: Vec::new(),
            tainted: false,
        }
    }

    pub fn failed(path: impl Into<String>, attempts: u32, errors: Vec<String>) -> Self {
        Self {
            path: path.into(),
            state: FileState::Failed,
            attempts,
            errors,
            tainted: true,
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            state: FileState::Deleted,
            attempts: 1,
            errors: Vec::new(),
            tainted: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == FileState::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

/// What an audit-log record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateFile,
    ModifyFile,
    DeleteFile,
    RunCommand,
    Install,
    Validate,
    FixFile,
}

impl From<StepAction> for StepKind {
    fn from(action: StepAction) -> Self {
        match action {
            StepAction::CreateFile => StepKind::CreateFile,
            StepAction::ModifyFile => StepKind::ModifyFile,
            StepAction::DeleteFile => StepKind::DeleteFile,
            StepAction::RunCommand => StepKind::RunCommand,
        }
    }
}

/// Append-only audit record of one attempted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStep {
    pub id: String,
    pub job_id: String,
    pub phase: BuildPhase,
    pub action: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub status: StepStatus,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_result: Option<String>,
    #[serde(default)]
    pub fix_attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BuildStep {
    pub fn new(job_id: impl Into<String>, phase: BuildPhase, action: StepKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            phase,
            action,
            file_path: None,
            status: StepStatus::Success,
            tokens_used: 0,
            error: None,
            validation_result: None,
            fix_attempts: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_fix_attempts(mut self, attempts: u32) -> Self {
        self.fix_attempts = attempts;
        self
    }

    pub fn with_validation(mut self, output: impl Into<String>) -> Self {
        self.validation_result = Some(output.into());
        self
    }
}

/// One file of the final build output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: String,
    pub content: String,
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub job_id: String,
    pub success: bool,
    pub files: Vec<OutputFile>,
    pub tokens_used: u64,
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_output: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl BuildResult {
    /// A result for a job that stopped before producing output
    pub fn failed(job: &BuilderJob, error: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            success: false,
            files: Vec::new(),
            tokens_used: job.tokens_used,
            cost_usd: job.cost_usd,
            validation_output: None,
            errors: vec![error.into()],
        }
    }
}

/// One build job, mutated in place by every phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderJob {
    pub id: String,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<String>,
    pub status: JobStatus,
    pub plan: BuildPlan,
    #[serde(default)]
    pub strategy: BuildStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<BuildPhase>,
    pub current_step: usize,
    pub total_steps: usize,
    #[serde(default)]
    pub files_written: Vec<FileStatus>,
    pub build_iterations: u32,
    #[serde(default)]
    pub context_window: ContextWindow,
    #[serde(default)]
    pub dependency_graph: DependencyGraph,
    pub tokens_used: u64,
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BuilderJob {
    pub fn new(task_id: impl Into<String>, plan: BuildPlan) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            sandbox_id: None,
            status: JobStatus::Pending,
            plan,
            strategy: BuildStrategy::default(),
            current_phase: None,
            current_step: 0,
            total_steps: 0,
            files_written: Vec::new(),
            build_iterations: 0,
            context_window: ContextWindow::new(),
            dependency_graph: DependencyGraph::new(),
            tokens_used: 0,
            cost_usd: 0.0,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_sandbox(mut self, sandbox_id: impl Into<String>) -> Self {
        self.sandbox_id = Some(sandbox_id.into());
        self
    }

    /// Seeds the context window with content that exists before the build
    pub fn with_existing_files(mut self, files: ContextWindow) -> Self {
        self.context_window = files;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves to `status` unless the job already reached a terminal status.
    /// Returns whether the status changed.
    pub fn set_status(&mut self, status: JobStatus) -> bool {
        if self.status.is_terminal() || self.status == status {
            return false;
        }
        self.status = status;
        if status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.touch();
        true
    }

    pub fn file(&self, path: &str) -> Option<&FileStatus> {
        self.files_written.iter().find(|f| f.path == path)
    }

    /// Inserts or replaces the entry for `status.path`
    pub fn record_file(&mut self, status: FileStatus) {
        match self.files_written.iter_mut().find(|f| f.path == status.path) {
            Some(existing) => *existing = status,
            None => self.files_written.push(status),
        }
    }

    /// Never moves the step counter backwards
    pub fn advance_to(&mut self, step: usize) {
        self.current_step = self.current_step.max(step);
    }

    /// Accumulates usage, ignoring negative or non-finite costs
    pub fn add_usage(&mut self, tokens: u64, cost_usd: f64) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
        if cost_usd.is_finite() && cost_usd > 0.0 {
            self.cost_usd += cost_usd;
        }
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &FileStatus> {
        self.files_written
            .iter()
            .filter(|f| f.state == FileState::Failed)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
