//! Job and audit-step persistence

use super::types::{BuildStep, BuilderJob, JobStatus};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid job id: {0}")]
    InvalidId(String),

    #[error("Job store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    #[error("Job {job_id} already finished with status {status}")]
    Finished { job_id: String, status: JobStatus },
}

/// Criteria for [`JobStore::list`]; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub task_id: Option<String>,
    /// `owner/name` of the plan's repository
    pub repo: Option<String>,
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn matches(&self, job: &BuilderJob) -> bool {
        self.status.map_or(true, |s| job.status == s)
            && self.task_id.as_deref().map_or(true, |t| job.task_id == t)
            && self
                .repo
                .as_deref()
                .map_or(true, |r| job.plan.repo.full_name() == r)
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &BuilderJob) -> Result<(), StoreError>;

    async fn get(&self, job_id: &str) -> Result<BuilderJob, StoreError>;

    /// Overwrites the stored job. A pending cancel keeps the record cancelled,
    /// and a stored terminal status is never replaced by a different one.
    async fn save(&self, job: &BuilderJob) -> Result<(), StoreError>;

    async fn append_step(&self, step: &BuildStep) -> Result<(), StoreError>;

    /// Stamps the completion time of a step; the only mutation a step allows
    async fn complete_step(&self, job_id: &str, step_id: &str) -> Result<(), StoreError>;

    async fn steps(&self, job_id: &str) -> Result<Vec<BuildStep>, StoreError>;

    /// Matching jobs, oldest first
    async fn list(&self, filter: &JobFilter) -> Result<Vec<BuilderJob>, StoreError>;

    /// Soft-cancels a job. Returns `false` when it already reached a terminal status.
    async fn cancel(&self, job_id: &str) -> Result<bool, StoreError>;

    async fn is_cancel_requested(&self, job_id: &str) -> Result<bool, StoreError>;
}

/// Record to write over `stored`, or `Finished` when it would leave a terminal status
fn guard_status(
    job: &BuilderJob,
    stored: Option<&BuilderJob>,
    cancelled: bool,
) -> Result<BuilderJob, StoreError> {
    let mut job = job.clone();
    if cancelled && !job.status.is_terminal() {
        job.set_status(JobStatus::Cancelled);
    }
    if let Some(stored) = stored {
        if stored.status.is_terminal() && stored.status != job.status {
            return Err(StoreError::Finished {
                job_id: job.id,
                status: stored.status,
            });
        }
    }
    Ok(job)
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<IndexMap<String, BuilderJob>>,
    steps: RwLock<IndexMap<String, Vec<BuildStep>>>,
    cancelled: RwLock<HashSet<String>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &BuilderJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<BuilderJob, StoreError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    async fn save(&self, job: &BuilderJob) -> Result<(), StoreError> {
        let cancelled = self.cancelled.read().await.contains(&job.id);
        let mut jobs = self.jobs.write().await;
        let job = guard_status(job, jobs.get(&job.id), cancelled)?;
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn append_step(&self, step: &BuildStep) -> Result<(), StoreError> {
        self.steps
            .write()
            .await
            .entry(step.job_id.clone())
            .or_default()
            .push(step.clone());
        Ok(())
    }

    async fn complete_step(&self, job_id: &str, step_id: &str) -> Result<(), StoreError> {
        let mut steps = self.steps.write().await;
        let step = steps
            .get_mut(job_id)
            .and_then(|list| list.iter_mut().find(|s| s.id == step_id))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", job_id, step_id)))?;
        step.completed_at.get_or_insert_with(Utc::now);
        Ok(())
    }

    async fn steps(&self, job_id: &str) -> Result<Vec<BuildStep>, StoreError> {
        Ok(self
            .steps
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<BuilderJob>, StoreError> {
        let mut jobs: Vec<BuilderJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn cancel(&self, job_id: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        if job.is_terminal() {
            return Ok(false);
        }
        job.set_status(JobStatus::Cancelled);
        self.cancelled.write().await.insert(job_id.to_string());
        Ok(true)
    }

    async fn is_cancel_requested(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(self.cancelled.read().await.contains(job_id))
    }
}

/// Directory-backed store: `<id>.json` per job, `<id>.steps.jsonl` audit log
/// and an `<id>.cancel` marker for soft cancellation.
pub struct JsonFileJobStore {
    root: PathBuf,
}

impl JsonFileJobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened job store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn checked_id(job_id: &str) -> Result<&str, StoreError> {
        let valid = !job_id.is_empty()
            && job_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(job_id)
        } else {
            Err(StoreError::InvalidId(job_id.to_string()))
        }
    }

    fn job_path(&self, job_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(format!("{}.json", Self::checked_id(job_id)?)))
    }

    fn steps_path(&self, job_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .root
            .join(format!("{}.steps.jsonl", Self::checked_id(job_id)?)))
    }

    fn cancel_path(&self, job_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(format!("{}.cancel", Self::checked_id(job_id)?)))
    }

    /// Writes through a temp file and rename so readers never see a torn file
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn write_job(&self, job: &BuilderJob) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(job)?;
        Self::write_atomic(&self.job_path(&job.id)?, &bytes).await
    }

    async fn read_steps(&self, job_id: &str) -> Result<Vec<BuildStep>, StoreError> {
        let path = self.steps_path(job_id)?;
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl JobStore for JsonFileJobStore {
    async fn create(&self, job: &BuilderJob) -> Result<(), StoreError> {
        if fs::try_exists(self.job_path(&job.id)?).await? {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        self.write_job(job).await
    }

    async fn get(&self, job_id: &str) -> Result<BuilderJob, StoreError> {
        let path = self.job_path(job_id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(job_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, job: &BuilderJob) -> Result<(), StoreError> {
        let cancelled = self.is_cancel_requested(&job.id).await?;
        let stored = match self.get(&job.id).await {
            Ok(stored) => Some(stored),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        self.write_job(&guard_status(job, stored.as_ref(), cancelled)?)
            .await
    }

    async fn append_step(&self, step: &BuildStep) -> Result<(), StoreError> {
        use tokio::io::AsyncWriteExt;

        let mut line = serde_json::to_string(step)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.steps_path(&step.job_id)?)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn complete_step(&self, job_id: &str, step_id: &str) -> Result<(), StoreError> {
        let mut steps = self.read_steps(job_id).await?;
        let step = steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", job_id, step_id)))?;
        if step.completed_at.is_some() {
            return Ok(());
        }
        step.completed_at = Some(Utc::now());

        let mut out = String::new();
        for step in &steps {
            out.push_str(&serde_json::to_string(step)?);
            out.push('\n');
        }
        Self::write_atomic(&self.steps_path(job_id)?, out.as_bytes()).await
    }

    async fn steps(&self, job_id: &str) -> Result<Vec<BuildStep>, StoreError> {
        self.read_steps(job_id).await
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<BuilderJob>, StoreError> {
        let mut jobs = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(job_id) = name.strip_suffix(".json") else {
                continue;
            };
            let job = self.get(job_id).await?;
            if filter.matches(&job) {
                jobs.push(job);
            }
        }
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn cancel(&self, job_id: &str) -> Result<bool, StoreError> {
        let mut job = self.get(job_id).await?;
        if job.is_terminal() {
            return Ok(false);
        }
        fs::write(self.cancel_path(job_id)?, b"").await?;
        job.set_status(JobStatus::Cancelled);
        self.write_job(&job).await?;
        Ok(true)
    }

    async fn is_cancel_requested(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.cancel_path(job_id)?).await?)
    }
}
