//! Build job records, the audit log and their persistence

mod store;
mod types;

pub use store::{InMemoryJobStore, JobFilter, JobStore, JsonFileJobStore, StoreError};
pub use types::{
    BuildPhase, BuildResult, BuildStep, BuilderJob, FileState, FileStatus, JobStatus, OutputFile,
    StepKind, StepStatus,
};
