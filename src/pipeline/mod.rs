//! Six-phase build pipeline: init, scaffold, dependencies, implement,
//! integrate, finalize

pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod phase_trait;
pub mod phases;
pub mod state;

pub use config::BuildConfig;
pub use context::BuildContext;
pub use error::BuildError;
pub use orchestrator::BuildOrchestrator;
pub use phase_trait::WorkflowPhase;
pub use state::{IntegrationOutcome, JobState};
