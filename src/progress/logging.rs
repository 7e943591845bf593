//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler, ProgressStatus, PublishError};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), PublishError> {
        let progress = format!("{}/{}", event.step, event.total_steps);
        match (event.status, event.current_file.as_deref()) {
            (ProgressStatus::Started | ProgressStatus::Completed, None) => {
                info!(
                    job = %event.job_id,
                    phase = %event.phase,
                    progress = %progress,
                    "{}",
                    event.message
                );
            }
            (ProgressStatus::Started | ProgressStatus::Completed, Some(file)) => {
                debug!(
                    job = %event.job_id,
                    phase = %event.phase,
                    file,
                    progress = %progress,
                    "{}",
                    event.message
                );
            }
            (ProgressStatus::Failed, file) => {
                warn!(
                    job = %event.job_id,
                    phase = %event.phase,
                    file = file.unwrap_or("-"),
                    progress = %progress,
                    "{}",
                    event.message
                );
            }
        }
        Ok(())
    }
}
