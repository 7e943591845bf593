//! Progress handler trait and events

use crate::job::BuildPhase;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Started,
    Completed,
    Failed,
}

/// One phase or file transition of a build job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: String,
    pub task_id: String,
    pub phase: BuildPhase,
    pub step: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    pub status: ProgressStatus,
    pub message: String,
}

impl ProgressEvent {
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.current_file = Some(path.into());
        self
    }
}

#[derive(Debug, Error)]
#[error("Failed to publish progress: {0}")]
pub struct PublishError(pub String);

/// Receives progress events. Callers treat failures as non-fatal.
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), PublishError>;
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Forwards events to an unbounded channel, e.g. for a UI or websocket bridge
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelHandler {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressHandler for ChannelHandler {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), PublishError> {
        self.sender
            .send(event.clone())
            .map_err(|_| PublishError("progress receiver dropped".to_string()))
    }
}

#[cfg(test)]
pub(crate) fn sample_event(status: ProgressStatus) -> ProgressEvent {
    ProgressEvent {
        job_id: "job-1".to_string(),
        task_id: "task-1".to_string(),
        phase: BuildPhase::Implement,
        step: 2,
        total_steps: 4,
        current_file: None,
        status,
        message: "Generating file".to_string(),
    }
}
