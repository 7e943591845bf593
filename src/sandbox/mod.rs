//! Isolated filesystem and command execution the build writes into
//!
//! The orchestrator only ever talks to [`Sandbox`]; [`LocalSandbox`] runs
//! against a directory on this machine and [`MockSandbox`] scripts outcomes
//! for tests.

mod local;
mod mock;

pub use local::{parse_diagnostics, LocalSandbox};
pub use mock::MockSandbox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Path escapes sandbox root: {0}")]
    PathEscape(String),

    #[error("Sandbox IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("Sandbox unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let stderr = self.stderr.trim_end();
        if !stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(stderr);
        }
        out
    }
}

/// Result of checking a single file right after it was written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalCheck {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl IncrementalCheck {
    pub fn passed() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
        }
    }
}

/// Result of validating the whole project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            errors: Vec::new(),
        }
    }

    pub fn failed(output: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            errors,
        }
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;

    async fn delete_file(&self, path: &str) -> Result<(), SandboxError>;

    async fn run_command(&self, command: &str, timeout_secs: u64)
        -> Result<CommandOutput, SandboxError>;

    async fn validate_incremental(&self, path: &str) -> Result<IncrementalCheck, SandboxError>;

    async fn validate(&self) -> Result<ValidationReport, SandboxError>;
}
