//! Code-generation oracle the implement and integrate phases call into

mod llm;
mod mock;

pub use llm::{strip_code_fences, LlmOracle, Pricing};
pub use mock::MockOracle;

use crate::llm::BackendError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("LLM backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Oracle returned no content for {0}")]
    EmptyResponse(String),

    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}

/// Content produced by the oracle with its usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    pub tokens_used: u64,
    pub cost_usd: f64,
}

impl Generation {
    pub fn new(content: impl Into<String>, tokens_used: u64, cost_usd: f64) -> Self {
        Self {
            content: content.into(),
            tokens_used,
            cost_usd,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateRequest {
    pub task_description: String,
    pub path: String,
    /// What the plan says this file should do
    pub intent: Option<String>,
    /// Current content when the step modifies an existing file
    pub existing_content: Option<String>,
    /// Already-built dependencies of `path`
    pub context: IndexMap<String, String>,
    /// Every file the plan writes
    pub known_files: Vec<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixRequest {
    pub task_description: String,
    pub path: String,
    pub content: String,
    pub errors: Vec<String>,
    pub context: IndexMap<String, String>,
    pub model: Option<String>,
}

#[async_trait]
pub trait CodeOracle: Send + Sync {
    async fn generate_file(&self, request: GenerateRequest) -> Result<Generation, OracleError>;

    async fn fix_file(&self, request: FixRequest) -> Result<Generation, OracleError>;
}
