//! Configuration management for buildloom
//!
//! Settings are loaded from environment variables with sensible defaults and
//! checked with [`BuildloomConfig::validate`] before use.
//!
//! # Environment Variables
//!
//! - `BUILDLOOM_PROVIDER`: ollama|openai|anthropic|gemini|groq|xai - default: "ollama"
//! - `BUILDLOOM_MODEL`: model name - default: "qwen2.5-coder:7b" for Ollama, required otherwise
//! - `BUILDLOOM_REQUEST_TIMEOUT`: LLM request timeout in seconds - default: "120"
//! - `BUILDLOOM_LOG_LEVEL`: trace|debug|info|warn|error - default: "info"
//! - `BUILDLOOM_JOBS_DIR`: job store directory - default: `<data dir>/buildloom/jobs`
//! - `BUILDLOOM_VALIDATE_COMMAND`: whole-project validation command - default: none
//! - `BUILDLOOM_CHECK_COMMAND`: per-file check command, `{file}` is substituted - default: none
//! - `BUILDLOOM_MAX_FIX_ATTEMPTS`: repairs per file - default: "3"
//! - `BUILDLOOM_MAX_ITERATIONS`: whole-project validation passes - default: "3"
//!
//! Provider credentials are read by genai itself (`OPENAI_API_KEY`,
//! `ANTHROPIC_API_KEY`, `OLLAMA_HOST`, ...).

use crate::llm::{parse_provider, BackendError, GenAIClient};
use crate::pipeline::BuildConfig;
use genai::adapter::AdapterKind;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder:7b";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_FIX_ATTEMPTS: u32 = 3;
const DEFAULT_MAX_ITERATIONS: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: ollama, openai, anthropic, gemini, groq, xai")]
    InvalidProvider(String),

    #[error("No model configured for provider {0}. Set BUILDLOOM_MODEL")]
    MissingModel(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    #[error("Client initialization failed: {0}")]
    ClientInitError(#[from] BackendError),
}

#[derive(Debug, Clone)]
pub struct BuildloomConfig {
    pub provider: AdapterKind,
    pub model: String,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub jobs_dir: PathBuf,
    pub validate_command: Option<String>,
    pub check_command: Option<String>,
    pub max_fix_attempts: u32,
    pub max_integration_iterations: u32,
}

impl Default for BuildloomConfig {
    fn default() -> Self {
        Self {
            provider: AdapterKind::Ollama,
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            jobs_dir: default_jobs_dir(),
            validate_command: None,
            check_command: None,
            max_fix_attempts: DEFAULT_MAX_FIX_ATTEMPTS,
            max_integration_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

fn default_jobs_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("buildloom")
        .join("jobs")
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty_var(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::ParseError {
            field: key.to_string(),
            error: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl BuildloomConfig {
    /// Loads `BUILDLOOM_*` variables, falling back to defaults for unset ones
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let provider = match non_empty_var("BUILDLOOM_PROVIDER") {
            Some(name) => parse_provider(&name).ok_or(ConfigError::InvalidProvider(name))?,
            None => defaults.provider,
        };

        let model = match non_empty_var("BUILDLOOM_MODEL") {
            Some(model) => model,
            None if provider == AdapterKind::Ollama => DEFAULT_OLLAMA_MODEL.to_string(),
            None => return Err(ConfigError::MissingModel(provider.as_str().to_string())),
        };

        Ok(Self {
            provider,
            model,
            request_timeout_secs: parse_var(
                "BUILDLOOM_REQUEST_TIMEOUT",
                defaults.request_timeout_secs,
            )?,
            log_level: non_empty_var("BUILDLOOM_LOG_LEVEL")
                .unwrap_or(defaults.log_level)
                .to_lowercase(),
            jobs_dir: non_empty_var("BUILDLOOM_JOBS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.jobs_dir),
            validate_command: non_empty_var("BUILDLOOM_VALIDATE_COMMAND"),
            check_command: non_empty_var("BUILDLOOM_CHECK_COMMAND"),
            max_fix_attempts: parse_var("BUILDLOOM_MAX_FIX_ATTEMPTS", defaults.max_fix_attempts)?,
            max_integration_iterations: parse_var(
                "BUILDLOOM_MAX_ITERATIONS",
                defaults.max_integration_iterations,
            )?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 1 hour".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Model name cannot be empty".to_string(),
            ));
        }
        if self.max_integration_iterations == 0 {
            return Err(ConfigError::ValidationFailed(
                "At least one integration iteration is required".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// Pipeline knobs derived from this configuration
    pub fn build_config(&self) -> BuildConfig {
        BuildConfig::default()
            .with_max_fix_attempts(self.max_fix_attempts)
            .with_max_integration_iterations(self.max_integration_iterations)
    }

    /// Creates a genai-backed client for the configured provider and model
    pub async fn create_client(&self) -> Result<Arc<GenAIClient>, ConfigError> {
        let timeout = Duration::from_secs(self.request_timeout_secs);
        let client = GenAIClient::new(self.provider, self.model.clone(), timeout).await?;
        Ok(Arc::new(client))
    }
}

impl fmt::Display for BuildloomConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Buildloom Configuration:")?;
        writeln!(f, "  Provider: {}", self.provider.as_str())?;
        writeln!(f, "  Model: {}", self.model)?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Jobs Dir: {}", self.jobs_dir.display())?;
        if let Some(ref command) = self.validate_command {
            writeln!(f, "  Validate Command: {}", command)?;
        }
        if let Some(ref command) = self.check_command {
            writeln!(f, "  Check Command: {}", command)?;
        }
        writeln!(f, "  Max Fix Attempts: {}", self.max_fix_attempts)?;
        writeln!(f, "  Max Iterations: {}", self.max_integration_iterations)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
