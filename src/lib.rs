//! buildloom - build orchestration engine for coding agents
//!
//! Turns a planned list of file edits into working code. A plan's files are
//! ordered by their import graph, generated one at a time by a code oracle,
//! checked incrementally in a sandbox and repaired in bounded loops, then
//! validated as a whole project.
//!
//! # Core Concepts
//!
//! - **Plan**: ordered file and command intents produced upstream ([`BuildPlan`])
//! - **Dependency graph**: which files must be finalized before others ([`DependencyGraph`])
//! - **Strategy**: sequential, scaffold-first or dependency-ordered builds ([`BuildStrategy`])
//! - **Pipeline**: init, scaffold, dependencies, implement, integrate, finalize
//!   ([`BuildOrchestrator`])
//! - **Collaborators**: [`Sandbox`], [`CodeOracle`], [`JobStore`] and
//!   [`ProgressHandler`], injected through [`BuildContext`]
//!
//! # Example Usage
//!
//! ```ignore
//! use buildloom::{BuildContext, BuildOrchestrator, BuildPlan, PlanStep};
//! use buildloom::{InMemoryJobStore, LocalSandbox, LlmOracle};
//! use std::sync::Arc;
//!
//! async fn run(oracle: LlmOracle) -> anyhow::Result<()> {
//!     let ctx = BuildContext::new(
//!         Arc::new(LocalSandbox::new("./workspace").with_validate_command("npx tsc --noEmit")),
//!         Arc::new(oracle),
//!         Arc::new(InMemoryJobStore::new()),
//!     );
//!     let orchestrator = BuildOrchestrator::new(ctx);
//!
//!     let plan = BuildPlan::new("Add a greeting module", vec![
//!         PlanStep::create("src/greet.ts").with_description("Export a greet(name) function"),
//!     ]);
//!     let result = orchestrator.build("task-42", plan).await?;
//!     println!("success: {}", result.success);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod context_window;
pub mod graph;
pub mod job;
pub mod llm;
pub mod oracle;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod sandbox;
pub mod strategy;
pub mod util;

pub use config::{BuildloomConfig, ConfigError};
pub use context_window::ContextWindow;
pub use graph::{build_dependency_graph, topological_sort, CycleError, DependencyGraph};
pub use job::{
    BuildResult, BuildStep, BuilderJob, InMemoryJobStore, JobStatus, JobStore, JsonFileJobStore,
};
pub use llm::{BackendError, GenAIClient, LLMClient, MockLLMClient};
pub use oracle::{CodeOracle, LlmOracle, MockOracle};
pub use pipeline::{BuildConfig, BuildContext, BuildError, BuildOrchestrator};
pub use plan::{BuildPlan, PlanStep, StepAction};
pub use progress::{LoggingHandler, ProgressEvent, ProgressHandler};
pub use sandbox::{LocalSandbox, MockSandbox, Sandbox};
pub use strategy::{select_strategy, BuildStrategy};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
