//! Command handlers. Each returns the process exit code.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::commands::{BuildArgs, CancelArgs, GraphArgs, ListArgs, StatusArgs};
use super::output::{GraphReport, OutputFormatter};
use crate::config::BuildloomConfig;
use crate::job::{BuilderJob, JobFilter, JobStore, JsonFileJobStore};
use crate::oracle::LlmOracle;
use crate::pipeline::{BuildContext, BuildOrchestrator};
use crate::plan::BuildPlan;
use crate::progress::LoggingHandler;
use crate::sandbox::LocalSandbox;

const EXIT_SUCCESS: i32 = 0;
const EXIT_BUILD_FAILED: i32 = 1;
const EXIT_ERROR: i32 = 2;

fn exit_code(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    }
}

async fn load_plan(path: &Path) -> Result<BuildPlan> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan {}", path.display()))?;
    BuildPlan::from_json(&raw).with_context(|| format!("Invalid plan {}", path.display()))
}

fn resolve_jobs_dir(arg: Option<&PathBuf>) -> PathBuf {
    arg.cloned()
        .or_else(|| env::var_os("BUILDLOOM_JOBS_DIR").map(PathBuf::from))
        .unwrap_or_else(|| BuildloomConfig::default().jobs_dir)
}

async fn open_store(arg: Option<&PathBuf>) -> Result<JsonFileJobStore> {
    let dir = resolve_jobs_dir(arg);
    debug!("Using job store at {}", dir.display());
    JsonFileJobStore::open(&dir)
        .await
        .with_context(|| format!("Failed to open job store {}", dir.display()))
}

fn print(output: String) {
    print!("{}", output);
    if !output.ends_with('\n') {
        println!();
    }
}

pub async fn handle_graph(args: &GraphArgs) -> i32 {
    exit_code(graph(args).await)
}

async fn graph(args: &GraphArgs) -> Result<i32> {
    let plan = load_plan(&args.plan).await?;
    let report = GraphReport::from_plan(&plan);
    print(OutputFormatter::new(args.format.into()).format_graph(&report)?);
    Ok(EXIT_SUCCESS)
}

pub async fn handle_build(args: &BuildArgs) -> i32 {
    exit_code(build(args).await)
}

fn build_config(args: &BuildArgs) -> Result<BuildloomConfig> {
    let mut config = BuildloomConfig::from_env().context("Invalid configuration")?;
    if let Some(provider) = args.backend {
        config.provider = provider;
    }
    if let Some(ref model) = args.model {
        config.model = model.clone();
    }
    if let Some(ref command) = args.validate_command {
        config.validate_command = Some(command.clone());
    }
    if let Some(ref command) = args.check_command {
        config.check_command = Some(command.clone());
    }
    if let Some(attempts) = args.max_fix_attempts {
        config.max_fix_attempts = attempts;
    }
    if let Some(iterations) = args.max_iterations {
        config.max_integration_iterations = iterations;
    }
    if let Some(ref dir) = args.jobs_dir {
        config.jobs_dir = dir.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn build(args: &BuildArgs) -> Result<i32> {
    let config = build_config(args)?;
    debug!("{}", config);

    let plan = load_plan(&args.plan).await?;
    tokio::fs::create_dir_all(&args.root)
        .await
        .with_context(|| format!("Failed to create {}", args.root.display()))?;

    let pipeline_config = config.build_config();
    let mut sandbox =
        LocalSandbox::new(&args.root).with_command_timeout(pipeline_config.command_timeout_secs);
    if let Some(ref command) = config.check_command {
        sandbox = sandbox.with_check_command(command);
    }
    if let Some(ref command) = config.validate_command {
        sandbox = sandbox.with_validate_command(command);
    }

    let existing = sandbox
        .existing_files(&plan)
        .await
        .with_context(|| format!("Failed to read existing files under {}", args.root.display()))?;

    let client = config.create_client().await?;
    let store = open_store(Some(&config.jobs_dir)).await?;

    let ctx = BuildContext::new(
        Arc::new(sandbox),
        Arc::new(LlmOracle::new(client)),
        Arc::new(store),
    )
    .with_progress(Arc::new(LoggingHandler))
    .with_config(pipeline_config);
    let orchestrator = BuildOrchestrator::new(ctx);

    let task_id = args
        .task
        .clone()
        .unwrap_or_else(|| format!("cli-{}", Uuid::new_v4()));
    let job = orchestrator
        .submit_job(BuilderJob::new(task_id, plan).with_existing_files(existing))
        .await?;
    info!(job_id = %job.id, "Submitted job, Ctrl-C cancels at the next phase");

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    let result = orchestrator.run_with_token(&job.id, &token).await?;
    print(OutputFormatter::new(args.format.into()).format_result(&result)?);

    Ok(if result.success {
        EXIT_SUCCESS
    } else {
        EXIT_BUILD_FAILED
    })
}

pub async fn handle_status(args: &StatusArgs) -> i32 {
    exit_code(status(args).await)
}

async fn status(args: &StatusArgs) -> Result<i32> {
    let store = open_store(args.jobs_dir.as_ref()).await?;
    let job = store.get(&args.job_id).await?;
    let steps = if args.steps {
        Some(store.steps(&args.job_id).await?)
    } else {
        None
    };
    print(OutputFormatter::new(args.format.into()).format_job(&job, steps.as_deref())?);
    Ok(EXIT_SUCCESS)
}

pub async fn handle_list(args: &ListArgs) -> i32 {
    exit_code(list(args).await)
}

async fn list(args: &ListArgs) -> Result<i32> {
    let store = open_store(args.jobs_dir.as_ref()).await?;
    let mut filter = JobFilter::default();
    if let Some(status) = args.status {
        filter = filter.with_status(status);
    }
    if let Some(ref task) = args.task {
        filter = filter.with_task(task);
    }
    if let Some(ref repo) = args.repo {
        filter = filter.with_repo(repo);
    }
    let jobs = store.list(&filter).await?;
    print(OutputFormatter::new(args.format.into()).format_jobs(&jobs)?);
    Ok(EXIT_SUCCESS)
}

pub async fn handle_cancel(args: &CancelArgs) -> i32 {
    exit_code(cancel(args).await)
}

async fn cancel(args: &CancelArgs) -> Result<i32> {
    let store = open_store(args.jobs_dir.as_ref()).await?;
    if store.cancel(&args.job_id).await? {
        println!("Cancellation requested for {}", args.job_id);
        Ok(EXIT_SUCCESS)
    } else {
        let job = store.get(&args.job_id).await?;
        println!("Job {} already finished ({})", args.job_id, job.status);
        Ok(EXIT_BUILD_FAILED)
    }
}
