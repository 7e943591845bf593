use crate::job::JobStatus;
use crate::llm::parse_provider;
use clap::{Parser, Subcommand, ValueEnum};
use genai::adapter::AdapterKind;
use std::path::PathBuf;

/// Build orchestration engine: turns planned file edits into validated code
#[derive(Parser, Debug)]
#[command(
    name = "buildloom",
    about = "Build orchestration engine that turns planned file edits into validated code",
    version,
    author,
    long_about = "buildloom reads a build plan, orders its files by their import graph, \
                  generates each file with an LLM and repairs it against incremental and \
                  whole-project validation. Jobs are persisted so they can be inspected \
                  and cancelled from another shell."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Show the dependency graph, build order and strategy of a plan",
        long_about = "Analyses a plan without generating anything.\n\n\
                      Examples:\n  \
                      buildloom graph plan.json\n  \
                      buildloom graph plan.json --format json"
    )]
    Graph(GraphArgs),

    #[command(
        about = "Run a plan through the full build pipeline",
        long_about = "Writes into a local directory, generating files with the configured \
                      LLM provider.\n\n\
                      Examples:\n  \
                      buildloom build plan.json --root ./workspace\n  \
                      buildloom build plan.json --validate-command 'npx tsc --noEmit'"
    )]
    Build(BuildArgs),

    #[command(about = "Show a stored job")]
    Status(StatusArgs),

    #[command(about = "List stored jobs")]
    List(ListArgs),

    #[command(about = "Cancel a job at its next phase boundary")]
    Cancel(CancelArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct GraphArgs {
    #[arg(value_name = "PLAN", help = "Path to the plan JSON file")]
    pub plan: PathBuf,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(value_name = "PLAN", help = "Path to the plan JSON file")]
    pub plan: PathBuf,

    #[arg(
        short = 'r',
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Directory the build writes into"
    )]
    pub root: PathBuf,

    #[arg(long, value_name = "ID", help = "Task id recorded on the job")]
    pub task: Option<String>,

    #[arg(
        short = 'b',
        long,
        value_parser = parse_adapter_kind,
        help = "LLM provider (overrides BUILDLOOM_PROVIDER)"
    )]
    pub backend: Option<AdapterKind>,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model name (overrides BUILDLOOM_MODEL)")]
    pub model: Option<String>,

    #[arg(long, value_name = "CMD", help = "Whole-project validation command")]
    pub validate_command: Option<String>,

    #[arg(long, value_name = "CMD", help = "Per-file check command, {file} is replaced by the path")]
    pub check_command: Option<String>,

    #[arg(long, value_name = "N", help = "Repair attempts per file")]
    pub max_fix_attempts: Option<u32>,

    #[arg(long, value_name = "N", help = "Whole-project validation passes")]
    pub max_iterations: Option<u32>,

    #[arg(long, value_name = "DIR", help = "Job store directory (overrides BUILDLOOM_JOBS_DIR)")]
    pub jobs_dir: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[arg(value_name = "JOB_ID")]
    pub job_id: String,

    #[arg(long, help = "Include the audit log")]
    pub steps: bool,

    #[arg(long, value_name = "DIR", help = "Job store directory (overrides BUILDLOOM_JOBS_DIR)")]
    pub jobs_dir: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    #[arg(short = 's', long, value_parser = parse_job_status, help = "Only jobs with this status")]
    pub status: Option<JobStatus>,

    #[arg(long, value_name = "ID", help = "Only jobs for this task")]
    pub task: Option<String>,

    #[arg(long, value_name = "OWNER/NAME", help = "Only jobs for this repository")]
    pub repo: Option<String>,

    #[arg(long, value_name = "DIR", help = "Job store directory (overrides BUILDLOOM_JOBS_DIR)")]
    pub jobs_dir: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct CancelArgs {
    #[arg(value_name = "JOB_ID")]
    pub job_id: String,

    #[arg(long, value_name = "DIR", help = "Job store directory (overrides BUILDLOOM_JOBS_DIR)")]
    pub jobs_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_adapter_kind(s: &str) -> Result<AdapterKind, String> {
    parse_provider(s).ok_or_else(|| {
        format!(
            "Invalid provider: {}. Valid options: ollama, openai, anthropic, gemini, xai, groq",
            s
        )
    })
}

fn parse_job_status(s: &str) -> Result<JobStatus, String> {
    s.parse()
}
