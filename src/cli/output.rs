//! Output formatting for CLI results
//!
//! Every formatter renders either pretty JSON or human-readable text.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::graph::{build_dependency_graph, resolve_build_order, topo::plan_order, DependencyGraph};
use crate::job::{BuildResult, BuildStep, BuilderJob, StepStatus};
use crate::plan::BuildPlan;
use crate::strategy::{select_strategy, BuildStrategy};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Human,
}

/// Static analysis of a plan, as the init phase would compute it
#[derive(Debug, Clone, Serialize)]
pub struct GraphReport {
    pub strategy: BuildStrategy,
    pub graph: DependencyGraph,
    pub order: Vec<String>,
    /// Nodes of the detected cycle when `order` fell back to plan order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<String>>,
}

impl GraphReport {
    pub fn from_plan(plan: &BuildPlan) -> Self {
        let graph = build_dependency_graph(&plan.steps);
        let strategy = select_strategy(&plan.steps, &graph);
        let (order, cycle) = if strategy.uses_graph_order() {
            let resolved = resolve_build_order(&graph, &plan.steps);
            (resolved.order, resolved.cycle.map(|c| c.nodes))
        } else {
            (plan_order(&plan.steps), None)
        };
        Self {
            strategy,
            graph,
            order,
            cycle,
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_graph(&self, report: &GraphReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize graph to JSON")
            }
            OutputFormat::Human => Ok(self.graph_human(report)),
        }
    }

    pub fn format_result(&self, result: &BuildResult) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result)
                .context("Failed to serialize build result to JSON"),
            OutputFormat::Human => Ok(self.result_human(result)),
        }
    }

    pub fn format_job(&self, job: &BuilderJob, steps: Option<&[BuildStep]>) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "job": job,
                    "steps": steps,
                });
                serde_json::to_string_pretty(&output).context("Failed to serialize job to JSON")
            }
            OutputFormat::Human => Ok(self.job_human(job, steps)),
        }
    }

    pub fn format_jobs(&self, jobs: &[BuilderJob]) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(jobs).context("Failed to serialize jobs to JSON")
            }
            OutputFormat::Human => Ok(self.jobs_human(jobs)),
        }
    }

    fn graph_human(&self, report: &GraphReport) -> String {
        let mut output = String::new();
        output.push_str("Build Plan Analysis\n");
        output.push_str(RULE);
        output.push_str("\n\n");
        output.push_str(&format!("Strategy: {}\n\n", report.strategy));

        output.push_str("Dependencies:\n");
        for (path, deps) in report.graph.iter() {
            if deps.is_empty() {
                output.push_str(&format!("\u{251C}\u{2500} {}\n", path));
            } else {
                output.push_str(&format!("\u{251C}\u{2500} {} \u{2192} {}\n", path, deps.join(", ")));
            }
        }
        output.push('\n');

        match &report.cycle {
            Some(nodes) => output.push_str(&format!(
                "\u{26A0} Cycle among {}; using plan order\n",
                nodes.join(", ")
            )),
            None => output.push_str("Build order:\n"),
        }
        for (i, path) in report.order.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, path));
        }
        output
    }

    fn result_human(&self, result: &BuildResult) -> String {
        let mut output = String::new();
        if result.success {
            output.push_str("\u{2713} Build succeeded\n");
        } else {
            output.push_str("\u{2717} Build failed\n");
        }
        output.push_str(RULE);
        output.push_str("\n\n");
        output.push_str(&format!("Job:     {}\n", result.job_id));
        output.push_str(&format!("Tokens:  {}\n", result.tokens_used));
        output.push_str(&format!("Cost:    ${:.4}\n\n", result.cost_usd));

        if !result.files.is_empty() {
            output.push_str("Files:\n");
            for file in &result.files {
                output.push_str(&format!("\u{251C}\u{2500} {:<12} {}\n", file.action.as_str(), file.path));
            }
            output.push('\n');
        }

        if !result.errors.is_empty() {
            output.push_str("\u{26A0} Errors:\n");
            for error in &result.errors {
                output.push_str(&format!("  - {}\n", error));
            }
        }
        output
    }

    fn job_human(&self, job: &BuilderJob, steps: Option<&[BuildStep]>) -> String {
        let mut output = String::new();
        output.push_str(&format!("Job {}\n", job.id));
        output.push_str(RULE);
        output.push_str("\n\n");
        output.push_str(&format!("Task:      {}\n", job.task_id));
        output.push_str(&format!("Status:    {}\n", job.status));
        if let Some(phase) = job.current_phase {
            output.push_str(&format!("Phase:     {}\n", phase));
        }
        output.push_str(&format!("Strategy:  {}\n", job.strategy));
        output.push_str(&format!("Progress:  {}/{}\n", job.current_step, job.total_steps));
        output.push_str(&format!("Passes:    {}\n", job.build_iterations));
        output.push_str(&format!(
            "Usage:     {} tokens, ${:.4}\n",
            job.tokens_used, job.cost_usd
        ));
        if let Some(ref error) = job.error {
            output.push_str(&format!("Error:     {}\n", error));
        }

        if !job.files_written.is_empty() {
            output.push_str("\nFiles:\n");
            for file in &job.files_written {
                let marker = if file.is_success() { "\u{2713}" } else { "\u{2717}" };
                output.push_str(&format!(
                    "{} {} ({} attempt(s))\n",
                    marker, file.path, file.attempts
                ));
            }
        }

        if let Some(steps) = steps {
            output.push_str("\nSteps:\n");
            for step in steps {
                let status = match step.status {
                    StepStatus::Success => "ok",
                    StepStatus::Failed => "failed",
                    StepStatus::Skipped => "skipped",
                };
                output.push_str(&format!(
                    "  [{}] {:?} {} {}\n",
                    step.phase,
                    step.action,
                    step.file_path.as_deref().unwrap_or("-"),
                    status
                ));
            }
        }
        output
    }

    fn jobs_human(&self, jobs: &[BuilderJob]) -> String {
        if jobs.is_empty() {
            return "No jobs found\n".to_string();
        }
        let mut output = String::new();
        for job in jobs {
            output.push_str(&format!(
                "{}  {:<10}  {}  {}\n",
                job.id,
                job.status.as_str(),
                job.created_at.format("%Y-%m-%d %H:%M:%S"),
                job.plan.description
            ));
        }
        output
    }
}
