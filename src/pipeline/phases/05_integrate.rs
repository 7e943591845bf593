use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::job::{BuildPhase, BuildStep, StepKind};
use crate::oracle::FixRequest;
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::BuildError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::pipeline::state::{IntegrationOutcome, JobState};
use crate::progress::ProgressStatus;

/// Validates the whole project and repairs the files its errors point at
pub struct IntegratePhase;

/// Errors grouped by the built file whose path they mention, in build order
fn attribute_errors(errors: &[String], paths: &[String]) -> IndexMap<String, Vec<String>> {
    let mut attributed: IndexMap<String, Vec<String>> = IndexMap::new();
    for path in paths {
        let matching: Vec<String> = errors
            .iter()
            .filter(|e| e.contains(path.as_str()))
            .cloned()
            .collect();
        if !matching.is_empty() {
            attributed.insert(path.clone(), matching);
        }
    }
    attributed
}

impl IntegratePhase {
    async fn fix_file(
        ctx: &BuildContext,
        state: &mut JobState,
        path: &str,
        errors: Vec<String>,
    ) -> Result<(), BuildError> {
        let Some(content) = state.job.context_window.get(path).map(str::to_string) else {
            debug!(file = %path, "Not in context window, skipping repair");
            return Ok(());
        };

        let audit = BuildStep::new(&state.job.id, BuildPhase::Integrate, StepKind::FixFile)
            .with_file(path)
            .with_fix_attempts(1);

        let request = FixRequest {
            task_description: state.job.plan.description.clone(),
            path: path.to_string(),
            content,
            errors: errors.into_iter().take(ctx.config.max_fix_errors).collect(),
            context: state
                .job
                .context_window
                .relevant_context(path, &state.job.dependency_graph),
            model: state.model(),
        };

        let generation = match ctx.oracle.fix_file(request).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!(file = %path, "Integration repair failed: {}", e);
                return ctx.record_step(audit.with_error(e.to_string())).await;
            }
        };
        state
            .job
            .add_usage(generation.tokens_used, generation.cost_usd);
        let audit = audit.with_tokens(generation.tokens_used);

        if let Err(e) = ctx.sandbox.write_file(path, &generation.content).await {
            warn!(file = %path, "Writing repaired file failed: {}", e);
            return ctx.record_step(audit.with_error(e.to_string())).await;
        }

        if state.job.context_window.is_tainted(path) {
            state
                .job
                .context_window
                .insert_tainted(path, generation.content);
        } else {
            state.job.context_window.insert(path, generation.content);
        }
        ctx.record_step(audit).await
    }
}

#[async_trait]
impl WorkflowPhase for IntegratePhase {
    fn phase(&self) -> BuildPhase {
        BuildPhase::Integrate
    }

    async fn execute(&self, ctx: &BuildContext, state: &mut JobState) -> Result<(), BuildError> {
        let max_iterations = ctx.config.max_integration_iterations.max(1);
        let mut outcome = IntegrationOutcome::default();

        for iteration in 1..=max_iterations {
            state.job.build_iterations = iteration;
            let report = ctx.sandbox.validate().await?;

            let mut audit = BuildStep::new(&state.job.id, BuildPhase::Integrate, StepKind::Validate)
                .with_validation(report.output.clone());
            if !report.success {
                audit = audit.with_error(report.errors.join("\n"));
            }
            ctx.record_step(audit).await?;

            outcome = IntegrationOutcome {
                success: report.success,
                output: report.output,
                errors: report.errors,
            };

            let (status, message) = if outcome.success {
                (ProgressStatus::Completed, format!("Validation pass {} succeeded", iteration))
            } else {
                (
                    ProgressStatus::Failed,
                    format!("Validation pass {} found {} errors", iteration, outcome.errors.len()),
                )
            };
            ctx.publish(&state.event(BuildPhase::Integrate, status, message));

            if outcome.success {
                info!(job_id = %state.job.id, iteration, "Project validated");
                break;
            }
            if iteration == max_iterations {
                warn!(job_id = %state.job.id, iteration, "Integration iterations exhausted");
                break;
            }

            let attributed = attribute_errors(&outcome.errors, &state.build_order);
            if attributed.is_empty() {
                info!(job_id = %state.job.id, "No errors attributable to built files");
                break;
            }

            debug!(files = ?attributed.keys().collect::<Vec<_>>(), "Repairing attributed files");
            for (path, errors) in attributed {
                Self::fix_file(ctx, state, &path, errors).await?;
            }
            ctx.persist(&mut state.job).await?;
        }

        state.integration = Some(outcome);
        ctx.persist(&mut state.job).await
    }
}
