use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::info;

use crate::job::{BuildPhase, OutputFile};
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::BuildError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::pipeline::state::JobState;
use crate::plan::StepAction;

/// Collects the final content of every file the plan touched
pub struct FinalizePhase;

#[async_trait]
impl WorkflowPhase for FinalizePhase {
    fn phase(&self) -> BuildPhase {
        BuildPhase::Finalize
    }

    async fn execute(&self, ctx: &BuildContext, state: &mut JobState) -> Result<(), BuildError> {
        let window = &state.job.context_window;
        let mut files: IndexMap<String, OutputFile> = IndexMap::new();

        for step in &state.job.plan.steps {
            let Some(path) = step.file_path.as_deref() else {
                continue;
            };
            if !step.action.is_file_action() {
                continue;
            }

            let content = match step.action {
                StepAction::DeleteFile => step.content.clone(),
                _ => window
                    .get(path)
                    .map(str::to_string)
                    .or_else(|| step.content.clone()),
            }
            .unwrap_or_default();

            // Later steps for the same path win but keep its first position
            files.insert(
                path.to_string(),
                OutputFile {
                    path: path.to_string(),
                    content,
                    action: step.action,
                },
            );
        }

        state.output_files = files.into_values().collect();
        info!(job_id = %state.job.id, files = state.output_files.len(), "Build output assembled");

        ctx.persist(&mut state.job).await
    }
}
