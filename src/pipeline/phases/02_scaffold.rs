use async_trait::async_trait;
use tracing::{info, warn};

use crate::job::{BuildPhase, BuildStep, StepKind};
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::BuildError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::pipeline::state::JobState;
use crate::plan::StepAction;
use crate::strategy::BuildStrategy;

/// Runs the plan's commands up front when the project is being scaffolded
pub struct ScaffoldPhase;

#[async_trait]
impl WorkflowPhase for ScaffoldPhase {
    fn phase(&self) -> BuildPhase {
        BuildPhase::Scaffold
    }

    async fn execute(&self, ctx: &BuildContext, state: &mut JobState) -> Result<(), BuildError> {
        if state.job.strategy != BuildStrategy::ScaffoldFirst {
            return Ok(());
        }

        let commands: Vec<(usize, String)> = state
            .job
            .plan
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.action == StepAction::RunCommand)
            .filter_map(|(i, s)| s.command.clone().map(|c| (i, c)))
            .collect();

        info!(job_id = %state.job.id, commands = commands.len(), "Running scaffold commands");

        for (index, command) in commands {
            let step = BuildStep::new(&state.job.id, BuildPhase::Scaffold, StepKind::RunCommand);
            let step = match ctx
                .sandbox
                .run_command(&command, ctx.config.command_timeout_secs)
                .await
            {
                Ok(output) if output.success() => step.with_validation(output.combined()),
                Ok(output) => {
                    warn!(command = %command, exit_code = output.exit_code, "Scaffold command failed");
                    step.with_validation(output.combined())
                        .with_error(format!("`{}` exited with code {}", command, output.exit_code))
                }
                Err(e) => {
                    warn!(command = %command, "Scaffold command failed: {}", e);
                    step.with_error(e.to_string())
                }
            };
            state.executed_commands.insert(index);
            ctx.record_step(step).await?;
        }

        Ok(())
    }
}
