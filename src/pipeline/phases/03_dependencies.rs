use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::graph::{detect_external_packages, is_install_command};
use crate::job::{BuildPhase, BuildStep, StepKind};
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::BuildError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::pipeline::state::JobState;
use crate::plan::StepAction;

/// Installs third-party packages, either as the plan says or as its imports imply
pub struct DependenciesPhase;

impl DependenciesPhase {
    /// Explicit install commands in plan order, with their step index
    fn install_commands(state: &JobState) -> Vec<(usize, String)> {
        state
            .job
            .plan
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.action == StepAction::RunCommand)
            .filter_map(|(i, s)| s.command.as_deref().map(|c| (i, c)))
            .filter(|(_, c)| is_install_command(c))
            .map(|(i, c)| (i, c.to_string()))
            .collect()
    }

    async fn run(
        ctx: &BuildContext,
        state: &JobState,
        command: &str,
        kind: StepKind,
    ) -> Result<(), BuildError> {
        let step = BuildStep::new(&state.job.id, BuildPhase::Dependencies, kind);
        let step = match ctx
            .sandbox
            .run_command(command, ctx.config.command_timeout_secs)
            .await
        {
            Ok(output) if output.success() => {
                debug!(command = %command, "Install succeeded");
                step.with_validation(output.combined())
            }
            Ok(output) => {
                warn!(command = %command, exit_code = output.exit_code, "Install failed");
                step.with_validation(output.combined())
                    .with_error(format!("`{}` exited with code {}", command, output.exit_code))
            }
            Err(e) => {
                warn!(command = %command, "Install failed: {}", e);
                step.with_error(e.to_string())
            }
        };
        ctx.record_step(step).await
    }
}

#[async_trait]
impl WorkflowPhase for DependenciesPhase {
    fn phase(&self) -> BuildPhase {
        BuildPhase::Dependencies
    }

    async fn execute(&self, ctx: &BuildContext, state: &mut JobState) -> Result<(), BuildError> {
        let explicit = Self::install_commands(state);

        if !explicit.is_empty() {
            for (index, command) in explicit {
                if !state.executed_commands.insert(index) {
                    continue;
                }
                Self::run(ctx, state, &command, StepKind::RunCommand).await?;
            }
            return Ok(());
        }

        let packages = detect_external_packages(
            state
                .job
                .plan
                .write_steps()
                .filter_map(|s| s.content.as_deref()),
        );
        if packages.is_empty() {
            debug!(job_id = %state.job.id, "No external packages detected");
            return Ok(());
        }

        info!(job_id = %state.job.id, packages = ?packages, "Installing detected packages");
        let command = format!("{} {}", ctx.config.install_command, packages.join(" "));
        Self::run(ctx, state, &command, StepKind::Install).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStore, StepStatus};
    use crate::pipeline::phases::test_support::Harness;
    use crate::plan::PlanStep;

    #[tokio::test]
    async fn test_explicit_installs_run_once() {
        let harness = Harness::new();
        let mut state = harness
            .state(vec![
                PlanStep::command("npm init -y"),
                PlanStep::command("npm install express"),
                PlanStep::command("pnpm add zod"),
                PlanStep::create("a.ts").with_content("import axios from 'axios';"),
            ])
            .await;
        state.executed_commands.insert(1);

        DependenciesPhase.execute(&harness.ctx, &mut state).await.unwrap();

        assert_eq!(harness.sandbox.commands(), vec!["pnpm add zod"]);
    }

    #[tokio::test]
    async fn test_detected_packages_batched() {
        let harness = Harness::new();
        let mut state = harness
            .state(vec![
                PlanStep::create("src/a.ts")
                    .with_content("import express from 'express';\nimport fs from 'fs';"),
                PlanStep::create("src/b.ts").with_content(
                    "import { z } from 'zod';\nimport { x } from '@scope/pkg/deep';\nimport './a';",
                ),
                PlanStep::create("src/c.ts").with_content("import e from 'express';"),
            ])
            .await;

        DependenciesPhase.execute(&harness.ctx, &mut state).await.unwrap();

        assert_eq!(
            harness.sandbox.commands(),
            vec!["npm install express zod @scope/pkg"]
        );
        let steps = harness.store.steps(&state.job.id).await.unwrap();
        assert_eq!(steps[0].action, StepKind::Install);
    }

    #[tokio::test]
    async fn test_install_failure_is_not_fatal() {
        let harness = Harness::new();
        harness.sandbox.fail_command("npm install");
        let mut state = harness
            .state(vec![PlanStep::create("a.ts").with_content("import React from 'react';")])
            .await;

        DependenciesPhase.execute(&harness.ctx, &mut state).await.unwrap();

        let steps = harness.store.steps(&state.job.id).await.unwrap();
        assert_eq!(steps[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_nothing_to_install() {
        let harness = Harness::new();
        let mut state = harness
            .state(vec![PlanStep::create("a.ts").with_content("import './b';")])
            .await;

        DependenciesPhase.execute(&harness.ctx, &mut state).await.unwrap();

        assert!(harness.sandbox.commands().is_empty());
    }
}
