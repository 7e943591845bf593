use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::job::{BuildPhase, BuildStep, FileStatus, StepKind};
use crate::oracle::{FixRequest, GenerateRequest};
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::BuildError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::pipeline::state::JobState;
use crate::plan::{PlanStep, StepAction};
use crate::progress::ProgressStatus;
use crate::sandbox::IncrementalCheck;

/// Generates, writes and incrementally repairs every planned file
pub struct ImplementPhase;

/// What happened to one file, whatever the outcome
#[derive(Debug, Default)]
struct FileAttempt {
    /// Latest content, `None` when nothing was ever produced
    content: Option<String>,
    success: bool,
    errors: Vec<String>,
    fixes: u32,
    tokens: u64,
    cost: f64,
}

impl FileAttempt {
    fn fail(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.errors.push(error.into());
        self
    }
}

/// The last `n` entries of `errors`
fn most_recent(errors: &[String], n: usize) -> Vec<String> {
    errors[errors.len().saturating_sub(n)..].to_vec()
}

impl ImplementPhase {
    async fn check(ctx: &BuildContext, path: &str) -> IncrementalCheck {
        match ctx.sandbox.validate_incremental(path).await {
            Ok(check) => check,
            Err(e) => IncrementalCheck::failed(vec![e.to_string()]),
        }
    }

    /// Produces, writes and checks one file. Never fails; every error lands in the attempt.
    async fn attempt(
        ctx: &BuildContext,
        state: &JobState,
        step: &PlanStep,
        path: &str,
        context: &IndexMap<String, String>,
    ) -> FileAttempt {
        let mut attempt = FileAttempt::default();

        let mut content = match &step.content {
            Some(literal) => literal.clone(),
            None => {
                let existing_content = if step.action == StepAction::ModifyFile {
                    state.job.context_window.get(path).map(str::to_string)
                } else {
                    None
                };
                let request = GenerateRequest {
                    task_description: state.job.plan.description.clone(),
                    path: path.to_string(),
                    intent: step.description.clone(),
                    existing_content,
                    context: context.clone(),
                    known_files: state.build_order.clone(),
                    model: state.model(),
                };
                match ctx.oracle.generate_file(request).await {
                    Ok(generation) => {
                        attempt.tokens += generation.tokens_used;
                        attempt.cost += generation.cost_usd;
                        generation.content
                    }
                    Err(e) => return attempt.fail(e.to_string()),
                }
            }
        };

        attempt.content = Some(content.clone());
        if let Err(e) = ctx.sandbox.write_file(path, &content).await {
            return attempt.fail(e.to_string());
        }

        if !ctx.config.is_checked(path) {
            attempt.success = true;
            return attempt;
        }

        let mut check = Self::check(ctx, path).await;
        attempt.errors.extend(check.errors.iter().cloned());

        while !check.success && attempt.fixes < ctx.config.max_fix_attempts {
            attempt.fixes += 1;
            debug!(file = %path, attempt = attempt.fixes, "Repairing file");

            let request = FixRequest {
                task_description: state.job.plan.description.clone(),
                path: path.to_string(),
                content: content.clone(),
                errors: most_recent(&attempt.errors, ctx.config.max_fix_errors),
                context: context.clone(),
                model: state.model(),
            };
            match ctx.oracle.fix_file(request).await {
                Ok(generation) => {
                    attempt.tokens += generation.tokens_used;
                    attempt.cost += generation.cost_usd;
                    content = generation.content;
                }
                Err(e) => return attempt.fail(e.to_string()),
            }

            attempt.content = Some(content.clone());
            if let Err(e) = ctx.sandbox.write_file(path, &content).await {
                return attempt.fail(e.to_string());
            }

            check = Self::check(ctx, path).await;
            attempt.errors.extend(check.errors.iter().cloned());
        }

        attempt.success = check.success;
        attempt
    }

    async fn delete_files(ctx: &BuildContext, state: &mut JobState) -> Result<(), BuildError> {
        let deletes: Vec<String> = state
            .job
            .plan
            .steps
            .iter()
            .filter(|s| s.action == StepAction::DeleteFile)
            .filter_map(|s| s.file_path.clone())
            .collect();

        for path in deletes {
            let step = BuildStep::new(&state.job.id, BuildPhase::Implement, StepKind::DeleteFile)
                .with_file(&path);
            let step = match ctx.sandbox.delete_file(&path).await {
                Ok(()) => {
                    state.job.record_file(FileStatus::deleted(&path));
                    step
                }
                Err(e) => {
                    warn!(file = %path, "Delete failed: {}", e);
                    state
                        .job
                        .record_file(FileStatus::failed(&path, 1, vec![e.to_string()]));
                    step.with_error(e.to_string())
                }
            };
            ctx.record_step(step).await?;
            let next = state.job.current_step + 1;
            state.job.advance_to(next);
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowPhase for ImplementPhase {
    fn phase(&self) -> BuildPhase {
        BuildPhase::Implement
    }

    async fn execute(&self, ctx: &BuildContext, state: &mut JobState) -> Result<(), BuildError> {
        Self::delete_files(ctx, state).await?;

        let order = state.build_order.clone();
        info!(job_id = %state.job.id, files = order.len(), "Implementing files");

        for path in &order {
            // A path written more than once is built from its last step
            let Some(step) = state
                .job
                .plan
                .steps
                .iter()
                .rev()
                .find(|s| s.written_path() == Some(path.as_str()))
                .cloned()
            else {
                continue;
            };

            let already_built = state.job.file(path).is_some_and(FileStatus::is_success)
                && state.job.context_window.contains(path);
            if already_built {
                debug!(file = %path, "Already built, skipping");
                let next = state.job.current_step + 1;
                state.job.advance_to(next);
                continue;
            }

            let context = state
                .job
                .context_window
                .relevant_context(path, &state.job.dependency_graph);
            let attempt = Self::attempt(ctx, state, &step, path, &context).await;
            let attempts = attempt.fixes + 1;

            let mut audit = BuildStep::new(&state.job.id, BuildPhase::Implement, step.action.into())
                .with_file(path)
                .with_tokens(attempt.tokens)
                .with_fix_attempts(attempt.fixes);

            if attempt.success {
                debug!(file = %path, attempts, "File built");
                state.job.record_file(FileStatus::success(path, attempts));
                if let Some(content) = &attempt.content {
                    state.job.context_window.insert(path, content);
                }
            } else {
                warn!(file = %path, attempts, errors = attempt.errors.len(), "File failed");
                audit = audit.with_error(attempt.errors.join("\n"));
                state
                    .job
                    .record_file(FileStatus::failed(path, attempts, attempt.errors.clone()));
                if let Some(content) = &attempt.content {
                    state.job.context_window.insert_tainted(path, content);
                }
            }

            state.job.add_usage(attempt.tokens, attempt.cost);
            let next = state.job.current_step + 1;
            state.job.advance_to(next);

            ctx.record_step(audit).await?;
            ctx.persist(&mut state.job).await?;

            let (status, message) = if attempt.success {
                (ProgressStatus::Completed, format!("Built {}", path))
            } else {
                (ProgressStatus::Failed, format!("Failed to build {}", path))
            };
            ctx.publish(&state.event(BuildPhase::Implement, status, message).with_file(path));
        }

        let total = state.job.total_steps;
        state.job.advance_to(total);
        ctx.persist(&mut state.job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{FileState, JobStore, StepStatus};
    use crate::pipeline::phases::test_support::Harness;
    use crate::sandbox::MockSandbox;

    fn failing(errors: &[&str]) -> IncrementalCheck {
        IncrementalCheck::failed(errors.iter().map(|e| e.to_string()).collect())
    }

    #[test]
    fn test_most_recent_errors() {
        let errors: Vec<String> = (1..=7).map(|i| format!("e{}", i)).collect();
        assert_eq!(most_recent(&errors, 5), vec!["e3", "e4", "e5", "e6", "e7"]);
        assert_eq!(most_recent(&errors[..2], 5), vec!["e1", "e2"]);
    }

    #[tokio::test]
    async fn test_literal_content_written_verbatim() {
        let harness = Harness::new();
        let mut state = harness
            .state(vec![PlanStep::create("README.md").with_content("# Demo\n")])
            .await;
        state.build_order = vec!["README.md".to_string()];
        state.job.total_steps = 1;

        ImplementPhase.execute(&harness.ctx, &mut state).await.unwrap();

        assert!(harness.oracle.generate_calls().is_empty());
        assert_eq!(harness.sandbox.file("README.md").as_deref(), Some("# Demo\n"));
        assert!(harness.sandbox.check_calls().is_empty());
        assert_eq!(state.job.context_window.get("README.md"), Some("# Demo\n"));
        assert_eq!(state.job.current_step, 1);
    }

    #[tokio::test]
    async fn test_fix_loop_stops_on_success() {
        let harness = Harness::new();
        harness.sandbox.queue_check("a.ts", failing(&["a.ts(1,1): error TS2304"]));
        let mut state = harness.state(vec![PlanStep::create("a.ts")]).await;
        state.build_order = vec!["a.ts".to_string()];

        ImplementPhase.execute(&harness.ctx, &mut state).await.unwrap();

        assert_eq!(harness.oracle.fix_count("a.ts"), 1);
        assert_eq!(harness.sandbox.write_count("a.ts"), 2);
        let status = state.job.file("a.ts").unwrap();
        assert!(status.is_success());
        assert_eq!(status.attempts, 2);
        assert!(!state.job.context_window.is_tainted("a.ts"));
        assert_eq!(state.job.tokens_used, 200);
    }

    #[tokio::test]
    async fn test_fix_loop_is_bounded() {
        let harness = Harness::new();
        harness.sandbox.fail_checks("a.ts", vec!["error TS1005".to_string()]);
        let mut state = harness.state(vec![PlanStep::create("a.ts")]).await;
        state.build_order = vec!["a.ts".to_string()];

        ImplementPhase.execute(&harness.ctx, &mut state).await.unwrap();

        assert_eq!(harness.oracle.generate_calls().len(), 1);
        assert_eq!(harness.oracle.fix_count("a.ts"), 3);
        assert_eq!(harness.sandbox.check_calls().len(), 4);

        let status = state.job.file("a.ts").unwrap();
        assert_eq!(status.state, FileState::Failed);
        assert_eq!(status.attempts, 4);
        assert_eq!(status.errors.len(), 4);
        assert!(state.job.context_window.is_tainted("a.ts"));

        let fix_calls = harness.oracle.fix_calls();
        assert_eq!(fix_calls[2].errors.len(), 3);
    }

    #[tokio::test]
    async fn test_generation_error_does_not_stop_loop() {
        let harness = Harness::new();
        harness.oracle.fail_generate("a.ts", "model overloaded");
        let mut state = harness
            .state(vec![PlanStep::create("a.ts"), PlanStep::create("b.ts")])
            .await;
        state.build_order = vec!["a.ts".to_string(), "b.ts".to_string()];

        ImplementPhase.execute(&harness.ctx, &mut state).await.unwrap();

        let failed = state.job.file("a.ts").unwrap();
        assert_eq!(failed.state, FileState::Failed);
        assert!(failed.errors[0].contains("model overloaded"));
        assert!(!state.job.context_window.contains("a.ts"));
        assert!(state.job.file("b.ts").unwrap().is_success());

        let steps = harness.store.steps(&state.job.id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_modify_passes_existing_content_and_context() {
        let sandbox = MockSandbox::new();
        let harness = Harness::with_sandbox(sandbox);
        let mut state = harness
            .state(vec![
                PlanStep::create("types.ts").with_content("export type Id = string;"),
                PlanStep::modify("app.ts").with_description("Use the Id type"),
            ])
            .await;
        state.job.context_window.insert("app.ts", "console.log('old');");
        state.job.dependency_graph.add_edge("app.ts", "types.ts");
        state.build_order = vec!["types.ts".to_string(), "app.ts".to_string()];

        ImplementPhase.execute(&harness.ctx, &mut state).await.unwrap();

        let calls = harness.oracle.generate_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "app.ts");
        assert_eq!(calls[0].existing_content.as_deref(), Some("console.log('old');"));
        assert_eq!(calls[0].intent.as_deref(), Some("Use the Id type"));
        assert_eq!(
            calls[0].context.get("types.ts").map(String::as_str),
            Some("export type Id = string;")
        );
    }

    #[tokio::test]
    async fn test_deletes_run_first() {
        let harness = Harness::with_sandbox(MockSandbox::new().with_file("old.ts", "legacy"));
        let mut state = harness
            .state(vec![PlanStep::create("new.ts"), PlanStep::delete("old.ts")])
            .await;
        state.build_order = vec!["new.ts".to_string()];
        state.job.total_steps = 2;

        ImplementPhase.execute(&harness.ctx, &mut state).await.unwrap();

        assert_eq!(harness.sandbox.deletes(), vec!["old.ts"]);
        assert!(harness.sandbox.file("old.ts").is_none());
        assert_eq!(state.job.file("old.ts").unwrap().state, FileState::Deleted);
        assert_eq!(state.job.current_step, 2);

        let steps = harness.store.steps(&state.job.id).await.unwrap();
        assert_eq!(steps[0].action, StepKind::DeleteFile);
        assert_eq!(steps[1].action, StepKind::CreateFile);
    }

    #[tokio::test]
    async fn test_progress_persisted_per_file() {
        let harness = Harness::new();
        let mut state = harness
            .state(vec![PlanStep::create("a.ts"), PlanStep::create("b.ts")])
            .await;
        state.build_order = vec!["a.ts".to_string(), "b.ts".to_string()];

        ImplementPhase.execute(&harness.ctx, &mut state).await.unwrap();

        let stored = harness.store.get(&state.job.id).await.unwrap();
        assert_eq!(stored.files_written.len(), 2);
        assert_eq!(stored.tokens_used, 200);
        assert!((stored.cost_usd - 0.02).abs() < 1e-9);
    }
}
