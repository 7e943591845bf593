//! End-to-end runs of the build pipeline against scripted collaborators
//!
//! Covers:
//! - Dependency-ordered builds with transitive context
//! - Bounded incremental and integration repair loops
//! - Cancellation, fatal store errors and failing phases
//! - Scaffold and dependency install commands

mod support;

use async_trait::async_trait;
use buildloom::job::{BuildPhase, BuilderJob, FileState, JobStatus, StepKind, StepStatus};
use buildloom::pipeline::phases::{FinalizePhase, InitPhase};
use buildloom::pipeline::{JobState, WorkflowPhase};
use buildloom::progress::ProgressStatus;
use buildloom::sandbox::{IncrementalCheck, ValidationReport};
use buildloom::{
    BuildConfig, BuildContext, BuildError, BuildPlan, BuildStrategy, ContextWindow, MockSandbox,
    PlanStep, StepAction,
};
use std::sync::Arc;
use support::{CancelOnPhase, FailingStore, TestPipeline};
use tokio_util::sync::CancellationToken;

fn layered_plan() -> BuildPlan {
    BuildPlan::new(
        "Build a user service",
        vec![
            PlanStep::create("app.ts").with_content(
                "import { helper } from './utils';\nimport type { User } from './types';\nexport const app = helper();\n",
            ),
            PlanStep::create("utils.ts").with_content(
                "import type { User } from './types';\nexport const helper = (): User => ({ id: '1' });\n",
            ),
            PlanStep::create("types.ts").with_content("export interface User { id: string }\n"),
            PlanStep::create("index.ts").with_description("Boots the app"),
        ],
    )
}

fn failed_report(errors: &[&str]) -> ValidationReport {
    ValidationReport::failed(
        errors.join("\n"),
        errors.iter().map(|e| e.to_string()).collect(),
    )
}

#[tokio::test]
async fn test_dependency_ordered_build() {
    let pipeline = TestPipeline::new();

    let result = pipeline
        .orchestrator
        .build("task-1", layered_plan())
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(
        pipeline.sandbox.written_paths(),
        vec!["types.ts", "utils.ts", "app.ts", "index.ts"]
    );
    assert_eq!(pipeline.oracle.generated_paths(), vec!["index.ts"]);

    let request = &pipeline.oracle.generate_calls()[0];
    assert_eq!(request.intent.as_deref(), Some("Boots the app"));
    assert_eq!(request.context.len(), 3);
    for dep in ["app.ts", "utils.ts", "types.ts"] {
        assert!(request.context.contains_key(dep), "missing {}", dep);
    }

    let files: Vec<&str> = result.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(files, vec!["app.ts", "utils.ts", "types.ts", "index.ts"]);
    assert!(result
        .files
        .iter()
        .all(|f| f.action == StepAction::CreateFile));
    assert_eq!(result.files[3].content, "// generated index.ts\n");
    assert_eq!(result.tokens_used, 100);
    assert!(pipeline.sandbox.commands().is_empty());

    let job = pipeline.orchestrator.status(&result.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.strategy, BuildStrategy::DependencyOrder);
    assert_eq!(job.total_steps, 4);
    assert_eq!(job.current_step, job.total_steps);
    assert_eq!(job.build_iterations, 1);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.files_written.iter().all(|f| f.state == FileState::Success));
}

#[tokio::test]
async fn test_audit_log_records_each_action() {
    let pipeline = TestPipeline::new();
    let result = pipeline
        .orchestrator
        .build("task-1", layered_plan())
        .await
        .unwrap();

    let steps = pipeline.orchestrator.steps(&result.job_id).await.unwrap();
    let kinds: Vec<(BuildPhase, StepKind)> = steps.iter().map(|s| (s.phase, s.action)).collect();
    assert_eq!(
        kinds,
        vec![
            (BuildPhase::Implement, StepKind::CreateFile),
            (BuildPhase::Implement, StepKind::CreateFile),
            (BuildPhase::Implement, StepKind::CreateFile),
            (BuildPhase::Implement, StepKind::CreateFile),
            (BuildPhase::Integrate, StepKind::Validate),
        ]
    );
    assert!(steps.iter().all(|s| s.completed_at.is_some()));
    assert!(steps.iter().all(|s| s.status == StepStatus::Success));
}

#[tokio::test]
async fn test_failed_file_does_not_fail_valid_project() {
    let sandbox = MockSandbox::new();
    sandbox.fail_checks("bad.ts", vec!["bad.ts(1,1): error TS1005: ';' expected.".to_string()]);
    let pipeline = TestPipeline::builder().sandbox(sandbox).build();

    let plan = BuildPlan::new(
        "Add a broken module",
        vec![PlanStep::create("good.ts"), PlanStep::create("bad.ts")],
    );
    let result = pipeline.orchestrator.build("task-1", plan).await.unwrap();

    assert_eq!(pipeline.oracle.fix_count("bad.ts"), 3);
    assert_eq!(pipeline.oracle.fix_count("good.ts"), 0);
    assert_eq!(
        pipeline
            .sandbox
            .check_calls()
            .iter()
            .filter(|p| *p == "bad.ts")
            .count(),
        4
    );

    assert!(result.success);
    assert_eq!(
        result.errors,
        vec!["bad.ts: bad.ts(1,1): error TS1005: ';' expected."]
    );
    let bad = result.files.iter().find(|f| f.path == "bad.ts").unwrap();
    assert_eq!(bad.content, "// fixed bad.ts (3)\n");

    let job = pipeline.orchestrator.status(&result.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    let status = job.file("bad.ts").unwrap();
    assert_eq!(status.state, FileState::Failed);
    assert_eq!(status.attempts, 4);
    assert!(job.context_window.is_tainted("bad.ts"));
    assert!(!job.context_window.is_tainted("good.ts"));
}

#[tokio::test]
async fn test_integration_repair_is_bounded() {
    let sandbox = MockSandbox::new();
    sandbox.set_default_validation(failed_report(&["app.ts(4,2): error TS2322: bad type"]));
    let pipeline = TestPipeline::builder().sandbox(sandbox).build();

    let plan = BuildPlan::new("Build the app", vec![PlanStep::create("app.ts")]);
    let result = pipeline.orchestrator.build("task-1", plan).await.unwrap();

    assert_eq!(pipeline.sandbox.validate_calls(), 3);
    assert_eq!(pipeline.oracle.fix_count("app.ts"), 2);
    assert!(!result.success);
    assert_eq!(result.errors, vec!["app.ts(4,2): error TS2322: bad type"]);
    assert_eq!(
        result.validation_output.as_deref(),
        Some("app.ts(4,2): error TS2322: bad type")
    );
    assert_eq!(result.tokens_used, 300);

    let job = pipeline.orchestrator.status(&result.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.build_iterations, 3);
    assert_eq!(
        job.error.as_deref(),
        Some("Validation failed after 3 iterations")
    );
}

#[tokio::test]
async fn test_integration_repair_then_success() {
    let sandbox = MockSandbox::new();
    sandbox.queue_validation(failed_report(&["src/api.ts(2,1): error TS2304"]));
    let pipeline = TestPipeline::builder().sandbox(sandbox).build();

    let plan = BuildPlan::new(
        "Build the api",
        vec![PlanStep::create("src/api.ts"), PlanStep::create("src/db.ts")],
    );
    let result = pipeline.orchestrator.build("task-1", plan).await.unwrap();

    assert!(result.success);
    assert_eq!(pipeline.sandbox.validate_calls(), 2);
    assert_eq!(pipeline.oracle.fix_count("src/api.ts"), 1);
    assert_eq!(pipeline.oracle.fix_count("src/db.ts"), 0);
    let api = result.files.iter().find(|f| f.path == "src/api.ts").unwrap();
    assert_eq!(api.content, "// fixed src/api.ts (1)\n");
}

#[tokio::test]
async fn test_custom_iteration_limits() {
    let sandbox = MockSandbox::new();
    sandbox.set_default_validation(failed_report(&["a.ts(1,1): error"]));
    let pipeline = TestPipeline::builder()
        .sandbox(sandbox)
        .config(BuildConfig::default().with_max_integration_iterations(1))
        .build();

    let plan = BuildPlan::new("Build", vec![PlanStep::create("a.ts")]);
    let result = pipeline.orchestrator.build("task-1", plan).await.unwrap();

    assert!(!result.success);
    assert_eq!(pipeline.sandbox.validate_calls(), 1);
    assert_eq!(pipeline.oracle.fix_count("a.ts"), 0);
}

#[tokio::test]
async fn test_cancel_between_phases() {
    let token = CancellationToken::new();
    let pipeline = TestPipeline::builder()
        .progress(Arc::new(CancelOnPhase {
            phase: BuildPhase::Implement,
            token: token.clone(),
        }))
        .build();

    let job = pipeline
        .orchestrator
        .submit("task-1", layered_plan())
        .await
        .unwrap();
    let result = pipeline
        .orchestrator
        .run_with_token(&job.id, &token)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.errors, vec!["Job cancelled"]);
    assert!(result.files.is_empty());
    assert_eq!(pipeline.sandbox.written_paths().len(), 4);
    assert_eq!(pipeline.sandbox.validate_calls(), 0);

    let stored = pipeline.orchestrator.status(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert_eq!(stored.error.as_deref(), Some("Job cancelled"));

    let last = pipeline.events.events().pop().unwrap();
    assert_eq!(last.phase, BuildPhase::Integrate);
    assert_eq!(last.status, ProgressStatus::Failed);
}

#[tokio::test]
async fn test_cancelled_job_cannot_run() {
    let pipeline = TestPipeline::new();
    let job = pipeline
        .orchestrator
        .submit("task-1", layered_plan())
        .await
        .unwrap();

    assert!(pipeline.orchestrator.cancel(&job.id).await.unwrap());
    assert!(!pipeline.orchestrator.cancel(&job.id).await.unwrap());

    let err = pipeline.orchestrator.run(&job.id).await.unwrap_err();
    assert!(matches!(
        err,
        BuildError::AlreadyFinished {
            status: JobStatus::Cancelled,
            ..
        }
    ));
    assert!(pipeline.sandbox.written_paths().is_empty());
}

#[tokio::test]
async fn test_scaffold_first_runs_commands_once() {
    let mut steps = vec![
        PlanStep::command("npm init -y"),
        PlanStep::create("package.json").with_content("{\"name\": \"demo\"}\n"),
    ];
    for name in ["a", "b", "c", "d", "e"] {
        steps.push(PlanStep::create(format!("src/{}.ts", name)));
    }
    let pipeline = TestPipeline::new();

    let result = pipeline
        .orchestrator
        .build("task-1", BuildPlan::new("Scaffold a project", steps))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(pipeline.sandbox.commands(), vec!["npm init -y"]);

    let job = pipeline.orchestrator.status(&result.job_id).await.unwrap();
    assert_eq!(job.strategy, BuildStrategy::ScaffoldFirst);
    assert_eq!(job.total_steps, 6);

    let steps = pipeline.orchestrator.steps(&result.job_id).await.unwrap();
    assert_eq!(steps[0].phase, BuildPhase::Scaffold);
    assert_eq!(steps[0].action, StepKind::RunCommand);
}

#[tokio::test]
async fn test_failed_scaffold_command_is_not_fatal() {
    let sandbox = MockSandbox::new();
    sandbox.fail_command("npm init");
    let pipeline = TestPipeline::builder().sandbox(sandbox).build();

    let plan = BuildPlan::new(
        "Scaffold",
        vec![PlanStep::command("npm init -y"), PlanStep::create("index.ts")],
    );
    let result = pipeline.orchestrator.build("task-1", plan).await.unwrap();

    assert!(result.success);
    let steps = pipeline.orchestrator.steps(&result.job_id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(pipeline.sandbox.written_paths(), vec!["index.ts"]);
}

#[tokio::test]
async fn test_detected_packages_installed_before_implement() {
    let pipeline = TestPipeline::new();
    let plan = BuildPlan::new(
        "Add a server",
        vec![
            PlanStep::create("server.ts").with_content(
                "import express from 'express';\nimport { z } from 'zod';\nimport { port } from './config';\n",
            ),
            PlanStep::create("config.ts")
                .with_content("import fs from 'node:fs';\nexport const port = 3000;\n"),
        ],
    );

    let result = pipeline.orchestrator.build("task-1", plan).await.unwrap();

    assert!(result.success);
    assert_eq!(pipeline.sandbox.commands(), vec!["npm install express zod"]);
    let steps = pipeline.orchestrator.steps(&result.job_id).await.unwrap();
    assert_eq!(steps[0].phase, BuildPhase::Dependencies);
    assert_eq!(steps[0].action, StepKind::Install);
}

#[tokio::test]
async fn test_explicit_install_replaces_detection() {
    let pipeline = TestPipeline::builder()
        .config(BuildConfig::default().with_install_command("pnpm add"))
        .build();
    let plan = BuildPlan::new(
        "Add a server",
        vec![
            PlanStep::command("npm install express"),
            PlanStep::create("server.ts").with_content("import express from 'express';\n"),
        ],
    );

    pipeline.orchestrator.build("task-1", plan).await.unwrap();

    assert_eq!(pipeline.sandbox.commands(), vec!["npm install express"]);
}

#[tokio::test]
async fn test_store_failure_fails_job() {
    let pipeline = TestPipeline::builder()
        .store(Arc::new(FailingStore::on_phase(BuildPhase::Implement)))
        .build();

    let result = pipeline
        .orchestrator
        .build("task-1", layered_plan())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("disk full"));
    assert!(pipeline.oracle.generate_calls().is_empty());
    assert!(pipeline.sandbox.written_paths().is_empty());
}

#[tokio::test]
async fn test_cycle_falls_back_to_plan_order() {
    let pipeline = TestPipeline::new();
    let plan = BuildPlan::new(
        "Mutually dependent modules",
        vec![
            PlanStep::create("a.ts").with_content("import { b } from './b';\nexport const a = 1;\n"),
            PlanStep::create("b.ts").with_content("import { a } from './a';\nexport const b = 2;\n"),
            PlanStep::create("d.ts").with_content("import { c } from './c';\nexport const d = c;\n"),
            PlanStep::create("c.ts").with_content("export const c = 3;\n"),
        ],
    );

    let result = pipeline.orchestrator.build("task-1", plan).await.unwrap();

    assert!(result.success);
    assert_eq!(
        pipeline.sandbox.written_paths(),
        vec!["a.ts", "b.ts", "d.ts", "c.ts"]
    );
    let job = pipeline.orchestrator.status(&result.job_id).await.unwrap();
    assert_eq!(job.strategy, BuildStrategy::DependencyOrder);
}

#[tokio::test]
async fn test_modify_and_delete_existing_files() {
    let pipeline = TestPipeline::new();
    let plan = BuildPlan::new(
        "Rename the config module",
        vec![
            PlanStep::modify("src/server.ts").with_description("Read settings from ./settings"),
            PlanStep::create("src/settings.ts")
                .with_content("export const settings = { port: 8080 };\n"),
            PlanStep::delete("src/config.ts"),
        ],
    );
    let job = BuilderJob::new("task-1", plan).with_existing_files(ContextWindow::from_files([
        ("src/server.ts", "import { port } from './config';\n"),
        ("src/config.ts", "export const port = 80;\n"),
    ]));

    let job = pipeline.orchestrator.submit_job(job).await.unwrap();
    let result = pipeline.orchestrator.run(&job.id).await.unwrap();

    assert!(result.success);
    assert_eq!(pipeline.sandbox.deletes(), vec!["src/config.ts"]);

    let request = &pipeline.oracle.generate_calls()[0];
    assert_eq!(request.path, "src/server.ts");
    assert_eq!(
        request.existing_content.as_deref(),
        Some("import { port } from './config';\n")
    );

    let actions: Vec<(&str, StepAction)> = result
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.action))
        .collect();
    assert_eq!(
        actions,
        vec![
            ("src/server.ts", StepAction::ModifyFile),
            ("src/settings.ts", StepAction::CreateFile),
            ("src/config.ts", StepAction::DeleteFile),
        ]
    );
    assert_eq!(result.files[2].content, "");

    let stored = pipeline.orchestrator.status(&job.id).await.unwrap();
    assert_eq!(stored.file("src/config.ts").unwrap().state, FileState::Deleted);
    assert_eq!(stored.current_step, 3);
}

#[tokio::test]
async fn test_progress_events_bracket_the_run() {
    let pipeline = TestPipeline::new();
    pipeline
        .orchestrator
        .build("task-1", layered_plan())
        .await
        .unwrap();

    let events = pipeline.events.events();
    let first = events.first().unwrap();
    assert_eq!(first.phase, BuildPhase::Init);
    assert_eq!(first.status, ProgressStatus::Started);
    assert_eq!(first.task_id, "task-1");

    let last = events.last().unwrap();
    assert_eq!(last.phase, BuildPhase::Finalize);
    assert_eq!(last.status, ProgressStatus::Completed);
    assert_eq!(last.step, 4);
    assert_eq!(last.total_steps, 4);

    let started: Vec<BuildPhase> = events
        .iter()
        .filter(|e| e.status == ProgressStatus::Started)
        .map(|e| e.phase)
        .collect();
    assert_eq!(started, BuildPhase::ALL.to_vec());

    let files: Vec<&str> = events
        .iter()
        .filter_map(|e| e.current_file.as_deref())
        .collect();
    assert_eq!(files, vec!["types.ts", "utils.ts", "app.ts", "index.ts"]);
}

struct ExplodingPhase;

#[async_trait]
impl WorkflowPhase for ExplodingPhase {
    fn phase(&self) -> BuildPhase {
        BuildPhase::Integrate
    }

    async fn execute(&self, _ctx: &BuildContext, _state: &mut JobState) -> Result<(), BuildError> {
        Err(BuildError::phase(BuildPhase::Integrate, "validator crashed"))
    }
}

#[tokio::test]
async fn test_failing_phase_marks_job_failed() {
    let pipeline = TestPipeline::new();
    let orchestrator = pipeline.orchestrator.with_phases(vec![
        Box::new(InitPhase),
        Box::new(ExplodingPhase),
        Box::new(FinalizePhase),
    ]);

    let result = orchestrator.build("task-1", layered_plan()).await.unwrap();

    assert!(!result.success);
    assert_eq!(
        result.errors,
        vec!["Phase integrate failed: validator crashed"]
    );
    let job = orchestrator.status(&result.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.current_phase, Some(BuildPhase::Integrate));
    assert_eq!(
        job.error.as_deref(),
        Some("Phase integrate failed: validator crashed")
    );

    let last = pipeline.events.events().pop().unwrap();
    assert_eq!(last.phase, BuildPhase::Integrate);
    assert_eq!(last.status, ProgressStatus::Failed);
}

/// Finalize that receives a store-side cancel while it is still running
struct CancelledFinalize;

#[async_trait]
impl WorkflowPhase for CancelledFinalize {
    fn phase(&self) -> BuildPhase {
        BuildPhase::Finalize
    }

    async fn execute(&self, ctx: &BuildContext, state: &mut JobState) -> Result<(), BuildError> {
        assert!(ctx.store.cancel(&state.job.id).await?);
        FinalizePhase.execute(ctx, state).await
    }
}

#[tokio::test]
async fn test_cancel_during_last_phase_stays_cancelled() {
    let pipeline = TestPipeline::new();
    let orchestrator = pipeline
        .orchestrator
        .with_phases(vec![Box::new(InitPhase), Box::new(CancelledFinalize)]);

    let result = orchestrator.build("task-1", layered_plan()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.errors, vec!["Job cancelled"]);
    let job = orchestrator.status(&result.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    let last = pipeline.events.events().pop().unwrap();
    assert_eq!(last.phase, BuildPhase::Finalize);
    assert_eq!(last.status, ProgressStatus::Failed);
}

#[tokio::test]
async fn test_incremental_check_outcomes_are_consumed_in_order() {
    let sandbox = MockSandbox::new();
    sandbox.queue_check(
        "lib.ts",
        IncrementalCheck::failed(vec!["lib.ts(1,1): error TS2304".to_string()]),
    );
    let pipeline = TestPipeline::builder().sandbox(sandbox).build();

    let plan = BuildPlan::new("Library", vec![PlanStep::create("lib.ts")]);
    let result = pipeline.orchestrator.build("task-1", plan).await.unwrap();

    assert!(result.success);
    assert_eq!(pipeline.oracle.fix_count("lib.ts"), 1);
    let fix = &pipeline.oracle.fix_calls()[0];
    assert_eq!(fix.content, "// generated lib.ts\n");
    assert_eq!(fix.errors, vec!["lib.ts(1,1): error TS2304"]);

    let job = pipeline.orchestrator.status(&result.job_id).await.unwrap();
    assert_eq!(job.file("lib.ts").unwrap().attempts, 2);
    assert_eq!(job.tokens_used, 200);
}
