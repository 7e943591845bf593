//! Build plan types handed over by the upstream planner
//!
//! A plan is an ordered list of file and command intents for one coding task.
//! The engine performs no semantic validation of a plan: steps missing the
//! fields their action needs are skipped later rather than rejected here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a single plan step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    CreateFile,
    ModifyFile,
    DeleteFile,
    RunCommand,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::CreateFile => "create_file",
            StepAction::ModifyFile => "modify_file",
            StepAction::DeleteFile => "delete_file",
            StepAction::RunCommand => "run_command",
        }
    }

    /// Create or modify, i.e. the step produces file content
    pub fn writes_file(&self) -> bool {
        matches!(self, StepAction::CreateFile | StepAction::ModifyFile)
    }

    /// Any action that targets a file path
    pub fn is_file_action(&self) -> bool {
        !matches!(self, StepAction::RunCommand)
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub action: StepAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl PlanStep {
    fn file(action: StepAction, path: impl Into<String>) -> Self {
        Self {
            action,
            file_path: Some(path.into()),
            description: None,
            content: None,
            command: None,
        }
    }

    pub fn create(path: impl Into<String>) -> Self {
        Self::file(StepAction::CreateFile, path)
    }

    pub fn modify(path: impl Into<String>) -> Self {
        Self::file(StepAction::ModifyFile, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::file(StepAction::DeleteFile, path)
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self {
            action: StepAction::RunCommand,
            file_path: None,
            description: None,
            content: None,
            command: Some(command.into()),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Path of a create/modify step, `None` for anything else
    pub fn written_path(&self) -> Option<&str> {
        if self.action.writes_file() {
            self.file_path.as_deref()
        } else {
            None
        }
    }
}

/// Repository coordinates the plan targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub description: String,
    #[serde(default)]
    pub repo: RepoRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl BuildPlan {
    pub fn new(description: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            description: description.into(),
            repo: RepoRef::default(),
            model: None,
            steps,
        }
    }

    pub fn with_repo(mut self, repo: RepoRef) -> Self {
        self.repo = repo;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Steps that create or modify a file, in plan order
    pub fn write_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| s.written_path().is_some())
    }

    /// Number of steps targeting a file (create, modify or delete)
    pub fn file_step_count(&self) -> usize {
        file_step_count(&self.steps)
    }

    /// Command text of every `run_command` step, in plan order
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter(|s| s.action == StepAction::RunCommand)
            .filter_map(|s| s.command.as_deref())
    }
}

pub(crate) fn file_step_count(steps: &[PlanStep]) -> usize {
    steps
        .iter()
        .filter(|s| s.action.is_file_action() && s.file_path.is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_json() {
        let json = r#"{
            "description": "Add a greeter",
            "repo": {"owner": "acme", "name": "web"},
            "steps": [
                {"action": "create_file", "filePath": "src/greet.ts", "description": "greeter"},
                {"action": "run_command", "command": "npm install"},
                {"action": "delete_file", "filePath": "src/old.ts"}
            ]
        }"#;

        let plan = BuildPlan::from_json(json).unwrap();
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].action, StepAction::CreateFile);
        assert_eq!(plan.steps[0].file_path.as_deref(), Some("src/greet.ts"));
        assert_eq!(plan.repo.full_name(), "acme/web");
        assert!(plan.model.is_none());
        assert_eq!(plan.file_step_count(), 2);
        assert_eq!(plan.commands().collect::<Vec<_>>(), vec!["npm install"]);
    }

    #[test]
    fn test_written_path_only_for_writes() {
        assert_eq!(PlanStep::create("a.ts").written_path(), Some("a.ts"));
        assert_eq!(PlanStep::modify("b.ts").written_path(), Some("b.ts"));
        assert_eq!(PlanStep::delete("c.ts").written_path(), None);
        assert_eq!(PlanStep::command("ls").written_path(), None);
    }

    #[test]
    fn test_step_without_path_is_not_counted() {
        let mut step = PlanStep::create("a.ts");
        step.file_path = None;
        assert_eq!(file_step_count(&[step, PlanStep::create("b.ts")]), 1);
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_string(&StepAction::ModifyFile).unwrap();
        assert_eq!(json, "\"modify_file\"");
        assert_eq!(StepAction::RunCommand.to_string(), "run_command");
    }
}
