//! Heuristic choice of how the implement phase orders its work

use crate::graph::DependencyGraph;
use crate::plan::{PlanStep, StepAction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Package manifests whose creation signals a fresh project
pub const MANIFEST_FILES: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "go.mod",
    "requirements.txt",
    "composer.json",
    "Gemfile",
    "pom.xml",
    "build.gradle",
    "deno.json",
];

/// A fresh project needs more than this many created files to count as scaffolding
const SCAFFOLD_MIN_CREATES: usize = 5;

/// Dependency ordering only pays off past this many written files
const DEPENDENCY_ORDER_MIN_FILES: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStrategy {
    #[default]
    Sequential,
    ScaffoldFirst,
    DependencyOrder,
}

impl BuildStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStrategy::Sequential => "sequential",
            BuildStrategy::ScaffoldFirst => "scaffold_first",
            BuildStrategy::DependencyOrder => "dependency_order",
        }
    }

    /// Whether the implement phase follows the topological order
    pub fn uses_graph_order(&self) -> bool {
        !matches!(self, BuildStrategy::Sequential)
    }
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn has_init_command(steps: &[PlanStep]) -> bool {
    steps
        .iter()
        .filter(|s| s.action == StepAction::RunCommand)
        .filter_map(|s| s.command.as_deref())
        .any(|cmd| cmd.to_lowercase().contains("init"))
}

/// Picks a strategy from the shape of the plan and its graph.
///
/// Scaffolding wins for init commands or a manifest-led project of more than
/// five new files; dependency ordering needs real edges and more than three
/// written files; anything else runs sequentially.
pub fn select_strategy(steps: &[PlanStep], graph: &DependencyGraph) -> BuildStrategy {
    let created: Vec<&str> = steps
        .iter()
        .filter(|s| s.action == StepAction::CreateFile)
        .filter_map(|s| s.file_path.as_deref())
        .collect();

    let creates_manifest = created
        .iter()
        .any(|path| MANIFEST_FILES.contains(&basename(path)));

    if has_init_command(steps) || (creates_manifest && created.len() > SCAFFOLD_MIN_CREATES) {
        return BuildStrategy::ScaffoldFirst;
    }

    let written = steps.iter().filter(|s| s.written_path().is_some()).count();
    if graph.has_edges() && written > DEPENDENCY_ORDER_MIN_FILES {
        return BuildStrategy::DependencyOrder;
    }

    BuildStrategy::Sequential
}
