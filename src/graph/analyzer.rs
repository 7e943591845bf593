use super::imports::{extract_relative_imports, normalize_path, resolve_import, KnownFiles};
use super::DependencyGraph;
use crate::plan::PlanStep;
use tracing::debug;

/// Minimum length of an extension-stripped basename before a description
/// mention of it counts as coupling
const MIN_BASENAME_MENTION_LEN: usize = 3;

pub fn build_dependency_graph(steps: &[PlanStep]) -> DependencyGraph {
    let known = KnownFiles::from_paths(steps.iter().filter_map(PlanStep::written_path));
    let mut graph = DependencyGraph::new();

    for path in known.paths() {
        graph.add_node(path);
    }

    for step in steps {
        let (Some(path), Some(content)) = (canonical(&known, step), step.content.as_deref())
        else {
            continue;
        };

        for specifier in extract_relative_imports(content) {
            match resolve_import(path, &specifier, &known) {
                Some(target) => {
                    graph.add_edge(path, target);
                }
                None => debug!(file = %path, specifier = %specifier, "Unresolved import dropped"),
            }
        }
    }

    for step in steps {
        let (Some(path), Some(description)) =
            (canonical(&known, step), step.description.as_deref())
        else {
            continue;
        };

        for other in known.paths() {
            if other == path {
                continue;
            }
            let stem = basename_stem(other);
            if stem.len() >= MIN_BASENAME_MENTION_LEN && description.contains(stem) {
                graph.add_edge(path, other);
            }
        }
    }

    debug!(
        nodes = graph.len(),
        edges = graph.edge_count(),
        "Dependency graph built"
    );

    graph
}

/// The step's path as the graph spells it, i.e. its first spelling in the plan
fn canonical<'a>(known: &'a KnownFiles, step: &PlanStep) -> Option<&'a str> {
    let normalized = normalize_path(step.written_path()?)?;
    known.lookup(&normalized)
}

/// File name without directory and without its last extension
fn basename_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}
