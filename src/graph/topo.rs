use super::DependencyGraph;
use crate::plan::PlanStep;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::warn;

/// The graph could not be fully ordered; `nodes` still held positive in-degree
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Dependency cycle detected among: {}", .nodes.join(", "))]
pub struct CycleError {
    pub nodes: Vec<String>,
}

/// Orders graph nodes dependencies-first using Kahn's algorithm.
///
/// The queue is seeded and drained in graph iteration order, so the result is
/// deterministic. Dependencies that are not themselves nodes are ignored.
pub fn topological_sort(graph: &DependencyGraph) -> Result<Vec<String>, CycleError> {
    let mut in_degree: IndexMap<&str, usize> = IndexMap::new();
    let mut dependents: IndexMap<&str, Vec<&str>> = IndexMap::new();

    for node in graph.nodes() {
        in_degree.insert(node.as_str(), 0);
        dependents.insert(node.as_str(), Vec::new());
    }

    for (node, deps) in graph.iter() {
        for dep in deps {
            if !graph.contains(dep) {
                continue;
            }
            if let Some(degree) = in_degree.get_mut(node.as_str()) {
                *degree += 1;
            }
            if let Some(list) = dependents.get_mut(dep.as_str()) {
                list.push(node.as_str());
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(node, _)| *node)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(graph.len());

    while let Some(node) = queue.pop_front() {
        sorted.push(node.to_string());

        if let Some(list) = dependents.get(node) {
            for &dependent in list {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    if sorted.len() < graph.len() {
        let nodes = in_degree
            .iter()
            .filter(|(_, &degree)| degree > 0)
            .map(|(node, _)| node.to_string())
            .collect();
        return Err(CycleError { nodes });
    }

    Ok(sorted)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOrder {
    pub order: Vec<String>,
    /// Set when sorting failed and `order` fell back to plan order
    pub cycle: Option<CycleError>,
}

impl BuildOrder {
    pub fn is_fallback(&self) -> bool {
        self.cycle.is_some()
    }
}

/// Topological order of the graph, or plan order of the written files when the
/// graph is cyclic. A cycle is never fatal.
pub fn resolve_build_order(graph: &DependencyGraph, steps: &[PlanStep]) -> BuildOrder {
    match topological_sort(graph) {
        Ok(order) => BuildOrder { order, cycle: None },
        Err(cycle) => {
            warn!(nodes = ?cycle.nodes, "Dependency cycle detected, falling back to plan order");
            BuildOrder {
                order: plan_order(steps),
                cycle: Some(cycle),
            }
        }
    }
}

/// Distinct create/modify paths in the order the plan first mentions them
pub fn plan_order(steps: &[PlanStep]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for path in steps.iter().filter_map(PlanStep::written_path) {
        if !order.iter().any(|p| p == path) {
            order.push(path.to_string());
        }
    }
    order
}
