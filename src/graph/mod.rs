//! File dependency graph derived from a build plan
//!
//! An edge `A -> B` means the generation of `A` must see the final content of
//! `B`, so `B` is emitted first. Iteration order is insertion order, which keeps
//! every derived ordering deterministic for identical plans.

pub mod analyzer;
pub mod externals;
pub mod imports;
pub mod topo;

pub use analyzer::build_dependency_graph;
pub use externals::{detect_external_packages, is_install_command};
pub use imports::{extract_imports, extract_relative_imports, resolve_import, KnownFiles};
pub use topo::{resolve_build_order, topological_sort, BuildOrder, CycleError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, path: &str) {
        self.edges.entry(path.to_string()).or_default();
    }

    /// Adds `from -> to`, ignoring self-edges and duplicates.
    /// Returns whether a new edge was recorded.
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        let deps = self.edges.entry(from.to_string()).or_default();
        if deps.iter().any(|d| d == to) {
            return false;
        }
        deps.push(to.to_string());
        true
    }

    pub fn dependencies(&self, path: &str) -> &[String] {
        self.edges.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.edges.contains_key(path)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.edges.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// True when at least one node has a non-empty adjacency list
    pub fn has_edges(&self) -> bool {
        self.edges.values().any(|deps| !deps.is_empty())
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}

/// Builds a graph verbatim from adjacency lists. Unlike [`DependencyGraph::add_edge`]
/// this keeps self-edges, which lets callers describe arbitrary (even cyclic) input.
impl FromIterator<(String, Vec<String>)> for DependencyGraph {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self {
            edges: iter.into_iter().collect(),
        }
    }
}
