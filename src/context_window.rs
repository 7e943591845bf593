//! Latest known content of every file touched by a build job

use crate::graph::DependencyGraph;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Path to latest content, grown monotonically during implement and integrate.
///
/// Files whose generation or repair failed are still stored, but flagged as
/// tainted so diagnostics can tell them apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    files: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    tainted: IndexSet<String>,
}

impl ContextWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the window with pre-existing repository content
    pub fn from_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            tainted: IndexSet::new(),
        }
    }

    /// Stores verified content, clearing any earlier taint
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        self.tainted.shift_remove(&path);
        self.files.insert(path, content.into());
    }

    pub fn insert_tainted(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        self.tainted.insert(path.clone());
        self.files.insert(path, content.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn is_tainted(&self, path: &str) -> bool {
        self.tainted.contains(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.files.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    /// Content of every transitive dependency of `path` already present here.
    ///
    /// Dependencies not built yet are omitted. `path` itself is never included,
    /// even when a cycle leads back to it.
    pub fn relevant_context(&self, path: &str, graph: &DependencyGraph) -> IndexMap<String, String> {
        let mut seen: IndexSet<&str> = IndexSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        seen.insert(path);
        queue.push_back(path);

        let mut context = IndexMap::new();
        while let Some(current) = queue.pop_front() {
            for dep in graph.dependencies(current) {
                if !seen.insert(dep.as_str()) {
                    continue;
                }
                if let Some(content) = self.files.get(dep) {
                    context.insert(dep.clone(), content.clone());
                }
                queue.push_back(dep.as_str());
            }
        }
        context
    }
}
