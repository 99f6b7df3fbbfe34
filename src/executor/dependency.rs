//! Dependency-graph derivation, cycle detection, and level partitioning.
//!
//! The executor derives a [`DependencyGraph`] from its connection set on
//! every run. Traversal is deterministic: node ids are visited in sorted
//! order, so repeated runs of the same graph produce identical
//! topological orders and level partitions.

use rustc_hash::FxHashMap;

use super::ExecutorError;
use crate::connection::Connection;

/// Marker used during depth-first traversal. A node seen while still
/// `InProgress` closes a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Directed dependency view of a node/connection set.
///
/// Edges point from a node to the nodes it depends on (the sources of
/// its incoming connections). Parallel connections between the same node
/// pair collapse into a single dependency.
#[derive(Clone, Debug)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    dependencies: FxHashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the dependency view for the given nodes and connections.
    ///
    /// Connections referencing nodes outside `node_ids` are ignored; the
    /// executor guarantees they cannot exist in practice.
    pub fn new<'a, N, C>(node_ids: N, connections: C) -> Self
    where
        N: IntoIterator<Item = &'a str>,
        C: IntoIterator<Item = &'a Connection>,
    {
        let mut nodes: Vec<String> = node_ids.into_iter().map(str::to_string).collect();
        nodes.sort_unstable();

        let mut dependencies: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for connection in connections {
            if !nodes.iter().any(|n| *n == connection.from_node)
                || !nodes.iter().any(|n| *n == connection.to_node)
            {
                continue;
            }
            let deps = dependencies.entry(connection.to_node.clone()).or_default();
            if !deps.contains(&connection.from_node) {
                deps.push(connection.from_node.clone());
            }
        }
        for deps in dependencies.values_mut() {
            deps.sort_unstable();
        }

        Self {
            nodes,
            dependencies,
        }
    }

    /// Direct dependencies of a node (sources of its incoming
    /// connections), sorted by id.
    #[must_use]
    pub fn dependencies_of(&self, node_id: &str) -> &[String] {
        self.dependencies
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Dependency-first topological order over all nodes.
    ///
    /// Depth-first traversal with a transient in-progress marker set
    /// distinct from the done set; revisiting an in-progress node
    /// signals a cycle and fails the whole computation.
    pub fn topological_order(&self) -> Result<Vec<String>, ExecutorError> {
        let mut marks: FxHashMap<&str, Mark> = FxHashMap::default();
        let mut order: Vec<String> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            self.visit(node, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut FxHashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) -> Result<(), ExecutorError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(ExecutorError::CyclicDependency {
                    node_id: node.to_string(),
                });
            }
            None => {}
        }
        marks.insert(node, Mark::InProgress);
        for dep in self.dependencies_of(node) {
            self.visit(dep, marks, order)?;
        }
        marks.insert(node, Mark::Done);
        order.push(node.to_string());
        Ok(())
    }

    /// Partition nodes into dependency levels.
    ///
    /// `level(n)` is 0 when `n` has no incoming connections, else
    /// `1 + max(level(d))` over its direct dependencies. All nodes in a
    /// level are mutually independent and may run concurrently; the same
    /// cycle check as [`topological_order`](Self::topological_order)
    /// applies.
    pub fn level_partition(&self) -> Result<Vec<Vec<String>>, ExecutorError> {
        let order = self.topological_order()?;
        let mut level_of: FxHashMap<&str, usize> = FxHashMap::default();
        let mut levels: Vec<Vec<String>> = Vec::new();

        // Topological order guarantees dependencies were assigned first.
        for node in &order {
            let deps = self.dependencies_of(node);
            let level = deps
                .iter()
                .map(|dep| level_of[dep.as_str()] + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(node.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(node.clone());
        }
        Ok(levels)
    }
}
