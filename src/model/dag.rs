//! Dependency graph over a task snapshot.
//!
//! The backend promises an acyclic graph where nothing runs ahead of its
//! dependencies. [`TaskGraph`] checks both promises on the client side and
//! derives each task's effective status: a task that breaks them is shown as
//! `blocked` instead of trusting the server.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use super::task::{Task, TaskQueue, TaskStatus};

/// Dependency graph borrowed from a [`TaskQueue`].
///
/// Nodes are tasks; an edge `a → b` means `b` depends on `a`. References to
/// ids outside the snapshot are dangling and left out.
pub struct TaskGraph<'a> {
    graph: DiGraph<&'a Task, ()>,
    index: HashMap<&'a str, NodeIndex>,
    dangling: usize,
}

impl<'a> TaskGraph<'a> {
    pub fn build(queue: &'a TaskQueue) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for task in queue.tasks.iter().filter(|t| t.is_valid()) {
            if index.contains_key(task.id.as_str()) {
                continue;
            }
            let node = graph.add_node(task);
            index.insert(task.id.as_str(), node);
        }

        let mut dangling = 0;
        for task in queue.tasks.iter().filter(|t| t.is_valid()) {
            let Some(&to) = index.get(task.id.as_str()) else {
                continue;
            };
            let mut linked = HashSet::new();
            for dep in &task.dependencies {
                match index.get(dep.as_str()) {
                    Some(&from) => {
                        if linked.insert(from) {
                            graph.add_edge(from, to, ());
                        }
                    }
                    None => dangling += 1,
                }
            }
        }

        Self {
            graph,
            index,
            dangling,
        }
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Dependency references that point outside the snapshot.
    pub fn dangling_count(&self) -> usize {
        self.dangling
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Present `(dependency, dependent)` pairs in insertion order.
    pub fn edges(&self) -> Vec<(&'a Task, &'a Task)> {
        self.graph
            .edge_indices()
            .filter_map(|e| {
                let (from, to) = self.graph.edge_endpoints(e)?;
                Some((self.graph[from], self.graph[to]))
            })
            .collect()
    }

    pub fn dependencies_of(&self, id: &str) -> Vec<&'a Task> {
        self.neighbors(id, Direction::Incoming)
    }

    pub fn dependents_of(&self, id: &str) -> Vec<&'a Task> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, dir: Direction) -> Vec<&'a Task> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&'a Task> = self
            .graph
            .neighbors_directed(node, dir)
            .map(|n| self.graph[n])
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Ids of every task sitting on a dependency cycle.
    pub fn cyclic_tasks(&self) -> HashSet<&'a str> {
        let mut cyclic = HashSet::new();
        for component in tarjan_scc(&self.graph) {
            let self_loop = component.len() == 1
                && self.graph.find_edge(component[0], component[0]).is_some();
            if component.len() > 1 || self_loop {
                for node in component {
                    cyclic.insert(self.graph[node].id.as_str());
                }
            }
        }
        cyclic
    }

    /// Status the client should display for each task.
    ///
    /// Tasks on a cycle, and in-progress/completed tasks with an unfinished
    /// dependency present in the snapshot, are reported as `Blocked`.
    pub fn effective_statuses(&self) -> HashMap<&'a str, TaskStatus> {
        let cyclic = self.cyclic_tasks();
        self.graph
            .node_indices()
            .map(|node| {
                let task = self.graph[node];
                let status = if cyclic.contains(task.id.as_str()) {
                    TaskStatus::Blocked
                } else if task.status.requires_satisfied_dependencies()
                    && self
                        .graph
                        .neighbors_directed(node, Direction::Incoming)
                        .any(|dep| self.graph[dep].status != TaskStatus::Completed)
                {
                    TaskStatus::Blocked
                } else {
                    task.status
                };
                (task.id.as_str(), status)
            })
            .collect()
    }
}

impl std::fmt::Debug for TaskGraph<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .field("dangling", &self.dangling)
            .finish()
    }
}
