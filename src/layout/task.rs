//! Task view layout: one column per status, dependencies as edges.

use std::cmp::Ordering;

use serde::Serialize;

use super::{Bounds, EdgeStyle, LayoutEdge, Position};
use crate::config::LayoutConfig;
use crate::model::{Priority, Task, TaskGraph, TaskQueue, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskColumn {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskColumn {
    pub const ALL: [TaskColumn; 4] = [
        TaskColumn::Pending,
        TaskColumn::InProgress,
        TaskColumn::Completed,
        TaskColumn::Failed,
    ];

    /// Reported `blocked` and unrecognised statuses share the pending column.
    pub fn for_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::InProgress => TaskColumn::InProgress,
            TaskStatus::Completed => TaskColumn::Completed,
            TaskStatus::Failed => TaskColumn::Failed,
            TaskStatus::Pending | TaskStatus::Blocked | TaskStatus::Unknown => TaskColumn::Pending,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn x(&self, config: &LayoutConfig) -> f64 {
        self.index() as f64 * config.column_spacing
    }

    pub fn title(&self) -> &'static str {
        match self {
            TaskColumn::Pending => "Pending",
            TaskColumn::InProgress => "In Progress",
            TaskColumn::Completed => "Completed",
            TaskColumn::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskLayoutNode {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    /// Status after the dependency checks; `Blocked` when they fail.
    pub effective_status: TaskStatus,
    pub blocked: bool,
    pub priority: Priority,
    pub column: TaskColumn,
    pub row: usize,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TaskLayout {
    pub nodes: Vec<TaskLayoutNode>,
    pub edges: Vec<LayoutEdge>,
    /// Dependency references to tasks outside the snapshot.
    pub dangling: usize,
    /// Tasks on a dependency cycle, sorted.
    pub cyclic: Vec<String>,
    pub column_spacing: f64,
}

/// Priority descending, then oldest first with undated tasks last, then id.
fn stacking_order(a: &Task, b: &Task) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}

fn edge_style(source: &Task, target: &Task, animated: bool) -> EdgeStyle {
    if source.status == TaskStatus::Failed {
        EdgeStyle::Failed
    } else if source.status == TaskStatus::Completed && target.status == TaskStatus::Pending {
        EdgeStyle::Satisfied
    } else if animated {
        EdgeStyle::Active
    } else {
        EdgeStyle::Waiting
    }
}

impl TaskLayout {
    pub fn build(queue: &TaskQueue, config: &LayoutConfig) -> Self {
        let graph = TaskGraph::build(queue);
        let effective = graph.effective_statuses();

        let mut columns: [Vec<&Task>; 4] = Default::default();
        for task in queue.tasks.iter().filter(|t| graph.contains(&t.id)) {
            // The graph keeps the first task per id.
            if columns.iter().flatten().any(|seen| seen.id == task.id) {
                continue;
            }
            columns[TaskColumn::for_status(task.status).index()].push(task);
        }

        let mut nodes = Vec::with_capacity(graph.task_count());
        for column in TaskColumn::ALL {
            let tasks = &mut columns[column.index()];
            tasks.sort_by(|a, b| stacking_order(a, b));
            for (row, task) in tasks.iter().enumerate() {
                let effective_status = effective
                    .get(task.id.as_str())
                    .copied()
                    .unwrap_or(task.status);
                nodes.push(TaskLayoutNode {
                    id: task.id.clone(),
                    description: task.description.clone(),
                    status: task.status,
                    effective_status,
                    blocked: effective_status == TaskStatus::Blocked,
                    priority: task.priority,
                    column,
                    row,
                    position: Position::new(
                        column.x(config),
                        config.top_margin + row as f64 * config.row_height,
                    ),
                });
            }
        }

        let edges = graph
            .edges()
            .into_iter()
            .map(|(source, target)| {
                let animated = target.status == TaskStatus::InProgress;
                LayoutEdge {
                    id: format!("edge-{}-{}", source.id, target.id),
                    source: source.id.clone(),
                    target: target.id.clone(),
                    animated,
                    style: edge_style(source, target, animated),
                }
            })
            .collect();

        let mut cyclic: Vec<String> = graph.cyclic_tasks().into_iter().map(String::from).collect();
        cyclic.sort();

        TaskLayout {
            nodes,
            edges,
            dangling: graph.dangling_count(),
            cyclic,
            column_spacing: config.column_spacing,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&TaskLayoutNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn column(&self, column: TaskColumn) -> impl Iterator<Item = &TaskLayoutNode> {
        self.nodes.iter().filter(move |n| n.column == column)
    }

    pub fn column_x(&self, column: TaskColumn) -> f64 {
        column.index() as f64 * self.column_spacing
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::of(self.nodes.iter().map(|n| n.position))
    }

    /// Column by column, top to bottom.
    pub fn focus_order(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }
}
