//! Model for the TEA (The Elm Architecture) pattern.
//!
//! The Model is pure dashboard state - no channels, no handles, no runtime infrastructure.
//! It mirrors what the coordinator and tracker publish and caches the layouts
//! built from it.

use std::sync::Arc;

use crate::bus::View;
use crate::config::Config;
use crate::layout::{TaskLayout, TreeLayout};
use crate::model::{Job, JobId, TaskGraph};
use crate::render::{next_version, DetailView, JobView, RenderState, SyncView, TaskDetail};
use crate::selection::SelectionController;
use crate::sync::SyncSnapshot;

/// Level of a notification message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Error notification - displayed in red with "Error:" prefix
    Error,
    /// Informational notification - displayed in green
    Info,
}

/// A notification message to display to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

pub struct Model {
    pub view: View,
    pub jobs: Vec<Job>,
    pub selected_job: Option<JobId>,
    pub sync: SyncSnapshot,

    // Layout caches, rebuilt only when the snapshot data changes
    pub tree_layout: Arc<TreeLayout>,
    pub task_layout: Arc<TaskLayout>,

    pub selection: SelectionController,
    pub notification: Option<Notification>,
    /// Whether the keymap legend is expanded (toggled by '?')
    pub show_keymap: bool,

    // Dirty flag - set when state changes and render is needed
    pub dirty: bool,

    pub config: Config,
}

fn same_data<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl Model {
    pub fn new(config: Config) -> Self {
        Self {
            view: View::default(),
            jobs: Vec::new(),
            selected_job: None,
            sync: SyncSnapshot::default(),
            tree_layout: Arc::new(TreeLayout::default()),
            task_layout: Arc::new(TaskLayout::default()),
            selection: SelectionController::new(),
            notification: None,
            show_keymap: false,
            dirty: true,
            config,
        }
    }

    /// Take a new coordinator snapshot, relaying out only what changed.
    pub fn apply_snapshot(&mut self, snapshot: SyncSnapshot) {
        if snapshot.generation != self.sync.generation {
            self.selection.clear_all();
        }
        if !same_data(&snapshot.tree, &self.sync.tree) {
            self.tree_layout = Arc::new(TreeLayout::build(
                snapshot.tree.as_deref(),
                &self.config.layout,
            ));
            self.selection
                .reconcile(View::Tree, &self.tree_layout.focus_order());
        }
        if !same_data(&snapshot.tasks, &self.sync.tasks) {
            self.task_layout = Arc::new(match snapshot.tasks.as_deref() {
                Some(queue) => TaskLayout::build(queue, &self.config.layout),
                None => TaskLayout::default(),
            });
            self.selection
                .reconcile(View::Tasks, &self.task_layout.focus_order());
        }
        self.sync = snapshot;
    }

    pub fn set_jobs(&mut self, jobs: Vec<Job>, selected: Option<JobId>) {
        self.jobs = jobs;
        self.selected_job = selected;
    }

    pub fn focus_order(&self, view: View) -> Vec<String> {
        match view {
            View::Tree => self.tree_layout.focus_order(),
            View::Tasks => self.task_layout.focus_order(),
        }
    }

    fn detail(&self) -> Option<DetailView> {
        match self.view {
            View::Tree => self
                .selection
                .tree_detail(self.sync.tree.as_deref())
                .map(DetailView::Node),
            View::Tasks => {
                let queue = self.sync.tasks.as_deref();
                let task = self.selection.task_detail(queue)?;
                let graph = TaskGraph::build(queue?);
                let node = self.task_layout.node(&task.id);
                Some(DetailView::Task(TaskDetail {
                    task: task.clone(),
                    effective_status: node.map_or(task.status, |n| n.effective_status),
                    blocked: node.is_some_and(|n| n.blocked),
                    dependencies: graph
                        .dependencies_of(&task.id)
                        .into_iter()
                        .map(|t| t.id.clone())
                        .collect(),
                    dependents: graph
                        .dependents_of(&task.id)
                        .into_iter()
                        .map(|t| t.id.clone())
                        .collect(),
                }))
            }
        }
    }

    /// Create an immutable snapshot for the render thread.
    ///
    /// Layouts are shared, not copied; each snapshot gets a fresh version so
    /// the render thread can skip frames that change nothing.
    pub fn snapshot(&self) -> RenderState {
        let jobs: Vec<JobView> = self
            .jobs
            .iter()
            .map(|j| JobView {
                id: j.id.clone(),
                name: j.name.clone(),
                status: j.status,
                created_at: j.created_at,
                error: j.error.clone(),
                conclusion: j.summary.as_ref().map(|s| s.conclusion.clone()),
            })
            .collect();
        let selected_job = self
            .selected_job
            .as_ref()
            .and_then(|id| self.jobs.iter().position(|j| &j.id == id));

        RenderState {
            version: next_version(),
            view: self.view,
            jobs,
            selected_job,
            sync: SyncView::from_snapshot(&self.sync),
            tree: Arc::clone(&self.tree_layout),
            tasks: Arc::clone(&self.task_layout),
            focused: self.selection.focused(self.view).map(String::from),
            detail: self.detail(),
            notification: self.notification.clone(),
            show_keymap: self.show_keymap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeStatus, Task, TaskQueue, TaskStatus, TreeNode};
    use crate::sync::Target;

    fn tree() -> Arc<TreeNode> {
        Arc::new(
            TreeNode::new("r", "root", NodeStatus::Completed).with_children(vec![
                TreeNode::new("a", "alpha", NodeStatus::Pending),
                TreeNode::new("b", "beta", NodeStatus::InProgress),
            ]),
        )
    }

    fn snapshot(tree: Option<Arc<TreeNode>>, tasks: Option<Arc<TaskQueue>>) -> SyncSnapshot {
        SyncSnapshot {
            target: Some(Target::Global),
            tree,
            tasks,
            ..Default::default()
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Layout Cache Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_layout_built_from_snapshot() {
        let mut model = Model::new(Config::default());
        model.apply_snapshot(snapshot(Some(tree()), None));
        assert_eq!(model.tree_layout.nodes.len(), 3);
        assert!(model.task_layout.is_empty());
    }

    #[test]
    fn test_unchanged_data_keeps_layout() {
        let mut model = Model::new(Config::default());
        let shared = tree();
        model.apply_snapshot(snapshot(Some(Arc::clone(&shared)), None));
        let before = Arc::clone(&model.tree_layout);

        let mut next = snapshot(Some(shared), None);
        next.connected = true;
        model.apply_snapshot(next);
        assert!(Arc::ptr_eq(&before, &model.tree_layout));
        assert!(model.sync.connected);
    }

    #[test]
    fn test_focus_survives_replacement_when_id_remains() {
        let mut model = Model::new(Config::default());
        model.apply_snapshot(snapshot(Some(tree()), None));
        model.selection.focus(View::Tree, "b");

        model.apply_snapshot(snapshot(Some(tree()), None));
        assert_eq!(model.selection.focused(View::Tree), Some("b"));

        let smaller = Arc::new(TreeNode::new("r", "root", NodeStatus::Completed));
        model.apply_snapshot(snapshot(Some(smaller), None));
        assert_eq!(model.selection.focused(View::Tree), None);
    }

    #[test]
    fn test_new_generation_clears_focus() {
        let mut model = Model::new(Config::default());
        let shared = tree();
        model.apply_snapshot(snapshot(Some(Arc::clone(&shared)), None));
        model.selection.focus(View::Tree, "a");

        let mut switched = snapshot(Some(shared), None);
        switched.generation = 1;
        model.apply_snapshot(switched);
        assert_eq!(model.selection.focused(View::Tree), None);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Render Snapshot Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_snapshot_task_detail() {
        let queue = Arc::new(TaskQueue::new(vec![
            Task::new("T1", "first", TaskStatus::Pending),
            Task::new("T2", "second", TaskStatus::InProgress).with_dependencies(&["T1"]),
        ]));
        let mut model = Model::new(Config::default());
        model.apply_snapshot(snapshot(None, Some(queue)));
        model.view = View::Tasks;
        model.selection.focus(View::Tasks, "T2");

        let state = model.snapshot();
        assert_eq!(state.focused.as_deref(), Some("T2"));
        match state.detail {
            Some(DetailView::Task(detail)) => {
                assert_eq!(detail.task.id, "T2");
                assert!(detail.blocked);
                assert_eq!(detail.dependencies, vec!["T1".to_string()]);
                assert!(detail.dependents.is_empty());
            }
            other => panic!("expected task detail, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_selected_job_index() {
        let mut model = Model::new(Config::default());
        model.set_jobs(
            vec![Job::new("j1", "one"), Job::new("j2", "two")],
            Some(JobId::new("j2")),
        );
        let state = model.snapshot();
        assert_eq!(state.jobs.len(), 2);
        assert_eq!(state.selected_job, Some(1));

        model.set_jobs(model.jobs.clone(), None);
        assert_eq!(model.snapshot().selected_job, None);
    }

    #[test]
    fn test_snapshot_versions_increase() {
        let model = Model::new(Config::default());
        let a = model.snapshot().version;
        let b = model.snapshot().version;
        assert!(b > a);
    }
}
