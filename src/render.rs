use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::bus::View;
use crate::layout::{TaskLayout, TreeLayout};
use crate::model::{JobId, JobStatus, NodeDetail, Task, TaskStatus, TreeStats};
use crate::sync::{DataState, SyncSnapshot};
use crate::tea::Notification;

#[derive(Debug, Clone)]
pub struct JobView {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Conclusion of the summary, once the job completed.
    pub conclusion: Option<String>,
}

/// Sync state of the observed target, flattened for the status line.
#[derive(Debug, Clone, Default)]
pub struct SyncView {
    pub target: String,
    pub connected: bool,
    pub connection_message: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
    pub tree_state: DataState,
    pub task_state: DataState,
    pub last_update: Option<DateTime<Utc>>,
    pub last_source: Option<String>,
    pub stats: Option<TreeStats>,
    pub task_count: usize,
}

impl SyncView {
    pub fn from_snapshot(snapshot: &SyncSnapshot) -> Self {
        Self {
            target: snapshot
                .target
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "none".to_string()),
            connected: snapshot.connected,
            connection_message: snapshot.connection_message.clone(),
            loading: snapshot.loading,
            error: join_errors(snapshot),
            tree_state: snapshot.tree_state,
            task_state: snapshot.task_state,
            last_update: snapshot.last_update,
            last_source: snapshot.last_source.clone(),
            stats: snapshot.stats.clone(),
            task_count: snapshot.tasks.as_ref().map_or(0, |q| q.len()),
        }
    }

    pub fn state(&self, view: View) -> DataState {
        match view {
            View::Tree => self.tree_state,
            View::Tasks => self.task_state,
        }
    }
}

fn join_errors(snapshot: &SyncSnapshot) -> Option<String> {
    let messages: Vec<String> = snapshot.errors().map(|e| e.to_string()).collect();
    (!messages.is_empty()).then(|| messages.join("; "))
}

#[derive(Debug, Clone)]
pub struct TaskDetail {
    pub task: Task,
    pub effective_status: TaskStatus,
    pub blocked: bool,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
}

/// Contents of the details pane.
#[derive(Debug, Clone)]
pub enum DetailView {
    Node(NodeDetail),
    Task(TaskDetail),
}

/// Render thread frame budget.
pub const FRAME_DURATION: Duration = Duration::from_micros(16_666);

static VERSION_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn next_version() -> u64 {
    VERSION_COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct RenderState {
    pub version: u64,
    pub view: View,
    pub jobs: Vec<JobView>,
    /// Index into `jobs`; `None` while observing the global tree.
    pub selected_job: Option<usize>,
    pub sync: SyncView,
    pub tree: Arc<TreeLayout>,
    pub tasks: Arc<TaskLayout>,
    /// Domain id of the focused node or task in the current view.
    pub focused: Option<String>,
    pub detail: Option<DetailView>,
    pub notification: Option<Notification>,
    /// Whether the keymap legend is expanded (toggled by '?')
    pub show_keymap: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            version: 0,
            view: View::Tree,
            jobs: Vec::new(),
            selected_job: None,
            sync: SyncView::default(),
            tree: Arc::new(TreeLayout::default()),
            tasks: Arc::new(TaskLayout::default()),
            focused: None,
            detail: None,
            notification: None,
            show_keymap: false,
        }
    }
}
