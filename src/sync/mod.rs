//! Pull/push synchronization of the observed target.
//!
//! Everything that mutates the snapshot arrives as a [`SyncEvent`] on one
//! queue owned by [`SyncCoordinator`]: timer ticks, finished pulls and push
//! frames. The coordinator applies them one at a time.

pub mod coordinator;
pub mod debounce;
pub mod snapshot;

use serde::Serialize;

use crate::actors::PushEvent;
use crate::model::{JobId, TaskQueue, TreeNode, TreeStats};
use crate::remote::Scope;

pub use coordinator::SyncCoordinator;
pub use debounce::Debouncer;
pub use snapshot::{DataState, FailureCause, SyncFailure, SyncSnapshot};

/// What the dashboard is currently observing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Target {
    Global,
    Job(JobId),
}

impl Target {
    pub fn scope(&self) -> Scope {
        match self {
            Target::Global => Scope::Global,
            Target::Job(id) => Scope::Job(id.clone()),
        }
    }

    pub fn job(&self) -> Option<&JobId> {
        match self {
            Target::Global => None,
            Target::Job(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.scope())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PullKind {
    Tree,
    Tasks,
}

impl PullKind {
    pub const ALL: [PullKind; 2] = [PullKind::Tree, PullKind::Tasks];

    pub fn label(&self) -> &'static str {
        match self {
            PullKind::Tree => "tree",
            PullKind::Tasks => "tasks",
        }
    }
}

/// Loud pulls show a loading state and surface errors; silent pulls do neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    Loud,
    Silent,
}

/// Timer that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Tree,
    Tasks,
    /// Task status corroboration while the observed job runs.
    TaskStatus,
}

impl TickKind {
    pub fn pull_kind(&self) -> PullKind {
        match self {
            TickKind::Tree => PullKind::Tree,
            TickKind::Tasks | TickKind::TaskStatus => PullKind::Tasks,
        }
    }
}

/// Tree and stats fetched together.
#[derive(Debug, Clone, PartialEq)]
pub struct TreePayload {
    pub tree: Option<TreeNode>,
    pub stats: Option<TreeStats>,
}

/// Result of a pull, stamped with the state it was issued under.
#[derive(Debug, Clone)]
pub struct Pulled<T> {
    pub generation: u64,
    /// Push epoch at issue time; a push since then supersedes this result.
    pub epoch: u64,
    pub mode: PullMode,
    /// Served by the global endpoints after the job-specific ones failed.
    pub fell_back: bool,
    pub outcome: std::result::Result<T, SyncFailure>,
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    Tick(TickKind),
    TreeLoaded(Pulled<TreePayload>),
    TasksLoaded(Pulled<Option<TaskQueue>>),
    Push(PushEvent),
    /// `POST /refresh` finished.
    BackendRefreshed(std::result::Result<(), SyncFailure>),
}
