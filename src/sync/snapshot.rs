//! Render-ready state published by the coordinator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{PullKind, Target};
use crate::model::{TaskQueue, TreeNode, TreeStats};
use crate::Error;

/// Per-kind data state. `NotProduced` and `Failed` are distinct empty states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DataState {
    #[default]
    Idle,
    Loading,
    Ready,
    /// The backend answered but has nothing for this target yet.
    NotProduced,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureCause {
    Network,
    NoData,
    Malformed,
    Timeout,
    Other,
}

impl From<&Error> for FailureCause {
    fn from(e: &Error) -> Self {
        match e {
            Error::Network { .. } | Error::Http(_) | Error::WebSocket(_) => FailureCause::Network,
            Error::NoData(_) => FailureCause::NoData,
            Error::MalformedPayload(_) | Error::Json(_) => FailureCause::Malformed,
            Error::Timeout(_) => FailureCause::Timeout,
            _ => FailureCause::Other,
        }
    }
}

/// A loud pull failure, shown to the user with a retry affordance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub kind: PullKind,
    pub cause: FailureCause,
    pub message: String,
}

impl SyncFailure {
    pub fn from_error(kind: PullKind, error: &Error) -> Self {
        Self {
            kind,
            cause: FailureCause::from(error),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} unavailable: {}", self.kind.label(), self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncSnapshot {
    pub target: Option<Target>,
    pub generation: u64,
    pub tree: Option<Arc<TreeNode>>,
    pub stats: Option<TreeStats>,
    pub tasks: Option<Arc<TaskQueue>>,
    pub tree_state: DataState,
    pub task_state: DataState,
    /// A loud pull is outstanding.
    pub loading: bool,
    /// Last loud failure per kind.
    pub tree_error: Option<SyncFailure>,
    pub task_error: Option<SyncFailure>,
    pub connected: bool,
    pub connection_message: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    /// Origin of the current tree: `pull`, `fallback`, or the push source tag.
    pub last_source: Option<String>,
    /// Bumped on every publish.
    pub revision: u64,
}

impl SyncSnapshot {
    /// Empty snapshot for a freshly observed target. Connectivity is global
    /// and carried over.
    pub fn fresh(target: Option<Target>, generation: u64, previous: &SyncSnapshot) -> Self {
        Self {
            target,
            generation,
            connected: previous.connected,
            connection_message: previous.connection_message.clone(),
            revision: previous.revision,
            ..Default::default()
        }
    }

    pub fn state(&self, kind: PullKind) -> DataState {
        match kind {
            PullKind::Tree => self.tree_state,
            PullKind::Tasks => self.task_state,
        }
    }

    pub(crate) fn set_state(&mut self, kind: PullKind, state: DataState) {
        match kind {
            PullKind::Tree => self.tree_state = state,
            PullKind::Tasks => self.task_state = state,
        }
        self.loading =
            self.tree_state == DataState::Loading || self.task_state == DataState::Loading;
    }

    /// First outstanding failure, tree before tasks.
    pub fn error(&self) -> Option<&SyncFailure> {
        self.tree_error.as_ref().or(self.task_error.as_ref())
    }

    pub fn errors(&self) -> impl Iterator<Item = &SyncFailure> {
        self.tree_error.iter().chain(self.task_error.iter())
    }

    pub fn error_for(&self, kind: PullKind) -> Option<&SyncFailure> {
        match kind {
            PullKind::Tree => self.tree_error.as_ref(),
            PullKind::Tasks => self.task_error.as_ref(),
        }
    }

    pub(crate) fn set_error(&mut self, failure: SyncFailure) {
        match failure.kind {
            PullKind::Tree => self.tree_error = Some(failure),
            PullKind::Tasks => self.task_error = Some(failure),
        }
    }

    /// Drop the error that belongs to `kind` once that kind recovers.
    pub(crate) fn clear_error(&mut self, kind: PullKind) {
        match kind {
            PullKind::Tree => self.tree_error = None,
            PullKind::Tasks => self.task_error = None,
        }
    }

    pub(crate) fn clear_errors(&mut self) {
        self.tree_error = None;
        self.task_error = None;
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_none() && self.tasks.as_ref().map_or(true, |q| q.is_empty())
    }
}
