//! Pull side of the backend protocol.
//!
//! [`StateSource`] is the seam the sync coordinator and lifecycle tracker
//! talk to. [`HttpStateSource`] speaks the REST API; [`MemorySource`] serves
//! scripted snapshots in-process.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::lenient::lenient;
use crate::model::{JobId, NodeDetail, SummaryResponse, TaskQueue, TaskStats, TreeNode, TreeStats};
use crate::Result;

pub use http::HttpStateSource;
pub use memory::{Endpoint, MemorySource};

/// Which slice of backend state a request addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Scope {
    Global,
    Job(JobId),
}

impl Scope {
    pub fn job(&self) -> Option<&JobId> {
        match self {
            Scope::Global => None,
            Scope::Job(id) => Some(id),
        }
    }

    pub fn tree_path(&self) -> String {
        match self {
            Scope::Global => "/tree".to_string(),
            Scope::Job(id) => format!("/tree/job/{}", id),
        }
    }

    pub fn stats_path(&self) -> String {
        match self {
            Scope::Global => "/tree/stats".to_string(),
            Scope::Job(id) => format!("/tree/job/{}/stats", id),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Job(id) => write!(f, "job:{}", id.short()),
        }
    }
}

/// Standard `{ data, message }` response wrapper.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of `GET /status`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(default, deserialize_with = "lenient")]
    pub api_status: String,
    #[serde(default, deserialize_with = "lenient")]
    pub memory_tree_loaded: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub task_queue_loaded: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tree_stats: Option<TreeStats>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub task_stats: Option<TaskStats>,
}

/// Read access to backend state.
///
/// `Ok(None)` means the request succeeded but the backend has nothing yet
/// (not produced). Transport and status failures are `Err`.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn fetch_tree(&self, scope: &Scope) -> Result<Option<TreeNode>>;

    async fn fetch_tree_stats(&self, scope: &Scope) -> Result<Option<TreeStats>>;

    async fn fetch_tasks(&self, scope: &Scope) -> Result<Option<TaskQueue>>;

    async fn fetch_summary(&self, job: &JobId) -> Result<SummaryResponse>;

    async fn fetch_node(&self, id: &str) -> Result<Option<NodeDetail>>;

    async fn fetch_status(&self) -> Result<SystemStatus>;

    /// Ask the backend to reload its tree and task data.
    async fn refresh(&self) -> Result<()>;
}
