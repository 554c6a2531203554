//! In-process [`StateSource`] with scripted replies.
//!
//! Replies are captured when a request is issued; a configured delay is then
//! slept before returning, so a slow reply carries the state that existed at
//! request time. Every request is counted per scope and endpoint.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{Scope, StateSource, SystemStatus};
use crate::model::{JobId, NodeDetail, SummaryResponse, TaskQueue, TreeNode, TreeStats};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tree,
    Stats,
    Tasks,
    Summary,
    Node,
    Status,
    Refresh,
}

impl Endpoint {
    fn label(&self) -> &'static str {
        match self {
            Endpoint::Tree => "tree",
            Endpoint::Stats => "stats",
            Endpoint::Tasks => "tasks",
            Endpoint::Summary => "summary",
            Endpoint::Node => "node",
            Endpoint::Status => "status",
            Endpoint::Refresh => "refresh",
        }
    }
}

#[derive(Default)]
struct Script {
    trees: HashMap<Scope, TreeNode>,
    stats: HashMap<Scope, TreeStats>,
    tasks: HashMap<Scope, TaskQueue>,
    summaries: HashMap<JobId, SummaryResponse>,
    delays: HashMap<(Scope, Endpoint), Duration>,
    failures: HashSet<(Scope, Endpoint)>,
    calls: HashMap<(Scope, Endpoint), usize>,
}

#[derive(Default)]
pub struct MemorySource {
    script: Mutex<Script>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        // A panic while holding the lock cannot leave the script half-written.
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_tree(&self, scope: Scope, tree: Option<TreeNode>) {
        let mut script = self.script();
        match tree {
            Some(tree) => script.trees.insert(scope, tree),
            None => script.trees.remove(&scope),
        };
    }

    pub fn set_stats(&self, scope: Scope, stats: TreeStats) {
        self.script().stats.insert(scope, stats);
    }

    pub fn set_tasks(&self, scope: Scope, tasks: TaskQueue) {
        self.script().tasks.insert(scope, tasks);
    }

    pub fn set_summary(&self, job: JobId, response: SummaryResponse) {
        self.script().summaries.insert(job, response);
    }

    /// Make every request to `endpoint` under `scope` fail with a network error.
    pub fn fail(&self, scope: Scope, endpoint: Endpoint) {
        self.script().failures.insert((scope, endpoint));
    }

    pub fn heal(&self, scope: Scope, endpoint: Endpoint) {
        self.script().failures.remove(&(scope, endpoint));
    }

    pub fn delay(&self, scope: Scope, endpoint: Endpoint, delay: Duration) {
        self.script().delays.insert((scope, endpoint), delay);
    }

    pub fn clear_delay(&self, scope: Scope, endpoint: Endpoint) {
        self.script().delays.remove(&(scope, endpoint));
    }

    pub fn calls(&self, scope: &Scope, endpoint: Endpoint) -> usize {
        self.script()
            .calls
            .get(&(scope.clone(), endpoint))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self, endpoint: Endpoint) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|((_, e), _)| *e == endpoint)
            .map(|(_, n)| n)
            .sum()
    }

    pub fn reset_calls(&self) {
        self.script().calls.clear();
    }

    /// Count the call, then capture the reply while still holding the lock.
    async fn serve<T>(
        &self,
        scope: &Scope,
        endpoint: Endpoint,
        read: impl FnOnce(&Script) -> T,
    ) -> Result<T> {
        let (reply, delay) = {
            let mut script = self.script();
            *script.calls.entry((scope.clone(), endpoint)).or_insert(0) += 1;
            let key = (scope.clone(), endpoint);
            let reply = if script.failures.contains(&key) {
                Err(Error::network(
                    format!("{}/{}", scope, endpoint.label()),
                    "scripted failure",
                ))
            } else {
                Ok(read(&script))
            };
            (reply, script.delays.get(&key).copied())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}

#[async_trait]
impl StateSource for MemorySource {
    async fn fetch_tree(&self, scope: &Scope) -> Result<Option<TreeNode>> {
        self.serve(scope, Endpoint::Tree, |s| s.trees.get(scope).cloned())
            .await
    }

    async fn fetch_tree_stats(&self, scope: &Scope) -> Result<Option<TreeStats>> {
        self.serve(scope, Endpoint::Stats, |s| s.stats.get(scope).cloned())
            .await
    }

    async fn fetch_tasks(&self, scope: &Scope) -> Result<Option<TaskQueue>> {
        self.serve(scope, Endpoint::Tasks, |s| s.tasks.get(scope).cloned())
            .await
    }

    async fn fetch_summary(&self, job: &JobId) -> Result<SummaryResponse> {
        let scope = Scope::Job(job.clone());
        self.serve(&scope, Endpoint::Summary, |s| {
            s.summaries.get(job).cloned().unwrap_or_default()
        })
        .await
    }

    async fn fetch_node(&self, id: &str) -> Result<Option<NodeDetail>> {
        self.serve(&Scope::Global, Endpoint::Node, |s| {
            s.trees
                .get(&Scope::Global)
                .and_then(|tree| NodeDetail::from_tree(tree, id))
        })
        .await
    }

    async fn fetch_status(&self) -> Result<SystemStatus> {
        self.serve(&Scope::Global, Endpoint::Status, |s| SystemStatus {
            api_status: "running".to_string(),
            memory_tree_loaded: s.trees.contains_key(&Scope::Global),
            task_queue_loaded: s.tasks.contains_key(&Scope::Global),
            timestamp: None,
            tree_stats: s.stats.get(&Scope::Global).cloned(),
            task_stats: s.tasks.get(&Scope::Global).map(|q| q.stats.clone()),
        })
        .await
    }

    async fn refresh(&self) -> Result<()> {
        self.serve(&Scope::Global, Endpoint::Refresh, |_| ()).await
    }
}
