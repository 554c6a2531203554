//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scripted in-memory backends
//! - Reference trees and task queues
//! - Push frames as the backend sends them

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use canopy::actors::{PushEvent, PushMessage};
use canopy::config::Config;
use canopy::model::{NodeStatus, Task, TaskQueue, TaskStatus, TreeNode};
use canopy::remote::{MemorySource, Scope};
use canopy::sync::{SyncCoordinator, SyncEvent};

/// Generous bound for loud pulls to land under paused time.
pub const SETTLE: Duration = Duration::from_secs(5);

/// Config with timers off, for tests that drive every pull by hand.
pub fn manual_config() -> Config {
    Config {
        auto_refresh: false,
        ..Config::default()
    }
}

pub fn source() -> Arc<MemorySource> {
    Arc::new(MemorySource::new())
}

pub fn coordinator(source: &Arc<MemorySource>, config: &Config) -> SyncCoordinator {
    SyncCoordinator::new(source.clone(), config)
}

pub fn leaf(id: &str, status: NodeStatus) -> TreeNode {
    TreeNode::new(id, id, status)
}

/// `r` (completed) with children `a` (pending) and `b` (failed).
pub fn reference_tree() -> TreeNode {
    TreeNode::new("r", "root", NodeStatus::Completed).with_children(vec![
        leaf("a", NodeStatus::Pending),
        leaf("b", NodeStatus::Failed),
    ])
}

/// Pending `T1` and in-progress `T2` depending on it.
pub fn reference_queue() -> TaskQueue {
    TaskQueue::new(vec![
        Task::new("T1", "collect evidence", TaskStatus::Pending),
        Task::new("T2", "correlate events", TaskStatus::InProgress).with_dependencies(&["T1"]),
    ])
}

/// Seed the global scope with the reference tree and queue.
pub fn seed_global(source: &MemorySource) {
    source.set_tree(Scope::Global, Some(reference_tree()));
    source.set_tasks(Scope::Global, reference_queue());
}

/// A `tree_update` frame carrying a single-node tree.
pub fn tree_update_frame(id: &str) -> String {
    serde_json::json!({
        "type": "tree_update",
        "data": {
            "tree": { "id": id, "name": id, "status": "in_progress", "children": [] },
            "source": "real_database",
            "timestamp": "2026-10-19T10:00:00Z"
        }
    })
    .to_string()
}

/// Parse a frame the way the push actor does and wrap it as a sync event.
pub fn push_event(frame: &str) -> SyncEvent {
    let message = PushMessage::parse(frame)
        .expect("frame parses")
        .expect("frame is a known type");
    SyncEvent::Push(PushEvent::Message(message))
}

/// Let cancelled timer tasks observe their cancellation.
pub async fn yield_a_few() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
