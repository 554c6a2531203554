//! Sync coordinator guarantees, exercised end to end against a scripted backend.

use std::time::Duration;

use canopy::actors::PushEvent;
use canopy::config::{Config, LayoutConfig};
use canopy::layout::TreeLayout;
use canopy::model::{JobId, NodeStatus, TaskStatus, TaskListPayload, TaskQueue};
use canopy::remote::{Endpoint, Scope};
use canopy::sync::{DataState, PullKind, SyncEvent, Target, TickKind};

use crate::fixtures::{
    coordinator, leaf, manual_config, push_event, reference_queue, reference_tree, seed_global,
    source, tree_update_frame, yield_a_few, SETTLE,
};

// ═══════════════════════════════════════════════════════════════════════════
// Debounce
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_two_silent_pulls_inside_window_make_one_call() {
    let source = source();
    seed_global(&source);
    let mut coord = coordinator(&source, &manual_config());
    coord.start(Target::Global);
    coord.settle(SETTLE).await.unwrap();

    // Leave both windows opened by the loud pulls at start.
    tokio::time::advance(Duration::from_millis(2500)).await;
    source.reset_calls();

    coord.handle_event(SyncEvent::Tick(TickKind::Tree));
    coord.handle_event(SyncEvent::Tick(TickKind::Tree));
    coord.run_for(Duration::from_millis(10)).await;
    assert_eq!(source.calls(&Scope::Global, Endpoint::Tree), 1);

    coord.handle_event(SyncEvent::Tick(TickKind::Tasks));
    coord.handle_event(SyncEvent::Tick(TickKind::TaskStatus));
    coord.run_for(Duration::from_millis(10)).await;
    assert_eq!(source.calls(&Scope::Global, Endpoint::Tasks), 1);
}

#[tokio::test(start_paused = true)]
async fn test_loud_pull_ignores_debounce() {
    let source = source();
    seed_global(&source);
    let mut coord = coordinator(&source, &manual_config());
    coord.start(Target::Global);
    coord.settle(SETTLE).await.unwrap();
    source.reset_calls();

    coord.retry();
    coord.retry();
    coord.settle(SETTLE).await.unwrap();
    assert_eq!(source.calls(&Scope::Global, Endpoint::Tree), 2);
}

// ═══════════════════════════════════════════════════════════════════════════
// Target Switching
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_delayed_response_for_old_target_is_never_applied() {
    let source = source();
    let old = Scope::Job(JobId::new("old-job"));
    source.set_tree(old.clone(), Some(leaf("old-root", NodeStatus::InProgress)));
    source.delay(old.clone(), Endpoint::Tree, Duration::from_millis(500));
    source.set_tree(Scope::Global, Some(reference_tree()));

    let mut coord = coordinator(&source, &Config::default());
    let rx = coord.subscribe();
    coord.start(Target::Job(JobId::new("old-job")));
    // The old pull is on the wire when the switch happens.
    coord.run_for(Duration::from_millis(10)).await;
    coord.switch_target(Target::Global);

    for _ in 0..20 {
        coord.run_for(Duration::from_millis(50)).await;
        let published = rx.borrow();
        let root = published.tree.as_ref().map(|t| t.id.clone());
        assert_ne!(root.as_deref(), Some("old-root"));
    }
    assert_eq!(source.calls(&old, Endpoint::Tree), 1);
    assert_eq!(coord.snapshot().tree.as_ref().unwrap().id, "r");
    assert_eq!(coord.snapshot().target, Some(Target::Global));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_switches_leave_no_dangling_timers() {
    let source = source();
    seed_global(&source);
    let mut coord = coordinator(&source, &Config::default());

    for round in 0..25 {
        let target = match round % 3 {
            0 => Target::Global,
            1 => Target::Job(JobId::new("a")),
            _ => Target::Job(JobId::new("b")),
        };
        coord.switch_target(target);
        coord.set_live(round % 2 == 0);
        yield_a_few().await;

        let expected = if coord.is_live() { 3 } else { 2 };
        assert_eq!(coord.live_timers(), expected, "round {}", round);
    }

    coord.stop();
    yield_a_few().await;
    assert_eq!(coord.live_timers(), 0);

    // Nothing ticks once every timer is gone.
    source.reset_calls();
    coord.run_for(Duration::from_secs(10)).await;
    assert_eq!(source.total_calls(Endpoint::Tree), 0);
    assert_eq!(source.total_calls(Endpoint::Tasks), 0);
}

#[tokio::test(start_paused = true)]
async fn test_switch_clears_previous_data_before_reload() {
    let source = source();
    seed_global(&source);
    let mut coord = coordinator(&source, &manual_config());
    coord.start(Target::Global);
    coord.settle(SETTLE).await.unwrap();
    assert!(coord.snapshot().tree.is_some());

    source.delay(Scope::Job(JobId::new("j")), Endpoint::Tree, Duration::from_secs(1));
    coord.switch_target(Target::Job(JobId::new("j")));
    let snap = coord.snapshot();
    assert!(snap.tree.is_none());
    assert!(snap.tasks.is_none());
    assert_eq!(snap.tree_state, DataState::Loading);
}

// ═══════════════════════════════════════════════════════════════════════════
// Failures
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_three_silent_failures_keep_last_loud_result() {
    let source = source();
    seed_global(&source);
    let mut coord = coordinator(&source, &Config::default());
    coord.start(Target::Global);
    coord.settle(SETTLE).await.unwrap();
    let good = coord.snapshot().tree.clone();

    source.fail(Scope::Global, Endpoint::Tree);
    source.reset_calls();
    // Tree timer fires every 3s.
    coord.run_for(Duration::from_millis(9100)).await;
    assert_eq!(source.calls(&Scope::Global, Endpoint::Tree), 3);

    let snap = coord.snapshot();
    assert_eq!(snap.tree, good);
    assert_eq!(snap.tree_state, DataState::Ready);
    assert!(snap.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_loud_failure_surfaces_error_for_retry() {
    let source = source();
    source.fail(Scope::Global, Endpoint::Tree);
    let mut coord = coordinator(&source, &manual_config());
    coord.start(Target::Global);
    coord.settle(SETTLE).await.unwrap();

    let error = coord.snapshot().error().cloned().unwrap();
    assert_eq!(error.kind, PullKind::Tree);
    assert_eq!(coord.snapshot().tree_state, DataState::Failed);

    source.heal(Scope::Global, Endpoint::Tree);
    source.set_tree(Scope::Global, Some(reference_tree()));
    coord.retry();
    coord.settle(SETTLE).await.unwrap();
    assert!(coord.snapshot().error().is_none());
    assert_eq!(coord.snapshot().tree_state, DataState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_task_recovery_keeps_tree_failure() {
    let source = source();
    source.fail(Scope::Global, Endpoint::Tree);
    source.fail(Scope::Global, Endpoint::Tasks);
    let mut coord = coordinator(&source, &manual_config());
    coord.start(Target::Global);
    coord.settle(SETTLE).await.unwrap();

    let snap = coord.snapshot();
    assert_eq!(snap.errors().count(), 2);
    assert_eq!(snap.error().unwrap().kind, PullKind::Tree);

    source.heal(Scope::Global, Endpoint::Tasks);
    source.set_tasks(Scope::Global, reference_queue());
    tokio::time::advance(Duration::from_millis(2500)).await;
    coord.handle_event(SyncEvent::Tick(TickKind::Tasks));
    coord.run_for(Duration::from_millis(10)).await;

    let snap = coord.snapshot();
    assert_eq!(snap.task_state, DataState::Ready);
    assert!(snap.error_for(PullKind::Tasks).is_none());
    assert_eq!(snap.tree_state, DataState::Failed);
    assert_eq!(snap.error().unwrap().kind, PullKind::Tree);
}

#[tokio::test(start_paused = true)]
async fn test_job_tasks_fall_back_to_global() {
    let source = source();
    seed_global(&source);
    let job = Scope::Job(JobId::new("j"));
    source.fail(job.clone(), Endpoint::Tasks);
    let mut coord = coordinator(&source, &manual_config());
    coord.start(Target::Job(JobId::new("j")));
    coord.settle(SETTLE).await.unwrap();

    let snap = coord.snapshot();
    assert_eq!(snap.tasks.as_ref().unwrap().len(), 2);
    assert!(snap.error().is_none());
    assert_eq!(source.calls(&job, Endpoint::Tasks), 1);
    assert_eq!(source.calls(&Scope::Global, Endpoint::Tasks), 1);
}

#[test]
fn test_one_bad_task_does_not_blank_the_queue() {
    let payload: TaskListPayload = serde_json::from_str(
        r#"{
            "pending": [
                {"id": "T1", "description": "ok", "priority": 9, "status": "pending"},
                {"description": "no id"},
                "not even an object"
            ],
            "in_progress": {"oops": true},
            "completed": [{"id": "T3", "status": "completed", "dependencies": "T1"}],
            "stats": 17
        }"#,
    )
    .unwrap();
    let queue = TaskQueue::from_payload(payload);

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.get("T1").unwrap().status, TaskStatus::Pending);
    assert_eq!(queue.get("T3").unwrap().status, TaskStatus::Completed);
}

// ═══════════════════════════════════════════════════════════════════════════
// Push Ordering
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_push_beats_late_pull_with_older_data() {
    let source = source();
    source.set_tree(Scope::Global, Some(leaf("older", NodeStatus::Pending)));
    source.delay(Scope::Global, Endpoint::Tree, Duration::from_millis(200));
    let mut coord = coordinator(&source, &manual_config());
    coord.start(Target::Global);

    coord.handle_event(push_event(&tree_update_frame("pushed")));
    coord.run_for(Duration::from_millis(300)).await;

    let snap = coord.snapshot();
    assert_eq!(snap.tree.as_ref().unwrap().id, "pushed");
    assert_eq!(snap.last_source.as_deref(), Some("real_database"));
    assert!(!snap.loading);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_tree_update_is_idempotent() {
    let source = source();
    let mut coord = coordinator(&source, &manual_config());
    coord.start(Target::Global);
    coord.settle(SETTLE).await.unwrap();

    let frame = tree_update_frame("pushed");
    coord.handle_event(push_event(&frame));
    let first = coord.snapshot().clone();
    coord.handle_event(push_event(&frame));
    let second = coord.snapshot();

    let config = LayoutConfig::default();
    let first_layout = TreeLayout::build(first.tree.as_deref(), &config);
    let second_layout = TreeLayout::build(second.tree.as_deref(), &config);
    assert!(!first_layout.nodes.is_empty());
    assert_eq!(first_layout, second_layout);
    assert_eq!(first.stats, second.stats);
    assert_eq!(first.tree_state, second.tree_state);
    assert!(second.revision > first.revision);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_keeps_data_and_flags_connectivity() {
    let source = source();
    seed_global(&source);
    let mut coord = coordinator(&source, &manual_config());
    coord.start(Target::Global);
    coord.settle(SETTLE).await.unwrap();
    coord.handle_event(push_event(
        r#"{"type":"connection_status","data":{"status":"connected","message":"hello"}}"#,
    ));
    assert!(coord.snapshot().connected);

    coord.handle_event(SyncEvent::Push(PushEvent::Disconnected(
        "connection reset".to_string(),
    )));
    let snap = coord.snapshot();
    assert!(!snap.connected);
    assert_eq!(snap.tree.as_ref().unwrap().id, "r");
    assert_eq!(snap.connection_message.as_deref(), Some("connection reset"));
}
