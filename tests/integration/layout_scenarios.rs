//! Layouts built from backend payloads, the way the dashboard receives them.

use canopy::config::LayoutConfig;
use canopy::layout::{EdgeStyle, TaskColumn, TaskLayout, TreeLayout};
use canopy::model::{TaskListPayload, TaskQueue, TaskStatus, TreeNode};

use crate::fixtures::{reference_queue, reference_tree};

fn tree_from_json(json: &str) -> TreeNode {
    serde_json::from_str(json).unwrap()
}

fn queue_from_json(json: &str) -> TaskQueue {
    let payload: TaskListPayload = serde_json::from_str(json).unwrap();
    TaskQueue::from_payload(payload)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tree Layout
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_reference_tree_layout() {
    let tree = tree_from_json(
        r#"{"id":"r","name":"root","status":"completed","children":[
            {"id":"a","name":"a","status":"pending","children":[]},
            {"id":"b","name":"b","status":"failed","children":[]}
        ]}"#,
    );
    let layout = TreeLayout::build(Some(&tree), &LayoutConfig::default());

    assert_eq!(layout.nodes.len(), 3);
    assert_eq!(layout.edges.len(), 2);

    let r = layout.find("r").unwrap();
    let a = layout.find("a").unwrap();
    let b = layout.find("b").unwrap();
    let edges: Vec<(&str, &str)> = layout
        .edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    assert_eq!(
        edges,
        vec![
            (r.layout_id.as_str(), a.layout_id.as_str()),
            (r.layout_id.as_str(), b.layout_id.as_str()),
        ]
    );
    assert_eq!(r.position.y - a.position.y, b.position.y - r.position.y);
    assert_eq!(a.position.x, 300.0);
    assert_eq!(b.position.x, 300.0);
}

#[test]
fn test_tree_layout_is_deterministic_across_payloads() {
    let json = serde_json::to_string(&reference_tree()).unwrap();
    let config = LayoutConfig::default();
    let first = TreeLayout::build(Some(&tree_from_json(&json)), &config);
    for _ in 0..10 {
        let again = TreeLayout::build(Some(&tree_from_json(&json)), &config);
        assert_eq!(first, again);
    }
}

#[test]
fn test_orphan_free_tree_skips_invalid_children() {
    let tree = tree_from_json(
        r#"{"id":"r","name":"root","status":"in_progress","children":[
            {"name":"no id","status":"pending"},
            {"id":"c","name":"c","status":"bogus","children":"nope"}
        ]}"#,
    );
    let layout = TreeLayout::build(Some(&tree), &LayoutConfig::default());
    assert_eq!(layout.focus_order(), vec!["r".to_string(), "c".to_string()]);
    assert_eq!(layout.edges.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Task Layout
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_reference_queue_layout() {
    let layout = TaskLayout::build(&reference_queue(), &LayoutConfig::default());

    let t1 = layout.node("T1").unwrap();
    let t2 = layout.node("T2").unwrap();
    assert_eq!(t1.column, TaskColumn::Pending);
    assert_eq!(t2.column, TaskColumn::InProgress);
    assert!(t2.position.x > t1.position.x);

    assert_eq!(layout.edges.len(), 1);
    let edge = &layout.edges[0];
    assert_eq!((edge.source.as_str(), edge.target.as_str()), ("T1", "T2"));
    assert!(edge.animated);
    assert_eq!(edge.style, EdgeStyle::Active);
}

#[test]
fn test_task_payload_layout_orders_and_flags() {
    let queue = queue_from_json(
        r#"{
            "pending": [
                {"id":"low","status":"pending","priority":1,"created_at":"2026-01-01T00:00:00Z"},
                {"id":"high-new","status":"pending","priority":4,"created_at":"2026-01-03T00:00:00Z"},
                {"id":"high-old","status":"pending","priority":4,"created_at":"2026-01-02T00:00:00Z"},
                {"id":"after-fail","status":"pending","dependencies":["broken","ghost"]}
            ],
            "failed": [{"id":"broken","status":"failed"}],
            "completed": [{"description":"missing id","status":"completed"}]
        }"#,
    );
    let layout = TaskLayout::build(&queue, &LayoutConfig::default());

    let pending: Vec<&str> = layout
        .column(TaskColumn::Pending)
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(pending, vec!["high-old", "high-new", "after-fail", "low"]);
    assert_eq!(layout.column(TaskColumn::Failed).count(), 1);
    assert_eq!(layout.column(TaskColumn::Completed).count(), 0);

    assert_eq!(layout.dangling, 1);
    assert_eq!(layout.edges.len(), 1);
    assert_eq!(layout.edges[0].style, EdgeStyle::Failed);
    assert!(!layout.edges[0].animated);
}

#[test]
fn test_violating_task_is_flagged_blocked() {
    let queue = queue_from_json(
        r#"{
            "pending": [{"id":"dep","status":"pending"}],
            "completed": [{"id":"done-too-early","status":"completed","dependencies":["dep"]}]
        }"#,
    );
    let layout = TaskLayout::build(&queue, &LayoutConfig::default());
    let node = layout.node("done-too-early").unwrap();
    assert_eq!(node.column, TaskColumn::Completed);
    assert!(node.blocked);
    assert_eq!(node.effective_status, TaskStatus::Blocked);
}
