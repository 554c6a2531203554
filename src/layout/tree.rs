//! Tree view layout.
//!
//! Depth maps to x; siblings are centered vertically around their parent.

use std::collections::HashSet;

use serde::Serialize;

use super::{Bounds, EdgeStyle, LayoutEdge, Position};
use crate::config::LayoutConfig;
use crate::model::{NodeStatus, TreeNode};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeLayoutNode {
    /// Synthetic id assigned in pre-order (`node-0`, `node-1`, …).
    pub layout_id: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: NodeStatus,
    pub depth: usize,
    pub child_count: usize,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TreeLayout {
    pub nodes: Vec<TreeLayoutNode>,
    pub edges: Vec<LayoutEdge>,
}

/// Renderable part of a snapshot: invalid nodes and repeated ids pruned
/// in the same pre-order as [`TreeNode::walk`].
struct Pruned<'a> {
    node: &'a TreeNode,
    children: Vec<Pruned<'a>>,
}

fn prune<'a>(node: &'a TreeNode, seen: &mut HashSet<&'a str>) -> Option<Pruned<'a>> {
    if !node.is_valid() || !seen.insert(node.id.as_str()) {
        return None;
    }
    let children = node
        .children
        .iter()
        .filter_map(|child| prune(child, seen))
        .collect();
    Some(Pruned { node, children })
}

impl TreeLayout {
    pub fn build(tree: Option<&TreeNode>, config: &LayoutConfig) -> Self {
        let mut layout = TreeLayout::default();
        let Some(root) = tree.and_then(|t| prune(t, &mut HashSet::new())) else {
            return layout;
        };
        layout.place(&root, 0, 0.0, None, config);
        layout
    }

    fn place(
        &mut self,
        pruned: &Pruned<'_>,
        depth: usize,
        y: f64,
        parent: Option<&str>,
        config: &LayoutConfig,
    ) {
        let layout_id = format!("node-{}", self.nodes.len());
        let node = pruned.node;
        self.nodes.push(TreeLayoutNode {
            layout_id: layout_id.clone(),
            id: node.id.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
            status: node.status,
            depth,
            child_count: pruned.children.len(),
            position: Position::new(depth as f64 * config.horizontal_spacing, y),
        });

        if let Some(parent) = parent {
            self.edges.push(LayoutEdge {
                id: format!("edge-{}-{}", parent, layout_id),
                source: parent.to_string(),
                target: layout_id.clone(),
                animated: node.status == NodeStatus::InProgress,
                style: EdgeStyle::Structural,
            });
        }

        let n = pruned.children.len();
        if n == 0 {
            return;
        }
        let start_y = y - (n - 1) as f64 * config.child_spacing / 2.0;
        for (i, child) in pruned.children.iter().enumerate() {
            let child_y = start_y + i as f64 * config.child_spacing;
            self.place(child, depth + 1, child_y, Some(&layout_id), config);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, layout_id: &str) -> Option<&TreeLayoutNode> {
        self.nodes.iter().find(|n| n.layout_id == layout_id)
    }

    /// Look up by domain id.
    pub fn find(&self, id: &str) -> Option<&TreeLayoutNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::of(self.nodes.iter().map(|n| n.position))
    }

    /// Domain ids in layout order, used for keyboard focus cycling.
    pub fn focus_order(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }
}
