//! Analysis tree snapshot types.
//!
//! A snapshot is one strictly rooted tree: every node owns its children and
//! there are no shared references or back-edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};

use super::lenient::{lenient, lenient_seq, lenient_timestamp};
use super::task::TaskStats;

/// Status of a tree node.
///
/// Unrecognised values decode to `Unknown` instead of failing the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum NodeStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    #[default]
    Unknown,
}

impl NodeStatus {
    pub const KNOWN: [NodeStatus; 4] = [
        NodeStatus::Pending,
        NodeStatus::InProgress,
        NodeStatus::Completed,
        NodeStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::InProgress => "in_progress",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => NodeStatus::Pending,
            "in_progress" => NodeStatus::InProgress,
            "completed" => NodeStatus::Completed,
            "failed" => NodeStatus::Failed,
            _ => NodeStatus::Unknown,
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Self::parse(&String::deserialize(d)?))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default, deserialize_with = "lenient")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient")]
    pub status: NodeStatus,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(id: &str, name: &str, status: NodeStatus) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status,
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    /// A node without an id cannot be addressed and is ignored with its subtree.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }

    /// Walk the renderable part of the tree in pre-order.
    ///
    /// Invalid nodes and repeated ids are skipped together with their
    /// subtrees, so every visited non-root node has exactly one parent.
    /// The callback receives `(node, depth, parent_id)`.
    pub fn walk<'a, F>(&'a self, mut f: F)
    where
        F: FnMut(&'a TreeNode, usize, Option<&'a str>),
    {
        if !self.is_valid() {
            return;
        }
        let mut seen: HashSet<&'a str> = HashSet::new();
        let mut stack: Vec<(&'a TreeNode, usize, Option<&'a str>)> = vec![(self, 0, None)];
        while let Some((node, depth, parent)) = stack.pop() {
            if !node.is_valid() || !seen.insert(node.id.as_str()) {
                continue;
            }
            f(node, depth, parent);
            for child in node.children.iter().rev() {
                stack.push((child, depth + 1, Some(node.id.as_str())));
            }
        }
    }

    /// Number of renderable nodes.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(|_, _, _| count += 1);
        count
    }

    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        let mut found = None;
        self.walk(|node, _, _| {
            if found.is_none() && node.id == id {
                found = Some(node);
            }
        });
        found
    }

    /// Nodes from the root down to `id`, inclusive.
    pub fn path_to(&self, id: &str) -> Option<Vec<&TreeNode>> {
        fn descend<'a>(node: &'a TreeNode, id: &str, path: &mut Vec<&'a TreeNode>) -> bool {
            if !node.is_valid() {
                return false;
            }
            path.push(node);
            if node.id == id {
                return true;
            }
            for child in &node.children {
                if descend(child, id, path) {
                    return true;
                }
            }
            path.pop();
            false
        }

        let mut path = Vec::new();
        descend(self, id, &mut path).then_some(path)
    }

    /// Statistics computed locally, used when the stats endpoint has nothing.
    pub fn compute_stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        let mut child_total = 0usize;
        let mut internal = 0usize;
        let mut leaves = 0usize;
        self.walk(|node, depth, _| {
            stats.total_nodes += 1;
            stats.max_depth = stats.max_depth.max(depth);
            *stats
                .nodes_by_status
                .entry(node.status.as_str().to_string())
                .or_insert(0) += 1;
            let valid_children = node.children.iter().filter(|c| c.is_valid()).count();
            if valid_children == 0 {
                leaves += 1;
            } else {
                internal += 1;
                child_total += valid_children;
            }
        });
        stats.root_children = Some(self.children.iter().filter(|c| c.is_valid()).count());
        stats.leaf_nodes = Some(leaves);
        stats.average_children = Some(if internal == 0 {
            0.0
        } else {
            child_total as f64 / internal as f64
        });
        stats
    }
}

/// Payload of the tree statistics endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreeStats {
    #[serde(default, deserialize_with = "lenient")]
    pub total_nodes: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub max_depth: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub nodes_by_status: BTreeMap<String, usize>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub root_children: Option<usize>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub leaf_nodes: Option<usize>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub average_children: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub task_stats: Option<TaskStats>,
}

impl TreeStats {
    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes_by_status
            .get(status.as_str())
            .copied()
            .unwrap_or(0)
    }
}

/// A node plus its position in the tree, as shown in the details pane.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeDetail {
    #[serde(flatten)]
    pub node: TreeNode,
    #[serde(default, deserialize_with = "lenient")]
    pub siblings_count: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub depth_from_root: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub has_children: bool,
}

impl NodeDetail {
    /// Derive the detail locally from a snapshot. Children are not copied.
    pub fn from_tree(root: &TreeNode, id: &str) -> Option<Self> {
        let path = root.path_to(id)?;
        let node = *path.last()?;
        let siblings_count = match path.len().checked_sub(2) {
            Some(parent_idx) => path[parent_idx]
                .children
                .iter()
                .filter(|c| c.is_valid() && c.id != node.id)
                .count(),
            None => 0,
        };
        Some(Self {
            node: TreeNode {
                children: Vec::new(),
                ..node.clone()
            },
            siblings_count,
            depth_from_root: path.len() - 1,
            has_children: node.children.iter().any(TreeNode::is_valid),
        })
    }
}
