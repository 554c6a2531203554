//! Focused node/task for the details pane.
//!
//! Selection is keyed by domain id, so it survives snapshot replacement as
//! long as the id is still present. It never touches sync state.

use serde::Serialize;

use crate::bus::View;
use crate::model::{NodeDetail, Task, TaskQueue, TreeNode};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionController {
    tree: Option<String>,
    task: Option<String>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused(&self, view: View) -> Option<&str> {
        match view {
            View::Tree => self.tree.as_deref(),
            View::Tasks => self.task.as_deref(),
        }
    }

    fn slot(&mut self, view: View) -> &mut Option<String> {
        match view {
            View::Tree => &mut self.tree,
            View::Tasks => &mut self.task,
        }
    }

    pub fn focus(&mut self, view: View, id: &str) {
        *self.slot(view) = Some(id.to_string());
    }

    pub fn clear(&mut self, view: View) {
        *self.slot(view) = None;
    }

    pub fn clear_all(&mut self) {
        self.tree = None;
        self.task = None;
    }

    /// Move focus `step` places through `order`, wrapping around.
    ///
    /// With nothing focused, a forward step lands on the first id and a
    /// backward step on the last.
    pub fn step(&mut self, view: View, order: &[String], step: isize) -> Option<&str> {
        if order.is_empty() {
            self.clear(view);
            return None;
        }
        let len = order.len() as isize;
        let current = self
            .focused(view)
            .and_then(|id| order.iter().position(|o| o == id))
            .map(|i| i as isize);
        let next = match current {
            Some(i) => (i + step).rem_euclid(len),
            None if step >= 0 => 0,
            None => len - 1,
        };
        *self.slot(view) = Some(order[next as usize].clone());
        self.focused(view)
    }

    /// Drop focus whose id vanished from the new snapshot.
    pub fn reconcile(&mut self, view: View, order: &[String]) {
        let slot = self.slot(view);
        if slot.as_ref().is_some_and(|id| !order.contains(id)) {
            *slot = None;
        }
    }

    pub fn tree_detail(&self, tree: Option<&TreeNode>) -> Option<NodeDetail> {
        NodeDetail::from_tree(tree?, self.tree.as_deref()?)
    }

    pub fn task_detail<'a>(&self, queue: Option<&'a TaskQueue>) -> Option<&'a Task> {
        queue?.get(self.task.as_deref()?)
    }
}
