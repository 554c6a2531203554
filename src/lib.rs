pub mod config;
pub mod error;
pub mod log;
pub mod util;

// Mirrored backend state
pub mod bus;
pub mod layout;
pub mod lifecycle;
pub mod model;
pub mod remote;
pub mod selection;
pub mod sync;

// Decoupled game loop architecture
pub mod actors;
pub mod app;
pub mod render;
pub mod tea;
pub mod ui;

pub use error::{Error, Result};

/// Render loop properties: frame pacing, ordered snapshots and cheap clones.
#[cfg(test)]
mod architecture_tests {
    use crate::config::{Config, LayoutConfig};
    use crate::layout::TreeLayout;
    use crate::model::{NodeStatus, TreeNode};
    use crate::render::{RenderState, FRAME_DURATION};
    use crate::tea::Model;
    use std::sync::Arc;
    use std::time::Instant;

    fn wide_tree(children: usize) -> TreeNode {
        TreeNode::new("root", "root", NodeStatus::InProgress).with_children(
            (0..children)
                .map(|i| {
                    TreeNode::new(&format!("n{}", i), &format!("node {}", i), NodeStatus::Pending)
                })
                .collect(),
        )
    }

    #[test]
    fn test_frame_duration_is_60fps() {
        let fps = 1.0 / FRAME_DURATION.as_secs_f64();
        assert!((fps - 60.0).abs() < 0.1, "render loop runs at {:.2} fps", fps);
    }

    /// The render thread relies on versions to skip redraws.
    #[test]
    fn test_model_snapshots_are_versioned_in_order() {
        let model = Model::new(Config::default());
        let mut prev = model.snapshot().version;
        for _ in 0..100 {
            let version = model.snapshot().version;
            assert!(version > prev, "version {} should be > {}", version, prev);
            prev = version;
        }
    }

    /// Snapshots of a large tree share the layout rather than copying it.
    #[test]
    fn test_render_state_clone_shares_layout() {
        let layout = Arc::new(TreeLayout::build(
            Some(&wide_tree(2000)),
            &LayoutConfig::default(),
        ));
        let state = RenderState {
            tree: Arc::clone(&layout),
            ..Default::default()
        };

        let start = Instant::now();
        for _ in 0..1000 {
            let cloned = state.clone();
            assert!(Arc::ptr_eq(&cloned.tree, &layout));
        }
        assert!(
            start.elapsed().as_millis() < 100,
            "Cloning 1000 states should not copy the layout"
        );
    }
}
