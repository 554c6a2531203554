//! Deterministic graph layouts for the tree and task views.
//!
//! Both engines are pure: the same snapshot always yields the same nodes,
//! positions and edges. Coordinates are canvas units; the renderer scales
//! them to the terminal.

pub mod task;
pub mod tree;

use serde::Serialize;

pub use task::{TaskColumn, TaskLayout, TaskLayoutNode};
pub use tree::{TreeLayout, TreeLayoutNode};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How an edge should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStyle {
    /// Plain parent→child link.
    #[default]
    Structural,
    /// Dependency still waiting on its source.
    Waiting,
    /// Dependent is in progress.
    Active,
    /// Completed source feeding a pending task.
    Satisfied,
    /// Source task failed.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub animated: bool,
    pub style: EdgeStyle,
}

/// Axis-aligned extent of a set of positions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub min: Position,
    pub max: Position,
}

impl Bounds {
    pub fn of(points: impl IntoIterator<Item = Position>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(
            Bounds {
                min: first,
                max: first,
            },
            |b, p| Bounds {
                min: Position::new(b.min.x.min(p.x), b.min.y.min(p.y)),
                max: Position::new(b.max.x.max(p.x), b.max.y.max(p.y)),
            },
        ))
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Grow by `margin` on every side.
    pub fn padded(&self, margin: f64) -> Self {
        Bounds {
            min: Position::new(self.min.x - margin, self.min.y - margin),
            max: Position::new(self.max.x + margin, self.max.y + margin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_of_points() {
        let b = Bounds::of([
            Position::new(0.0, 75.0),
            Position::new(300.0, -75.0),
            Position::new(150.0, 0.0),
        ])
        .unwrap();
        assert_eq!(b.min, Position::new(0.0, -75.0));
        assert_eq!(b.max, Position::new(300.0, 75.0));
        assert_eq!(b.width(), 300.0);
        assert_eq!(b.padded(10.0).height(), 170.0);
    }

    #[test]
    fn test_bounds_of_nothing() {
        assert!(Bounds::of(std::iter::empty()).is_none());
    }
}
