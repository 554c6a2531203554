//! Snapshot data types mirrored from the backend.
//!
//! These types carry no sync behaviour; the coordinator replaces them
//! wholesale and the layout engines read them.

pub mod dag;
pub mod job;
pub mod lenient;
pub mod task;
pub mod tree;

pub use dag::TaskGraph;
pub use job::{AnalysisMetrics, Job, JobId, JobStatus, JobSummary, SummaryResponse};
pub use task::{Priority, Task, TaskListPayload, TaskQueue, TaskStats, TaskStatus};
pub use tree::{NodeDetail, NodeStatus, TreeNode, TreeStats};
