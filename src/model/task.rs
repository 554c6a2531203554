//! Task queue snapshot types.
//!
//! The queue endpoint groups tasks by status; [`TaskQueue`] flattens the
//! groups into one deduplicated list that the layout engine consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;

use super::lenient::{lenient, lenient_ids, lenient_seq, lenient_timestamp};
use crate::clog_debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
    #[default]
    Unknown,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => TaskStatus::Pending,
            "in_progress" => TaskStatus::InProgress,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "blocked" => TaskStatus::Blocked,
            _ => TaskStatus::Unknown,
        }
    }

    /// Statuses that claim the task's dependencies are already satisfied.
    pub fn requires_satisfied_dependencies(&self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::Completed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Self::parse(&String::deserialize(d)?))
    }
}

/// Task priority, 1 (low) to 4 (critical). Out-of-range values become `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub fn from_level(level: i64) -> Self {
        match level {
            1 => Priority::Low,
            2 => Priority::Medium,
            3 => Priority::High,
            4 => Priority::Critical,
            _ => Priority::Medium,
        }
    }

    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(self.level())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(d)?;
        let level = match &value {
            Value::Number(n) => n.as_i64().unwrap_or(0),
            Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        Ok(Self::from_level(level))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, deserialize_with = "lenient")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient")]
    pub instructions: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "lenient_ids")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub estimated_duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub actual_duration: Option<f64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub retry_count: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub max_retries: u32,
}

impl Task {
    pub fn new(id: &str, description: &str, status: TaskStatus) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            status,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Result rendered as display text.
    pub fn result_text(&self) -> Option<String> {
        match self.result.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Repair fields that contradict the task's own invariants.
    ///
    /// Retries are clamped to `max_retries`, timestamps that run backwards are
    /// dropped, and `result`/`error_message` only survive on completed/failed.
    pub fn sanitize(&mut self) {
        if self.max_retries > 0 && self.retry_count > self.max_retries {
            self.retry_count = self.max_retries;
        }
        if let (Some(created), Some(started)) = (self.created_at, self.started_at) {
            if started < created {
                self.started_at = None;
            }
        }
        let floor = self.started_at.or(self.created_at);
        if let (Some(floor), Some(done)) = (floor, self.completed_at) {
            if done < floor {
                self.completed_at = None;
            }
        }
        if self.status != TaskStatus::Completed {
            self.result = None;
        }
        if self.status != TaskStatus::Failed {
            self.error_message = None;
        }
    }
}

/// Queue statistics as reported by the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskStats {
    #[serde(default, deserialize_with = "lenient")]
    pub total_tasks: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub pending_tasks: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub completed_tasks: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub failed_tasks: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub in_progress_tasks: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub completion_rate: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub average_duration_minutes: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub available_tasks: usize,
}

/// Raw `/tasks` payload, grouped by status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskListPayload {
    #[serde(default, deserialize_with = "lenient_seq")]
    pub pending: Vec<Task>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub in_progress: Vec<Task>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub completed: Vec<Task>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub failed: Vec<Task>,
    #[serde(default, deserialize_with = "lenient")]
    pub stats: TaskStats,
}

/// Flattened task snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TaskQueue {
    pub tasks: Vec<Task>,
    pub stats: TaskStats,
}

impl TaskQueue {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            stats: TaskStats::default(),
        }
    }

    /// Flatten the grouped payload, dropping tasks without an id and
    /// keeping the first occurrence of a repeated id.
    pub fn from_payload(payload: TaskListPayload) -> Self {
        let TaskListPayload {
            pending,
            in_progress,
            completed,
            failed,
            stats,
        } = payload;

        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for mut task in pending
            .into_iter()
            .chain(in_progress)
            .chain(completed)
            .chain(failed)
        {
            if !task.is_valid() {
                clog_debug!("TaskQueue: skipping task without id");
                continue;
            }
            if !seen.insert(task.id.clone()) {
                clog_debug!("TaskQueue: skipping duplicate task id={}", task.id);
                continue;
            }
            task.sanitize();
            tasks.push(task);
        }
        Self { tasks, stats }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}
