//! Analysis jobs and their lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lenient::{lenient, lenient_seq};
use crate::{Error, Result};

/// Opaque job identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters for compact display.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle: `pending → running → {completed, failed}`.
///
/// `pending → failed` is also allowed (a job can be rejected before it starts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    #[serde(alias = "error")]
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    /// Same status, one transition, or `pending → running → to`.
    pub fn can_reach(&self, to: JobStatus) -> bool {
        *self == to
            || self.can_transition_to(to)
            || (self.can_transition_to(JobStatus::Running)
                && JobStatus::Running.can_transition_to(to))
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    #[serde(default, deserialize_with = "lenient")]
    pub total_nodes_created: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub analysis_depth: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub tasks_completed: usize,
    #[serde(default, deserialize_with = "lenient")]
    pub tasks_failed: usize,
}

/// Final report produced by the backend once a job completes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(default, deserialize_with = "lenient")]
    pub conclusion: String,
    #[serde(default, deserialize_with = "lenient")]
    pub case_status: String,
    #[serde(default, deserialize_with = "lenient")]
    pub investigation_confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub analysis_metrics: AnalysisMetrics,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub key_findings: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub next_steps: Vec<String>,
}

impl JobSummary {
    /// Finding headlines; findings are either plain strings or `{title, ...}` objects.
    pub fn finding_titles(&self) -> Vec<String> {
        self.key_findings
            .iter()
            .filter_map(|f| match f {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

/// Response of the summary probe. A missing summary means "not complete yet".
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SummaryResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub summary: Option<JobSummary>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub error: Option<String>,
}

impl SummaryResponse {
    pub fn reports_failure(&self) -> bool {
        matches!(self.status.as_deref(), Some("failed") | Some("error"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Set only once the job reaches a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Present only when completed.
    pub summary: Option<JobSummary>,
    /// Present only when failed.
    pub error: Option<String>,
}

impl Job {
    pub fn new(id: impl Into<String>, name: &str) -> Self {
        Self {
            id: JobId::new(id),
            name: name.to_string(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            summary: None,
            error: None,
        }
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    fn transition(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidJobTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)
    }

    pub fn complete(&mut self, summary: JobSummary, at: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.completed_at = Some(at);
        self.summary = Some(summary);
        Ok(())
    }

    pub fn fail(&mut self, error: &str, at: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.completed_at = Some(at);
        self.error = Some(error.to_string());
        Ok(())
    }

    /// Fold a newer record of the same job into this one.
    ///
    /// The status only moves forward. A record that would move it back is
    /// rejected, but its name is still taken. Outcome fields the incoming
    /// record lacks are kept, and so is the original `created_at`.
    pub fn merge(&mut self, incoming: Job) -> Result<()> {
        let Job {
            name,
            status,
            completed_at,
            summary,
            error,
            ..
        } = incoming;
        if !name.is_empty() {
            self.name = name;
        }
        if !self.status.can_reach(status) {
            return Err(Error::InvalidJobTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.completed_at = completed_at.or(self.completed_at.take());
        self.summary = summary.or(self.summary.take());
        self.error = error.or(self.error.take());
        Ok(())
    }
}
