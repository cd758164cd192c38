//! Job queue data model (§3, §4.A).

use crate::ids::JobId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Retry,
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Retry => "retry",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// States eligible for dequeue (§4.A).
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Created | Self::Retry)
    }
}

/// Options controlling how a job is enqueued (§4.A).
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub priority: i32,
    pub retry_limit: u32,
    pub retry_delay: Duration,
    pub retry_backoff: bool,
    pub expire_in: Duration,
    pub singleton_key: Option<String>,
    pub delay: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            retry_limit: 3,
            retry_delay: Duration::from_secs(30),
            retry_backoff: false,
            expire_in: Duration::from_secs(3600),
            singleton_key: None,
            delay: Duration::ZERO,
        }
    }
}

/// The envelope every stage job payload carries, regardless of job kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub document_id: uuid::Uuid,
    pub deal_id: Option<uuid::Uuid>,
    pub organization_id: Option<uuid::Uuid>,
    pub user_id: Option<uuid::Uuid>,
    #[serde(default)]
    pub is_retry: bool,
    pub last_completed_stage: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A durable job record (§3, §4.A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: String,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub priority: i32,
    pub retry_count: u32,
    pub retry_limit: u32,
    pub retry_delay: Duration,
    pub retry_backoff: bool,
    pub start_after: chrono::DateTime<chrono::Utc>,
    pub expire_in: Duration,
    pub singleton_key: Option<String>,
    pub created_on: chrono::DateTime<chrono::Utc>,
    pub started_on: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_on: Option<chrono::DateTime<chrono::Utc>>,
    pub output: Option<serde_json::Value>,
}

impl Job {
    /// Invariant (§4.A): active jobs have a start time, completed/failed jobs
    /// have a completion time, and retry-count never exceeds retry-limit.
    pub fn satisfies_invariants(&self) -> bool {
        let started_ok = self.state != JobState::Active || self.started_on.is_some();
        let completed_ok = !matches!(self.state, JobState::Completed | JobState::Failed)
            || self.completed_on.is_some();
        let retry_ok = self.retry_count <= self.retry_limit;
        started_ok && completed_ok && retry_ok
    }

    /// Delay for the next retry attempt: `base * 2^retry_count` when backoff
    /// is enabled, else a flat `base` delay (§4.A).
    pub fn next_retry_delay(&self) -> Duration {
        if self.retry_backoff {
            let factor = 2u32.saturating_pow(self.retry_count);
            self.retry_delay.saturating_mul(factor)
        } else {
            self.retry_delay
        }
    }
}

/// Well-known job kinds for the staged pipeline (§4.B).
pub mod kinds {
    pub const PARSE: &str = "parse";
    pub const EMBED: &str = "embed";
    pub const GRAPH_INGEST: &str = "graph-ingest";
    pub const ANALYZE: &str = "analyze";
    pub const EXTRACT_FINANCIALS: &str = "extract-financials";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(state: JobState, retry_count: u32, retry_limit: u32) -> Job {
        Job {
            id: JobId::new(),
            kind: "parse".into(),
            payload: serde_json::json!({}),
            state,
            priority: 0,
            retry_count,
            retry_limit,
            retry_delay: Duration::from_secs(1),
            retry_backoff: true,
            start_after: chrono::Utc::now(),
            expire_in: Duration::from_secs(3600),
            singleton_key: None,
            created_on: chrono::Utc::now(),
            started_on: None,
            completed_on: None,
            output: None,
        }
    }

    #[test]
    fn active_without_started_on_violates_invariant() {
        assert!(!job(JobState::Active, 0, 3).satisfies_invariants());
    }

    #[test]
    fn completed_without_completed_on_violates_invariant() {
        assert!(!job(JobState::Completed, 0, 3).satisfies_invariants());
    }

    #[test]
    fn retry_count_over_limit_violates_invariant() {
        assert!(!job(JobState::Created, 4, 3).satisfies_invariants());
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let mut j = job(JobState::Retry, 0, 3);
        assert_eq!(j.next_retry_delay(), Duration::from_secs(1));
        j.retry_count = 1;
        assert_eq!(j.next_retry_delay(), Duration::from_secs(2));
        j.retry_count = 2;
        assert_eq!(j.next_retry_delay(), Duration::from_secs(4));
    }

    #[test]
    fn no_backoff_is_flat() {
        let mut j = job(JobState::Retry, 2, 3);
        j.retry_backoff = false;
        assert_eq!(j.next_retry_delay(), Duration::from_secs(1));
    }
}
