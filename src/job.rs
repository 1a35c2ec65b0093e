//! The scheduled unit (spec §3 "Job") and its supporting types.

use crate::error::{EngineError, EngineResult};
use crate::request::ProofRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Opaque job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(#[serde(with = "uuid::serde::compact")] pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> EngineResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| EngineError::Validation(format!("invalid job id: {}", e)))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state (spec §3). Status progresses monotonically except
/// for the Pending<->Retrying cycle during backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Where a terminal result should be fanned out to (spec §3 "Callback registry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackSink {
    pub kind: CallbackKind,
    pub address: String,
    pub timeout: Duration,
    pub retry_cap: u32,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// If true, the payload includes the raw proof bytes (spec §4.3's
    /// explicit opt-in). Defaults to false: only the summary is sent.
    #[serde(default)]
    pub include_raw_proof: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackKind {
    Webhook,
}

/// The scheduled unit carrying one proof request and its orchestration
/// state (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub priority: i32,
    pub status: JobStatus,
    pub request: ProofRequest,
    pub retry_count: u32,
    pub retry_cap: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Soft timeout applied to a single dispatch attempt. Zero means "use
    /// the pool's configured worker timeout".
    pub timeout: Duration,
    pub metadata: HashMap<String, String>,
    pub callbacks: Vec<CallbackSink>,
    pub assigned_worker: Option<String>,
    pub last_error: Option<String>,
}

/// Metadata key the scheduler stores a delayed job's due duration under.
pub const RETRY_AFTER_KEY: &str = "retry_after_secs";

impl Job {
    pub fn new(request: ProofRequest, job_type: impl Into<String>, priority: i32) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            priority,
            status: JobStatus::Pending,
            request,
            retry_count: 0,
            retry_cap: 3,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            timeout: Duration::from_secs(0),
            metadata: HashMap::new(),
            callbacks: Vec::new(),
            assigned_worker: None,
            last_error: None,
        }
    }

    /// Mark the job dispatched to `worker_id`, transitioning to Running.
    /// `started_at` is set exactly once, on the first successful dispatch.
    pub fn mark_running(&mut self, worker_id: impl Into<String>) {
        self.status = JobStatus::Running;
        self.assigned_worker = Some(worker_id.into());
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Reset for a retry: back to Pending, clearing the per-attempt fields
    /// set by [`Job::mark_running`] and bumping the retry counter.
    pub fn prepare_retry(&mut self) {
        self.retry_count += 1;
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.assigned_worker = None;
        self.metadata.remove(RETRY_AFTER_KEY);
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.metadata
            .get(RETRY_AFTER_KEY)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    pub fn set_retry_after(&mut self, delay: Duration) {
        self.metadata
            .insert(RETRY_AFTER_KEY.to_string(), delay.as_secs().to_string());
    }

    /// Finalize with a terminal status. A job already Cancelled never
    /// moves to another terminal status (spec §5 cancellation guarantee).
    pub fn finalize(&mut self, status: JobStatus, error: Option<String>) {
        if self.status == JobStatus::Cancelled {
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.last_error = error;
    }
}

/// Ordering key used by the priority queue: priority descending, then
/// creation time ascending (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOrderKey {
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for QueueOrderKey {
    fn from(job: &Job) -> Self {
        Self {
            priority: job.priority,
            created_at: job.created_at,
        }
    }
}

impl PartialOrd for QueueOrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueOrderKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority sorts first; ties broken by earlier creation.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
    }
}
