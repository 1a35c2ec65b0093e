//! Live, in-memory generation progress (spec §3 "Generation progress snapshot").

use crate::job::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live view of one in-flight generation. Exists only while the
/// associated sync or async generation is running; once it finishes, the
/// façade synthesizes a snapshot from the stored result instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub fraction: f32,
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(job_id: JobId, stage: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Running,
            fraction: 0.0,
            stage: stage.into(),
            started_at: now,
            updated_at: now,
            error: None,
        }
    }

    pub fn advance(&mut self, fraction: f32, stage: impl Into<String>) {
        self.fraction = fraction.clamp(0.0, 1.0);
        self.stage = stage.into();
        self.updated_at = Utc::now();
    }

    /// Synthesize a snapshot from a stored proof record's status when the
    /// live progress map has no entry (spec §4.7).
    pub fn synthesize(job_id: JobId, status: JobStatus, error: Option<String>) -> Self {
        let fraction = match status {
            JobStatus::Pending => 0.0,
            JobStatus::Running | JobStatus::Retrying => 0.5,
            JobStatus::Completed => 1.0,
            JobStatus::Failed | JobStatus::Cancelled => 0.0,
        };
        let now = Utc::now();
        Self {
            job_id,
            status,
            fraction,
            stage: format!("{:?}", status).to_lowercase(),
            started_at: now,
            updated_at: now,
            error,
        }
    }
}
