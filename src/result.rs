//! The terminal outcome of a job as produced by a worker (spec §3 "Result").

use crate::job::{JobId, JobStatus};
use crate::proof::ProofArtifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Paired with a [`crate::job::Job`] by identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub proof: Option<ProofArtifact>,
    pub error: Option<String>,
    pub duration: Duration,
    pub worker_id: String,
    pub completed_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl JobResult {
    pub fn success(
        job_id: JobId,
        proof: ProofArtifact,
        worker_id: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("proof_size".to_string(), proof.proof_bytes.len().to_string());
        Self {
            job_id,
            status: JobStatus::Completed,
            proof: Some(proof),
            error: None,
            duration,
            worker_id: worker_id.into(),
            completed_at: Utc::now(),
            metadata,
        }
    }

    pub fn failure(
        job_id: JobId,
        error: impl Into<String>,
        worker_id: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            proof: None,
            error: Some(error.into()),
            duration,
            worker_id: worker_id.into(),
            completed_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn cancelled(job_id: JobId, worker_id: impl Into<String>, duration: Duration) -> Self {
        Self {
            job_id,
            status: JobStatus::Cancelled,
            proof: None,
            error: Some("job cancelled".to_string()),
            duration,
            worker_id: worker_id.into(),
            completed_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}
