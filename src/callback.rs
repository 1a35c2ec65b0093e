//! Fan-out of terminal results to caller-registered webhook sinks (spec §4.3).

use crate::job::{CallbackSink, JobId};
use crate::result::JobResult;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Wire payload delivered to a sink. Never carries private inputs or raw
/// proof bytes unless the sink explicitly opted in (spec §4.3, §6).
#[derive(Debug, Serialize)]
struct CallbackPayload {
    job_id: JobId,
    status: crate::job::JobStatus,
    proof: Option<crate::proof::ProofSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proof_bytes: Option<String>,
    error: Option<String>,
    worker_id: String,
    #[serde(with = "humantime_serde")]
    duration: Duration,
    completed_at: chrono::DateTime<chrono::Utc>,
    metadata: HashMap<String, String>,
}

impl CallbackPayload {
    fn from_result(result: &JobResult, proof_type: &str, include_raw_proof: bool) -> Self {
        Self {
            job_id: result.job_id,
            status: result.status,
            proof: result.proof.as_ref().map(|p| p.summary(proof_type)),
            proof_bytes: if include_raw_proof {
                result.proof.as_ref().map(|p| hex::encode(&p.proof_bytes))
            } else {
                None
            },
            error: result.error.clone(),
            worker_id: result.worker_id.clone(),
            duration: result.duration,
            completed_at: result.completed_at,
            metadata: result.metadata.clone(),
        }
    }
}

/// Delivers a [`JobResult`] to the sinks the caller registered on its job,
/// each with its own independent retry counter and exponential backoff.
pub struct CallbackDispatcher {
    client: reqwest::Client,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Deliver `result` to every sink in `sinks`, concurrently and
    /// independently. Each sink retries up to its own `retry_cap` with
    /// backoff `2^(attempt - 1)` seconds, clamped at five minutes. `sinks`
    /// is the job's own `callbacks` list, passed by the caller rather than
    /// looked up internally, so a sink is delivered to exactly once per
    /// terminal result regardless of when the caller learns about it.
    pub async fn dispatch(self: &Arc<Self>, sinks: Vec<CallbackSink>, result: JobResult, proof_type: String) {
        if sinks.is_empty() {
            return;
        }
        let result = Arc::new(result);
        let proof_type = Arc::new(proof_type);
        let mut handles = Vec::with_capacity(sinks.len());
        for sink in sinks {
            let dispatcher = self.clone();
            let result = result.clone();
            let proof_type = proof_type.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.deliver_with_retry(&sink, &result, &proof_type).await
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn deliver_with_retry(&self, sink: &CallbackSink, result: &JobResult, proof_type: &str) {
        let payload = CallbackPayload::from_result(result, proof_type, sink.include_raw_proof);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.deliver_once(sink, &payload).await {
                Ok(()) => {
                    debug!(job_id = %result.job_id, sink = %sink.address, attempt, "callback delivered");
                    return;
                }
                Err(err) => {
                    if attempt > sink.retry_cap {
                        warn!(
                            job_id = %result.job_id,
                            sink = %sink.address,
                            attempt,
                            error = %err,
                            "callback delivery exhausted retries"
                        );
                        return;
                    }
                    let backoff = Duration::from_secs(1u64 << (attempt - 1).min(9)).min(MAX_BACKOFF);
                    warn!(
                        job_id = %result.job_id,
                        sink = %sink.address,
                        attempt,
                        error = %err,
                        backoff_secs = backoff.as_secs(),
                        "callback delivery failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn deliver_once(&self, sink: &CallbackSink, payload: &CallbackPayload) -> Result<(), String> {
        let mut request = self
            .client
            .post(&sink.address)
            .timeout(sink.timeout)
            .json(payload);
        for (key, value) in &sink.headers {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("non-2xx response: {}", response.status()))
        }
    }
}

impl Default for CallbackDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
