//! Fire-and-forget telemetry for job and worker lifecycle transitions
//! (spec §2's "Event emitter" table entry), grounded on the teacher's
//! `EventSidecar` channel-publish pattern: emission never blocks the
//! caller and never fails the operation it's reporting on.

use crate::job::{JobId, JobStatus};
use tracing::info;

/// A lifecycle event worth observing from outside the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    JobEnqueued { job_id: JobId, proof_type: String, priority: i32 },
    JobStarted { job_id: JobId, worker_id: String },
    JobCompleted { job_id: JobId, status: JobStatus, duration_ms: u128 },
    JobRetryScheduled { job_id: JobId, retry_count: u32, delay_secs: u64 },
    WorkerStarted { worker_id: String },
    WorkerStopped { worker_id: String },
    PoolScaled { from: usize, to: usize, reason: &'static str },
    CallbackDelivered { job_id: JobId, sink: String },
    CallbackFailed { job_id: JobId, sink: String, attempt: u32 },
}

/// Sink for engine events. Implementations must not block or panic; a
/// misbehaving emitter must never take down the orchestration loop it's
/// observing.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Default emitter: structures every event as a `tracing` record.
pub struct TracingEventEmitter;

impl EventEmitter for TracingEventEmitter {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::JobEnqueued { job_id, proof_type, priority } => {
                info!(%job_id, proof_type, priority, "job enqueued");
            }
            EngineEvent::JobStarted { job_id, worker_id } => {
                info!(%job_id, worker_id, "job started");
            }
            EngineEvent::JobCompleted { job_id, status, duration_ms } => {
                info!(%job_id, ?status, duration_ms, "job completed");
            }
            EngineEvent::JobRetryScheduled { job_id, retry_count, delay_secs } => {
                info!(%job_id, retry_count, delay_secs, "job retry scheduled");
            }
            EngineEvent::WorkerStarted { worker_id } => {
                info!(worker_id, "worker started");
            }
            EngineEvent::WorkerStopped { worker_id } => {
                info!(worker_id, "worker stopped");
            }
            EngineEvent::PoolScaled { from, to, reason } => {
                info!(from, to, reason, "pool scaled");
            }
            EngineEvent::CallbackDelivered { job_id, sink } => {
                info!(%job_id, sink, "callback delivered");
            }
            EngineEvent::CallbackFailed { job_id, sink, attempt } => {
                info!(%job_id, sink, attempt, "callback failed");
            }
        }
    }
}

/// Discards every event. Used by tests that don't want tracing noise.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: EngineEvent) {}
}
