//! A single worker in the pool (spec §4.5): dequeues one job at a time,
//! runs it against the generator, and classifies the outcome for the
//! result loop to act on.

use crate::config::PoolConfig;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventEmitter};
use crate::generator::Generator;
use crate::job::{Job, JobId, JobStatus};
use crate::queue::SharedQueue;
use crate::result::JobResult;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome a worker reports for one dispatched job; the pool's result loop
/// turns this into queue/result-store/scheduler/callback actions.
pub enum WorkerOutcome {
    Finished { job: Job, result: JobResult },
    Retry { job: Job, delay: Duration, error: String },
    Cancelled { job: Job },
}

#[derive(Debug, Default)]
struct WorkerStatsInner {
    processed: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    total_duration_ms: AtomicU64,
}

/// Snapshot of a worker's cumulative processing stats (spec §4.7's
/// worker-stats surface).
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub mean_duration_ms: f64,
}

/// Shared registry letting the façade cancel one specific in-flight job
/// regardless of which worker picked it up.
pub type JobCancellations = Arc<DashMap<JobId, CancellationToken>>;

/// A pool worker. `start`/`stop` are idempotent: calling either twice, or
/// stopping a never-started worker, is a no-op.
pub struct Worker {
    pub id: String,
    queue: SharedQueue,
    generator: Arc<dyn Generator>,
    config: PoolConfig,
    events: Arc<dyn EventEmitter>,
    stats: Arc<WorkerStatsInner>,
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
    job_cancellations: JobCancellations,
    /// `Some(since)` while the worker has no job in hand; `None` while one
    /// is in flight. Backs the pool's idle-time scale-down gate (spec
    /// §4.6).
    idle_since: parking_lot::Mutex<Option<Instant>>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: SharedQueue,
        generator: Arc<dyn Generator>,
        config: PoolConfig,
        events: Arc<dyn EventEmitter>,
        job_cancellations: JobCancellations,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            generator,
            config,
            events,
            stats: Arc::new(WorkerStatsInner::default()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            job_cancellations,
            idle_since: parking_lot::Mutex::new(Some(Instant::now())),
        }
    }

    /// How long this worker has had no job in hand, or `None` if one is
    /// currently in flight.
    pub fn idle_for(&self) -> Option<Duration> {
        self.idle_since.lock().map(|since| since.elapsed())
    }

    pub fn stats(&self) -> WorkerStats {
        let processed = self.stats.processed.load(Ordering::Relaxed);
        let total_ms = self.stats.total_duration_ms.load(Ordering::Relaxed);
        WorkerStats {
            processed,
            successful: self.stats.successful.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            mean_duration_ms: if processed == 0 {
                0.0
            } else {
                total_ms as f64 / processed as f64
            },
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Dequeue and process jobs until `stop` is called. Each processed job
    /// is reported on `outcomes` for the pool's result loop to consume.
    /// Returns a handle that resolves once the worker has fully stopped,
    /// including finishing whatever job it was running when `stop` was
    /// called — callers that need to drain in-flight work should await it.
    pub fn start(self: &Arc<Self>, outcomes: mpsc::UnboundedSender<WorkerOutcome>) -> tokio::task::JoinHandle<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return tokio::spawn(async {});
        }
        self.events.emit(EngineEvent::WorkerStarted {
            worker_id: self.id.clone(),
        });
        let worker = self.clone();
        tokio::spawn(async move { worker.run_loop(outcomes).await })
    }

    /// Stop picking up new jobs and unpark an idle wait for one. This is a
    /// graceful stop: a job already in flight finishes naturally and is
    /// still reported on the outcome channel, since `stop` only cancels the
    /// worker's own dequeue-parking token, never a job's cancellation token
    /// (that's `job_cancellations`, cancelled only by an explicit
    /// per-job cancel request).
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        self.events.emit(EngineEvent::WorkerStopped {
            worker_id: self.id.clone(),
        });
    }

    async fn run_loop(self: Arc<Self>, outcomes: mpsc::UnboundedSender<WorkerOutcome>) {
        while self.running.load(Ordering::Acquire) {
            let job = match self.queue.dequeue(&self.shutdown).await {
                Ok(job) => job,
                Err(EngineError::Cancelled(_)) => break,
                Err(EngineError::Resource(_)) => break,
                Err(err) => {
                    warn!(worker_id = %self.id, error = %err, "unexpected dequeue error");
                    continue;
                }
            };
            *self.idle_since.lock() = None;
            let outcome = self.process(job).await;
            *self.idle_since.lock() = Some(Instant::now());
            if outcomes.send(outcome).is_err() {
                break;
            }
        }
    }

    async fn process(&self, mut job: Job) -> WorkerOutcome {
        job.mark_running(&self.id);
        self.events.emit(EngineEvent::JobStarted {
            job_id: job.id,
            worker_id: self.id.clone(),
        });

        let timeout = if job.timeout.is_zero() {
            self.config.worker_timeout
        } else {
            job.timeout
        };
        // Standalone, not a child of `self.shutdown`: a worker-wide stop
        // must drain the in-flight job rather than abort it. Only an
        // explicit per-job cancel (via `job_cancellations`) tears this down.
        let job_cancel = CancellationToken::new();
        self.job_cancellations.insert(job.id, job_cancel.clone());
        let started = Instant::now();

        let generated = tokio::select! {
            result = self.generator.generate(&job.request) => result,
            _ = tokio::time::sleep(timeout) => Err("timeout: job exceeded its dispatch timeout".to_string()),
            _ = job_cancel.cancelled() => {
                self.job_cancellations.remove(&job.id);
                return WorkerOutcome::Cancelled { job };
            }
        };
        self.job_cancellations.remove(&job.id);

        let duration = started.elapsed();
        self.record(duration, generated.is_ok());

        match generated {
            Ok(artifact) => {
                self.events.emit(EngineEvent::JobCompleted {
                    job_id: job.id,
                    status: JobStatus::Completed,
                    duration_ms: duration.as_millis(),
                });
                let result = JobResult::success(job.id, artifact, self.id.clone(), duration);
                WorkerOutcome::Finished { job, result }
            }
            Err(message) => self.classify_failure(job, message, duration),
        }
    }

    fn classify_failure(&self, job: Job, message: String, duration: Duration) -> WorkerOutcome {
        if EngineError::is_validation_message(&message) {
            self.events.emit(EngineEvent::JobCompleted {
                job_id: job.id,
                status: JobStatus::Failed,
                duration_ms: duration.as_millis(),
            });
            let result = JobResult::failure(job.id, message, self.id.clone(), duration);
            return WorkerOutcome::Finished { job, result };
        }

        let retryable = EngineError::is_transient_message(&message);
        if retryable && job.retry_count < job.retry_cap {
            let delay = backoff_for(job.retry_count + 1);
            info!(job_id = %job.id, retry_count = job.retry_count + 1, delay_secs = delay.as_secs(), "job will retry");
            return WorkerOutcome::Retry {
                job,
                delay,
                error: message,
            };
        }

        self.events.emit(EngineEvent::JobCompleted {
            job_id: job.id,
            status: JobStatus::Failed,
            duration_ms: duration.as_millis(),
        });
        let result = JobResult::failure(job.id, message, self.id.clone(), duration);
        WorkerOutcome::Finished { job, result }
    }

    fn record(&self, duration: Duration, success: bool) {
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        if success {
            self.stats.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// `2^(retry_count - 1)` seconds, clamped at five minutes (spec §4.5, §8).
pub fn backoff_for(retry_count: u32) -> Duration {
    let shift = retry_count.saturating_sub(1).min(8);
    Duration::from_secs(1u64 << shift).min(Duration::from_secs(300))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_clamps() {
        assert_eq!(backoff_for(1), Duration::from_secs(1));
        assert_eq!(backoff_for(2), Duration::from_secs(2));
        assert_eq!(backoff_for(3), Duration::from_secs(4));
        assert_eq!(backoff_for(20), Duration::from_secs(300));
    }
}
