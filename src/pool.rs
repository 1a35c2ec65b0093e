//! Composes the queue, workers, result store, scheduler, and callback
//! dispatcher into the running engine (spec §4.6).

use crate::callback::CallbackDispatcher;
use crate::config::{EngineConfig, ScaleConfig};
use crate::events::{EngineEvent, EventEmitter};
use crate::generator::Generator;
use crate::job::JobStatus;
use crate::queue::SharedQueue;
use crate::result::JobResult;
use crate::result_store::SharedResultStore;
use crate::scheduler::Scheduler;
use crate::worker::{JobCancellations, Worker, WorkerOutcome, WorkerStats};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Aggregate view of the pool's current size and utilization (spec §4.7's
/// pool-stats surface).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub worker_count: usize,
    pub queue_size: usize,
    pub results_stored: usize,
}

struct WorkerHandle {
    worker: Arc<Worker>,
    run_handle: tokio::task::JoinHandle<()>,
    drive_handle: tokio::task::JoinHandle<()>,
}

/// The running worker pool: owns the dispatcher, result, and scaler loops
/// and every worker currently alive.
pub struct WorkerPool {
    self_ref: RwLock<Weak<WorkerPool>>,
    queue: SharedQueue,
    result_store: SharedResultStore,
    scheduler: Arc<Scheduler>,
    callbacks: Arc<CallbackDispatcher>,
    generator: Arc<dyn Generator>,
    events: Arc<dyn EventEmitter>,
    config: EngineConfig,
    workers: RwLock<Vec<WorkerHandle>>,
    next_worker_seq: AtomicUsize,
    job_cancellations: JobCancellations,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        queue: SharedQueue,
        result_store: SharedResultStore,
        callbacks: Arc<CallbackDispatcher>,
        generator: Arc<dyn Generator>,
        events: Arc<dyn EventEmitter>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let scheduler = Arc::new(Scheduler::new(queue.clone()));
        let pool = Arc::new(Self {
            self_ref: RwLock::new(Weak::new()),
            queue,
            result_store,
            scheduler,
            callbacks,
            generator,
            events,
            config,
            workers: RwLock::new(Vec::new()),
            next_worker_seq: AtomicUsize::new(0),
            job_cancellations: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        });
        *pool.self_ref.write() = Arc::downgrade(&pool);
        for _ in 0..pool.config.pool.min_workers {
            pool.spawn_worker();
        }
        pool
    }

    fn arc_self(&self) -> Arc<Self> {
        self.self_ref
            .read()
            .upgrade()
            .expect("pool dropped while still running")
    }

    /// Spawn one worker and wire its outcome channel into the result
    /// loop. Safe to call before or after `run`.
    fn spawn_worker(&self) {
        let seq = self.next_worker_seq.fetch_add(1, Ordering::Relaxed);
        let worker = Arc::new(Worker::new(
            format!("worker-{}", seq),
            self.queue.clone(),
            self.generator.clone(),
            self.config.pool.clone(),
            self.events.clone(),
            self.job_cancellations.clone(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let run_handle = worker.start(tx);
        let drive_handle = self.drive_outcomes(rx);
        self.workers.write().push(WorkerHandle {
            worker,
            run_handle,
            drive_handle,
        });
    }

    /// Start the scheduler tick and the autoscaler. Workers are already
    /// running and reporting outcomes as of [`WorkerPool::new`].
    pub fn run(self: &Arc<Self>) {
        let pool = self.clone();
        tokio::spawn(async move { pool.scaler_loop().await });

        let scheduler = self.scheduler.clone();
        let cancel = self.shutdown.clone();
        tokio::spawn(async move { scheduler.run(cancel).await });
    }

    fn drive_outcomes(&self, mut rx: mpsc::UnboundedReceiver<WorkerOutcome>) -> tokio::task::JoinHandle<()> {
        let pool = self.arc_self();
        tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                pool.process_outcome(outcome).await;
            }
        })
    }

    /// A job carried in from a worker's outcome channel is the copy the
    /// worker started with; `cancel_job` may have since overwritten the
    /// registry's record with a Cancelled status (e.g. in the dequeue-to-
    /// dispatch window). Re-reading the registry here, rather than trusting
    /// the worker's stale copy, stops a late Finished/Retry outcome from
    /// resurrecting an already-Cancelled job (spec §5 cancellation
    /// guarantee).
    fn already_cancelled(&self, job_id: crate::job::JobId) -> bool {
        self.queue
            .get(job_id)
            .map(|j| j.status == JobStatus::Cancelled)
            .unwrap_or(false)
    }

    async fn process_outcome(&self, outcome: WorkerOutcome) {
        match outcome {
            WorkerOutcome::Finished { mut job, result } => {
                if self.already_cancelled(job.id) {
                    return;
                }
                job.finalize(result.status, result.error.clone());
                self.queue.update(job.clone());
                let _ = self.result_store.store(result.clone());
                self.callbacks
                    .dispatch(job.callbacks.clone(), result, job.job_type.clone())
                    .await;
            }
            WorkerOutcome::Retry { mut job, delay, error } => {
                if self.already_cancelled(job.id) {
                    return;
                }
                job.prepare_retry();
                job.status = JobStatus::Retrying;
                job.set_retry_after(delay);
                job.last_error = Some(error.clone());
                self.queue.update(job.clone());
                self.events.emit(EngineEvent::JobRetryScheduled {
                    job_id: job.id,
                    retry_count: job.retry_count,
                    delay_secs: delay.as_secs(),
                });
                self.scheduler.schedule(job, delay);
            }
            WorkerOutcome::Cancelled { mut job } => {
                let worker_id = job.assigned_worker.clone().unwrap_or_else(|| "unknown".to_string());
                job.finalize(JobStatus::Cancelled, Some("job cancelled".to_string()));
                self.queue.update(job.clone());
                let result = JobResult::cancelled(job.id, worker_id, std::time::Duration::ZERO);
                let _ = self.result_store.store(result.clone());
                self.callbacks
                    .dispatch(job.callbacks.clone(), result, job.job_type.clone())
                    .await;
            }
        }
    }

    async fn scaler_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.scale.scale_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.maybe_scale(),
                _ = self.shutdown.cancelled() => return,
            }
        }
    }

    fn maybe_scale(&self) {
        let ScaleConfig {
            scale_up_threshold,
            scale_up_step,
            scale_down_threshold,
            scale_down_step,
            idle_threshold,
            ..
        } = self.config.scale;
        let backlog = self.queue.size();
        let current = self.workers.read().len();

        if backlog >= scale_up_threshold && current < self.config.pool.max_workers {
            let target = (current + scale_up_step).min(self.config.pool.max_workers);
            for _ in current..target {
                self.spawn_worker();
            }
            if target != current {
                self.events.emit(EngineEvent::PoolScaled {
                    from: current,
                    to: target,
                    reason: "backlog above scale_up_threshold",
                });
                info!(from = current, to = target, backlog, "pool scaled up");
            }
        } else if backlog <= scale_down_threshold && current > self.config.pool.min_workers {
            // Spec §4.6: remove a worker only once it has sat idle past
            // idle_threshold, and only min(scale_down_step, idle count,
            // room above min_workers) of them at a time.
            let idle_count = self
                .workers
                .read()
                .iter()
                .filter(|h| h.worker.idle_for().is_some_and(|d| d >= idle_threshold))
                .count();
            let room = current - self.config.pool.min_workers;
            let remove = scale_down_step.min(idle_count).min(room);
            if remove > 0 {
                self.scale_down_idle(remove, idle_threshold);
                let target = current - remove;
                self.events.emit(EngineEvent::PoolScaled {
                    from: current,
                    to: target,
                    reason: "idle workers past idle_threshold with backlog at or below scale_down_threshold",
                });
                info!(from = current, to = target, backlog, idle_count, "pool scaled down");
            }
        }
    }

    /// Stop the `count` longest-idle workers whose idle time is at least
    /// `idle_threshold`. Removing indices in descending order keeps the
    /// earlier indices valid while draining the vector.
    fn scale_down_idle(&self, count: usize, idle_threshold: std::time::Duration) {
        let mut workers = self.workers.write();
        let mut idle: Vec<(usize, std::time::Duration)> = workers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.worker.idle_for().filter(|d| *d >= idle_threshold).map(|d| (i, d)))
            .collect();
        idle.sort_by(|a, b| b.1.cmp(&a.1));
        idle.truncate(count);
        idle.sort_by(|a, b| b.0.cmp(&a.0));
        for (index, _) in idle {
            let handle = workers.remove(index);
            handle.worker.stop();
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            worker_count: self.workers.read().len(),
            queue_size: self.queue.size(),
            results_stored: self.result_store.len(),
        }
    }

    pub fn worker_stats(&self) -> Vec<(String, WorkerStats)> {
        self.workers
            .read()
            .iter()
            .map(|h| (h.worker.id.clone(), h.worker.stats()))
            .collect()
    }

    /// Cancel a specific in-flight job if a worker currently holds it.
    pub fn cancel_job(&self, job_id: crate::job::JobId) -> bool {
        if let Some((_, token)) = self.job_cancellations.remove(&job_id) {
            token.cancel();
            return true;
        }
        false
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    /// Stop accepting work and wait for every worker to drain: a worker
    /// idle in `dequeue` is unparked immediately, while one mid-job
    /// finishes that job and reports its Result before exiting (spec §5,
    /// "shutdown drains all in-flight Results before returning").
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.queue.close();
        let handles = std::mem::take(&mut *self.workers.write());
        for handle in &handles {
            handle.worker.stop();
        }
        for handle in handles {
            let _ = handle.run_handle.await;
            let _ = handle.drive_handle.await;
        }
    }
}
