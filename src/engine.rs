//! The orchestration façade (spec §4.7): the single entry point callers
//! use to submit proof work, track it, and retrieve results.

use crate::callback::CallbackDispatcher;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventEmitter, TracingEventEmitter};
use crate::generator::{Generator, Verifier};
use crate::job::{CallbackSink, Job, JobId, JobStatus};
use crate::pool::{PoolStats, WorkerPool};
use crate::progress::ProgressSnapshot;
use crate::proof::ProofArtifact;
use crate::queue::{PriorityQueue, SharedQueue};
use crate::repository::{InMemoryProofRepository, ProofFilter, ProofRecord, ProofRepository};
use crate::request::{ProofRequest, VerificationRequest};
use crate::result::JobResult;
use crate::result_store::{ResultStore, SharedResultStore};
use crate::worker::WorkerStats;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Composite trait object combining generation and verification, matching
/// what [`crate::generator::CompositeGenerator`] already implements.
pub trait ProofBackend: Generator + Verifier {}
impl<T: Generator + Verifier + ?Sized> ProofBackend for T {}

/// Builds a [`ProofEngine`] with sensible defaults, letting callers
/// override the generator, repository, or event emitter.
pub struct ProofEngineBuilder {
    config: EngineConfig,
    backend: Option<Arc<dyn ProofBackend>>,
    repository: Option<Arc<dyn ProofRepository>>,
    events: Option<Arc<dyn EventEmitter>>,
}

impl ProofEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            backend: None,
            repository: None,
            events: None,
        }
    }

    pub fn backend(mut self, backend: Arc<dyn ProofBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn ProofRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventEmitter>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> EngineResult<ProofEngine> {
        self.config.validate()?;
        let backend = self.backend.ok_or_else(|| {
            EngineError::Validation("a proof generation backend is required".to_string())
        })?;
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryProofRepository::new()));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingEventEmitter));
        Ok(ProofEngine::new(self.config, backend, repository, events))
    }
}

/// Entry point for proof generation, verification, and job orchestration.
pub struct ProofEngine {
    config: EngineConfig,
    queue: SharedQueue,
    result_store: SharedResultStore,
    pool: RwLock<Option<Arc<WorkerPool>>>,
    backend: Arc<dyn ProofBackend>,
    repository: Arc<dyn ProofRepository>,
    events: Arc<dyn EventEmitter>,
    progress: Arc<dashmap::DashMap<JobId, ProgressSnapshot>>,
    running: AtomicBool,
    background_shutdown: CancellationToken,
}

impl ProofEngine {
    fn new(
        config: EngineConfig,
        backend: Arc<dyn ProofBackend>,
        repository: Arc<dyn ProofRepository>,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            queue: Arc::new(PriorityQueue::new()),
            result_store: Arc::new(ResultStore::new(config.result_store.capacity)),
            pool: RwLock::new(None),
            backend,
            repository,
            events,
            progress: Arc::new(dashmap::DashMap::new()),
            running: AtomicBool::new(false),
            background_shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Start the worker pool and the background cleanup/metrics tasks.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let callbacks = Arc::new(CallbackDispatcher::new());
        let generator: Arc<dyn Generator> = self.backend.clone();
        let pool = WorkerPool::new(
            self.queue.clone(),
            self.result_store.clone(),
            callbacks,
            generator,
            self.events.clone(),
            self.config.clone(),
        );
        pool.run();
        *self.pool.write() = Some(pool);

        self.spawn_cleanup_task();
        self.spawn_metrics_task();
        info!("proof engine started");
    }

    /// Stop accepting work and drain in-flight jobs (spec §4.6).
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.background_shutdown.cancel();
        if let Some(pool) = self.pool.write().take() {
            pool.shutdown().await;
        }
        info!("proof engine stopped");
    }

    fn spawn_cleanup_task(&self) {
        let repository = self.repository.clone();
        let cancel = self.background_shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Ok(removed) = repository.cleanup_expired(chrono::Utc::now()).await {
                            if removed > 0 {
                                info!(removed, "expired proof records swept");
                            }
                        }
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        });
    }

    fn spawn_metrics_task(&self) {
        let queue = self.queue.clone();
        let result_store = self.result_store.clone();
        let cancel = self.background_shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(METRICS_REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracing::debug!(
                            queue_size = queue.size(),
                            results_stored = result_store.len(),
                            "engine metrics refresh"
                        );
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        });
    }

    fn pool_handle(&self) -> EngineResult<Arc<WorkerPool>> {
        self.pool
            .read()
            .clone()
            .ok_or_else(|| EngineError::Resource("engine is not running".to_string()))
    }

    /// Generate a proof synchronously: submit and block on the result.
    pub async fn generate(&self, request: ProofRequest) -> EngineResult<ProofArtifact> {
        let job_id = self.submit_job(request, 0, Vec::new()).await?;
        loop {
            if let Some(result) = self.result_store.get(job_id) {
                return match result.status {
                    JobStatus::Completed => Ok(result
                        .proof
                        .expect("completed result without a proof artifact")),
                    _ => Err(EngineError::Internal(
                        result.error.unwrap_or_else(|| "generation failed".to_string()),
                    )),
                };
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Generate a proof asynchronously: submit and return the job id
    /// immediately.
    pub async fn generate_async(
        &self,
        request: ProofRequest,
        priority: i32,
        callbacks: Vec<CallbackSink>,
    ) -> EngineResult<JobId> {
        self.submit_job(request, priority, callbacks).await
    }

    pub async fn verify(&self, request: VerificationRequest) -> EngineResult<bool> {
        self.backend.verify(&request).await.map_err(|msg| {
            if EngineError::is_validation_message(&msg) {
                EngineError::Validation(msg)
            } else {
                EngineError::Internal(msg)
            }
        })
    }

    pub async fn get_proof(&self, job_id: JobId) -> EngineResult<Option<ProofRecord>> {
        self.repository.get_by_id(job_id).await
    }

    pub fn get_progress(&self, job_id: JobId) -> ProgressSnapshot {
        if let Some(snapshot) = self.progress.get(&job_id) {
            return snapshot.clone();
        }
        if let Some(result) = self.result_store.get(job_id) {
            return ProgressSnapshot::synthesize(job_id, result.status, result.error);
        }
        if let Some(job) = self.queue.get(job_id) {
            return ProgressSnapshot::synthesize(job_id, job.status, job.last_error);
        }
        ProgressSnapshot::synthesize(job_id, JobStatus::Pending, None)
    }

    pub async fn list_proofs(&self, proof_type: Option<String>, limit: usize) -> EngineResult<Vec<ProofRecord>> {
        self.repository
            .list(ProofFilter {
                proof_type,
                subject_id: None,
                limit,
            })
            .await
    }

    /// Admit a new job, validating its shape before it is queued (spec §4.7).
    pub async fn submit_job(
        &self,
        request: ProofRequest,
        priority: i32,
        callbacks: Vec<CallbackSink>,
    ) -> EngineResult<JobId> {
        request
            .validate_shape()
            .map_err(EngineError::Validation)?;
        self.backend
            .validate_public_inputs(&request.proof_type, &request.public_inputs)
            .map_err(EngineError::Validation)?;

        let proof_type = request.proof_type.clone();
        let mut job = Job::new(request, proof_type.clone(), priority);
        job.retry_cap = self.config.callback.default_retry_cap;
        job.callbacks = callbacks;
        let job_id = job.id;

        self.queue.enqueue(job)?;
        self.events.emit(EngineEvent::JobEnqueued {
            job_id,
            proof_type,
            priority,
        });
        Ok(job_id)
    }

    pub fn get_job_status(&self, job_id: JobId) -> EngineResult<JobStatus> {
        if let Some(job) = self.queue.get(job_id) {
            return Ok(job.status);
        }
        if let Some(result) = self.result_store.get(job_id) {
            return Ok(result.status);
        }
        Err(EngineError::NotFound(format!("job {} not found", job_id)))
    }

    pub fn get_job_result(&self, job_id: JobId) -> Option<JobResult> {
        self.result_store.get(job_id)
    }

    /// Cancel a job wherever it currently lives: pending in the queue,
    /// delayed in the scheduler, or running on a worker (spec §4.4, §5).
    ///
    /// Idempotent: cancelling a job already in a terminal status (including
    /// a prior cancellation) is a no-op rather than reopening or flipping
    /// its recorded outcome.
    pub fn cancel_job(&self, job_id: JobId) -> EngineResult<()> {
        if let Some(job) = self.queue.get(job_id) {
            if job.status.is_terminal() {
                return Ok(());
            }
        } else if self.result_store.get(job_id).is_some() {
            return Ok(());
        }
        if let Some(pool) = self.pool.read().clone() {
            if pool.scheduler().cancel(job_id).is_some() {
                if let Some(mut job) = self.queue.get(job_id) {
                    job.finalize(JobStatus::Cancelled, Some("job cancelled".to_string()));
                    self.queue.update(job);
                }
                return Ok(());
            }
            if pool.cancel_job(job_id) {
                return Ok(());
            }
        }
        if let Some(mut job) = self.queue.delete(job_id) {
            job.finalize(JobStatus::Cancelled, Some("job cancelled".to_string()));
            self.queue.update(job);
            return Ok(());
        }
        Err(EngineError::NotFound(format!("job {} not found", job_id)))
    }

    pub fn update_job_priority(&self, job_id: JobId, priority: i32) -> EngineResult<()> {
        if let Some(pool) = self.pool.read().clone() {
            if pool.scheduler().contains(job_id) {
                pool.scheduler().update_priority(job_id, priority);
                return Ok(());
            }
        }
        self.queue.update_priority(job_id, priority)
    }

    pub fn pool_stats(&self) -> EngineResult<PoolStats> {
        Ok(self.pool_handle()?.stats())
    }

    pub fn worker_stats(&self) -> EngineResult<Vec<(String, WorkerStats)>> {
        Ok(self.pool_handle()?.worker_stats())
    }

    pub fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        self.queue.list(status, limit)
    }
}

/// Convenience alias for building callback headers without pulling in
/// `HashMap` at call sites.
pub type Headers = HashMap<String, String>;
