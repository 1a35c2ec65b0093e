//! Priority-ordered job queue with blocking, cancellable dequeue (spec §4.1).
//!
//! The ordered structure (a `BTreeSet` keyed by priority-desc/created-asc)
//! holds only currently-Pending jobs; the lookup map is the authoritative
//! registry for every job the queue has ever seen, including jobs that are
//! now Running or terminal — `get`/`list` answer status queries against it
//! the way a caller expects `get-job-status` to work at any point in a
//! job's life, while `size` (used by the scaler, spec §4.6) reports only
//! the Pending backlog.

use crate::error::{EngineError, EngineResult};
use crate::job::{Job, JobId, JobStatus, QueueOrderKey};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    key: QueueOrderKey,
    id: JobId,
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key).then_with(|| self.id.cmp(&other.id))
    }
}

struct Inner {
    ready: BTreeSet<QueueEntry>,
    jobs: HashMap<JobId, Job>,
    closed: bool,
}

/// A priority-ordered multiset of Pending jobs plus a job registry.
pub struct PriorityQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: BTreeSet::new(),
                jobs: HashMap::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Admit a new job. Fails if the queue has been closed.
    pub fn enqueue(&self, job: Job) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(EngineError::Resource("queue is closed".to_string()));
        }
        inner.ready.insert(QueueEntry {
            key: QueueOrderKey::from(&job),
            id: job.id,
        });
        inner.jobs.insert(job.id, job);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Re-admit a job that is already registered (e.g. a failed dispatch
    /// offer, or a retry coming out of the scheduler's delay map). The job
    /// must already be Pending.
    pub fn requeue(&self, job: Job) -> EngineResult<()> {
        self.enqueue(job)
    }

    /// Block until a job is ready, taking ownership of exactly one and
    /// atomically transitioning it to Running with `started_at = now` if
    /// this is its first dispatch (spec §4.1). Returns `Err(Cancelled)` if
    /// `cancel` fires first, or `Err(Resource)` if the queue closes.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> EngineResult<Job> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(EngineError::Resource("queue is closed".to_string()));
                }
                if let Some(entry) = inner.ready.pop_last() {
                    let job = inner
                        .jobs
                        .get_mut(&entry.id)
                        .expect("ready entry without a registry record");
                    job.status = JobStatus::Running;
                    if job.started_at.is_none() {
                        job.started_at = Some(chrono::Utc::now());
                    }
                    return Ok(job.clone());
                }
            }
            tokio::select! {
                _ = notified => continue,
                _ = cancel.cancelled() => {
                    return Err(EngineError::Cancelled("dequeue cancelled".to_string()));
                }
            }
        }
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.inner.lock().jobs.get(&id).cloned()
    }

    /// Overwrite the registry record for a job, without touching the
    /// ordered structure. Used to persist status/metadata changes for
    /// Running or terminal jobs.
    pub fn update(&self, job: Job) {
        self.inner.lock().jobs.insert(job.id, job);
    }

    /// Revert a dequeued-but-undispatched job back to Pending and return
    /// it to the ordered structure without counting as a retry (spec
    /// §4.6's "re-enqueues the job with status Pending" on a failed offer).
    pub fn return_undispatched(&self, mut job: Job) {
        job.status = JobStatus::Pending;
        job.started_at = None;
        job.assigned_worker = None;
        let mut inner = self.inner.lock();
        inner.ready.insert(QueueEntry {
            key: QueueOrderKey::from(&job),
            id: job.id,
        });
        inner.jobs.insert(job.id, job);
        drop(inner);
        self.notify.notify_one();
    }

    /// Change a Pending job's priority in place (spec §4.4 update-priority).
    pub fn update_priority(&self, id: JobId, priority: i32) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        let job = inner
            .jobs
            .get(&id)
            .ok_or_else(|| EngineError::NotFound(format!("job {} not found", id)))?
            .clone();
        if job.status != JobStatus::Pending {
            return Err(EngineError::Validation(format!(
                "job {} is not pending",
                id
            )));
        }
        inner.ready.remove(&QueueEntry {
            key: QueueOrderKey::from(&job),
            id,
        });
        let mut updated = job;
        updated.priority = priority;
        inner.ready.insert(QueueEntry {
            key: QueueOrderKey::from(&updated),
            id,
        });
        inner.jobs.insert(id, updated);
        Ok(())
    }

    /// Remove a job from the ordered structure and the registry entirely
    /// (spec §4.4 cancel: "delete from queue").
    pub fn delete(&self, id: JobId) -> Option<Job> {
        let mut inner = self.inner.lock();
        if let Some(job) = inner.jobs.get(&id) {
            let key = QueueOrderKey::from(job);
            inner.ready.remove(&QueueEntry { key, id });
        }
        inner.jobs.remove(&id)
    }

    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        let inner = self.inner.lock();
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        jobs
    }

    /// Pending backlog size, used by the scaler (spec §4.6).
    pub fn size(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Close the queue: fail all parked dequeuers and reject further
    /// enqueues (spec §4.1).
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle, cloned across the pool's dispatcher/result/scaler loops.
pub type SharedQueue = Arc<PriorityQueue>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{InputMap, ProofRequest, ProofRequestOptions};

    fn job(priority: i32) -> Job {
        Job::new(
            ProofRequest {
                proof_type: "balance_threshold".into(),
                subject_id: None,
                account_id: None,
                public_inputs: InputMap::new(),
                private_inputs: InputMap::new(),
                options: ProofRequestOptions::default(),
            },
            "balance_threshold",
            priority,
        )
    }

    #[tokio::test]
    async fn dequeues_in_priority_then_creation_order() {
        let queue = PriorityQueue::new();
        let cancel = CancellationToken::new();

        let mut j1 = job(1);
        let t0 = j1.created_at;
        let mut j2 = job(10);
        j2.created_at = t0 + chrono::Duration::seconds(1);
        let mut j3 = job(1);
        j3.created_at = t0 + chrono::Duration::seconds(2);

        let (id1, id2, id3) = (j1.id, j2.id, j3.id);
        queue.enqueue(j1).unwrap();
        queue.enqueue(j2).unwrap();
        queue.enqueue(j3).unwrap();

        let first = queue.dequeue(&cancel).await.unwrap();
        let second = queue.dequeue(&cancel).await.unwrap();
        let third = queue.dequeue(&cancel).await.unwrap();

        assert_eq!(first.id, id2);
        assert_eq!(second.id, id1);
        assert_eq!(third.id, id3);
    }

    #[tokio::test]
    async fn dequeue_parks_then_wakes_on_enqueue() {
        let queue = Arc::new(PriorityQueue::new());
        let cancel = CancellationToken::new();
        let q2 = queue.clone();

        let handle = tokio::spawn(async move { q2.dequeue(&CancellationToken::new()).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let j = job(5);
        let id = j.id;
        queue.enqueue(j).unwrap();

        let got = handle.await.unwrap().unwrap();
        assert_eq!(got.id, id);
        let _ = cancel;
    }

    #[tokio::test]
    async fn close_fails_parked_dequeue_and_future_enqueue() {
        let queue = Arc::new(PriorityQueue::new());
        let q2 = queue.clone();
        let handle = tokio::spawn(async move { q2.dequeue(&CancellationToken::new()).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.close();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(EngineError::Resource(_))));
        assert!(queue.enqueue(job(1)).is_err());
    }

    #[tokio::test]
    async fn cancellation_token_unparks_dequeue() {
        let queue = PriorityQueue::new();
        let cancel = CancellationToken::new();
        let c2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            c2.cancel();
        });
        let result = queue.dequeue(&cancel).await;
        assert!(matches!(result, Err(EngineError::Cancelled(_))));
    }

    #[test]
    fn update_priority_requires_pending_status() {
        let queue = PriorityQueue::new();
        let mut j = job(1);
        j.status = JobStatus::Running;
        let id = j.id;
        queue.update(j);
        assert!(queue.update_priority(id, 5).is_err());
    }
}
