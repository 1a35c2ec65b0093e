//! Delayed-retry scheduling (spec §4.4), grounded on the teacher's
//! `TimerService` timer-loop shape: a map of due times checked on a short
//! tick, with entries moved back onto the queue once they come due.

use crate::job::{Job, JobId};
use crate::queue::SharedQueue;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TICK_INTERVAL: Duration = Duration::from_millis(200);

struct DelayedJob {
    job: Job,
    due_at: DateTime<Utc>,
}

/// Holds retrying jobs until their backoff elapses, then hands them back
/// to the queue as Pending.
pub struct Scheduler {
    queue: SharedQueue,
    delayed: Mutex<HashMap<JobId, DelayedJob>>,
}

impl Scheduler {
    pub fn new(queue: SharedQueue) -> Self {
        Self {
            queue,
            delayed: Mutex::new(HashMap::new()),
        }
    }

    /// Park `job` until `delay` elapses, then re-enqueue it as Pending.
    pub fn schedule(&self, job: Job, delay: Duration) {
        let due_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        self.delayed.lock().insert(job.id, DelayedJob { job, due_at });
    }

    /// Retarget a still-delayed job's priority. No-op if it already fired
    /// or was never delayed (the priority update then goes through the
    /// queue directly).
    pub fn update_priority(&self, id: JobId, priority: i32) {
        if let Some(entry) = self.delayed.lock().get_mut(&id) {
            entry.job.priority = priority;
        }
    }

    /// Remove a delayed job so it never fires. Returns it if present.
    pub fn cancel(&self, id: JobId) -> Option<Job> {
        self.delayed.lock().remove(&id).map(|entry| entry.job)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.delayed.lock().contains_key(&id)
    }

    /// Run the tick loop until `cancel` fires. Spawned once by the pool.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.fire_due(),
                _ = cancel.cancelled() => return,
            }
        }
    }

    fn fire_due(&self) {
        let now = Utc::now();
        let due: Vec<JobId> = {
            let guard = self.delayed.lock();
            guard
                .iter()
                .filter(|(_, entry)| entry.due_at <= now)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in due {
            let job = self.delayed.lock().remove(&id).map(|entry| entry.job);
            if let Some(job) = job {
                let _ = self.queue.enqueue(job);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PriorityQueue;
    use crate::request::{InputMap, ProofRequest, ProofRequestOptions};

    fn job() -> Job {
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
            1,
        )
    }

    #[tokio::test]
    async fn scheduled_job_reappears_on_queue_after_delay() {
        let queue = Arc::new(PriorityQueue::new());
        let scheduler = Arc::new(Scheduler::new(queue.clone()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.clone().run(cancel.clone()));

        let j = job();
        let id = j.id;
        scheduler.schedule(j, Duration::from_millis(50));
        assert_eq!(queue.size(), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(queue.size(), 1);
        let dequeued = queue.dequeue(&CancellationToken::new()).await.unwrap();
        assert_eq!(dequeued.id, id);

        cancel.cancel();
        let _ = handle.await;
    }

    #[test]
    fn cancel_removes_a_not_yet_fired_job() {
        let queue = Arc::new(PriorityQueue::new());
        let scheduler = Scheduler::new(queue);
        let j = job();
        let id = j.id;
        scheduler.schedule(j, Duration::from_secs(60));
        assert!(scheduler.cancel(id).is_some());
        assert!(!scheduler.contains(id));
    }
}
