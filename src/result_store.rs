//! Bounded store of terminal job results (spec §4.2).
//!
//! Unlike a conventional LRU cache, eviction is driven by completion time,
//! not access recency: the entry with the oldest `completed_at` is dropped
//! first once the store is at capacity, regardless of how recently it was
//! read.

use crate::error::{EngineError, EngineResult};
use crate::job::JobId;
use crate::result::JobResult;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct CompletionKey {
    completed_at: chrono::DateTime<chrono::Utc>,
    job_id: JobId,
}

struct Inner {
    results: HashMap<JobId, JobResult>,
    by_completion: BTreeSet<CompletionKey>,
    closed: bool,
}

/// Stored results are value copies: mutating a returned [`JobResult`] never
/// affects the store (spec §4.2).
pub struct ResultStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                results: HashMap::new(),
                by_completion: BTreeSet::new(),
                closed: false,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn store(&self, result: JobResult) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(EngineError::Resource("result store is closed".to_string()));
        }
        let key = CompletionKey {
            completed_at: result.completed_at,
            job_id: result.job_id,
        };
        if let Some(old) = inner.results.get(&result.job_id) {
            let old_key = CompletionKey {
                completed_at: old.completed_at,
                job_id: old.job_id,
            };
            inner.by_completion.remove(&old_key);
        } else if inner.results.len() >= self.capacity {
            if let Some(oldest) = inner.by_completion.iter().next().copied() {
                inner.by_completion.remove(&oldest);
                inner.results.remove(&oldest.job_id);
            }
        }
        inner.by_completion.insert(key);
        inner.results.insert(result.job_id, result);
        Ok(())
    }

    pub fn get(&self, job_id: JobId) -> Option<JobResult> {
        self.inner.lock().results.get(&job_id).cloned()
    }

    /// Newest-completed-first, with optional pagination.
    pub fn list(&self, limit: usize, offset: usize) -> Vec<JobResult> {
        let inner = self.inner.lock();
        inner
            .by_completion
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|k| inner.results.get(&k.job_id).cloned())
            .collect()
    }

    pub fn delete(&self, job_id: JobId) -> Option<JobResult> {
        let mut inner = self.inner.lock();
        let removed = inner.results.remove(&job_id)?;
        inner.by_completion.remove(&CompletionKey {
            completed_at: removed.completed_at,
            job_id,
        });
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(&self) {
        self.inner.lock().closed = true;
    }
}

pub type SharedResultStore = Arc<ResultStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result_at(job_id: JobId, secs: i64) -> JobResult {
        let mut r = JobResult::failure(job_id, "boom", "worker-1", Duration::from_millis(1));
        r.completed_at = chrono::Utc::now() + chrono::Duration::seconds(secs);
        r
    }

    #[test]
    fn evicts_oldest_completion_not_least_recently_read() {
        let store = ResultStore::new(2);
        let a = JobId::new();
        let b = JobId::new();
        let c = JobId::new();

        store.store(result_at(a, 0)).unwrap();
        store.store(result_at(b, 1)).unwrap();

        // Touch `a` repeatedly; a classic access-order LRU would spare it.
        for _ in 0..5 {
            let _ = store.get(a);
        }

        store.store(result_at(c, 2)).unwrap();

        assert!(store.get(a).is_none(), "oldest-by-completion must be evicted despite recent reads");
        assert!(store.get(b).is_some());
        assert!(store.get(c).is_some());
    }

    #[test]
    fn list_is_newest_completed_first() {
        let store = ResultStore::new(10);
        let a = JobId::new();
        let b = JobId::new();
        store.store(result_at(a, 0)).unwrap();
        store.store(result_at(b, 5)).unwrap();

        let listed = store.list(10, 0);
        assert_eq!(listed[0].job_id, b);
        assert_eq!(listed[1].job_id, a);
    }

    #[test]
    fn store_rejects_after_close() {
        let store = ResultStore::new(10);
        store.close();
        assert!(store.store(result_at(JobId::new(), 0)).is_err());
    }
}
