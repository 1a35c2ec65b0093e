//! Proof record storage as a pluggable collaborator (spec §6).
//!
//! Durable, persistent storage is explicitly out of scope for this core
//! (spec §1 Non-goals); [`InMemoryProofRepository`] is the default and
//! only implementation shipped here, standing in for whatever durable
//! store a caller wires in behind the same trait.

use crate::error::{EngineError, EngineResult};
use crate::job::JobId;
use crate::proof::ProofArtifact;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One proof record as tracked by the repository.
#[derive(Debug, Clone)]
pub struct ProofRecord {
    pub job_id: JobId,
    pub proof_type: String,
    pub artifact: ProofArtifact,
    pub created_at: DateTime<Utc>,
}

/// Filters accepted by [`ProofRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ProofFilter {
    pub proof_type: Option<String>,
    pub subject_id: Option<String>,
    pub limit: usize,
}

#[async_trait]
pub trait ProofRepository: Send + Sync {
    async fn create(&self, record: ProofRecord) -> EngineResult<()>;
    async fn get_by_id(&self, job_id: JobId) -> EngineResult<Option<ProofRecord>>;
    async fn update(&self, record: ProofRecord) -> EngineResult<()>;
    async fn delete(&self, job_id: JobId) -> EngineResult<()>;
    async fn list(&self, filter: ProofFilter) -> EngineResult<Vec<ProofRecord>>;
    /// Remove every record whose artifact has expired as of `now`. Returns
    /// the number of records removed.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> EngineResult<usize>;
}

/// Default, non-durable implementation backed by an in-process map.
pub struct InMemoryProofRepository {
    records: RwLock<HashMap<JobId, ProofRecord>>,
}

impl InMemoryProofRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryProofRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProofRepository for InMemoryProofRepository {
    async fn create(&self, record: ProofRecord) -> EngineResult<()> {
        let mut guard = self.records.write().await;
        if guard.contains_key(&record.job_id) {
            return Err(EngineError::Durable(format!(
                "proof record for job {} already exists",
                record.job_id
            )));
        }
        guard.insert(record.job_id, record);
        Ok(())
    }

    async fn get_by_id(&self, job_id: JobId) -> EngineResult<Option<ProofRecord>> {
        Ok(self.records.read().await.get(&job_id).cloned())
    }

    async fn update(&self, record: ProofRecord) -> EngineResult<()> {
        let mut guard = self.records.write().await;
        guard.insert(record.job_id, record);
        Ok(())
    }

    async fn delete(&self, job_id: JobId) -> EngineResult<()> {
        self.records.write().await.remove(&job_id);
        Ok(())
    }

    async fn list(&self, filter: ProofFilter) -> EngineResult<Vec<ProofRecord>> {
        let guard = self.records.read().await;
        let mut records: Vec<ProofRecord> = guard
            .values()
            .filter(|r| {
                filter
                    .proof_type
                    .as_ref()
                    .map(|t| &r.proof_type == t)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if filter.limit > 0 {
            records.truncate(filter.limit);
        }
        Ok(records)
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.retain(|_, record| !record.artifact.is_expired(now));
        Ok(before - guard.len())
    }
}

pub type SharedProofRepository = Arc<dyn ProofRepository>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn artifact(expires_at: Option<DateTime<Utc>>) -> ProofArtifact {
        ProofArtifact {
            proof_id: "p1".into(),
            proof_bytes: vec![1, 2, 3],
            verification_key: vec![4, 5, 6],
            circuit_hash: "balance_threshold:mock".into(),
            generated_at: Utc::now(),
            expires_at,
            public_inputs: Map::new(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_job_id() {
        let repo = InMemoryProofRepository::new();
        let job_id = JobId::new();
        let record = ProofRecord {
            job_id,
            proof_type: "balance_threshold".into(),
            artifact: artifact(None),
            created_at: Utc::now(),
        };
        repo.create(record.clone()).await.unwrap();
        assert!(repo.create(record).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_expired_removes_only_expired_records() {
        let repo = InMemoryProofRepository::new();
        let past = Utc::now() - chrono::Duration::hours(1);
        let future = Utc::now() + chrono::Duration::hours(1);

        let expired = JobId::new();
        let fresh = JobId::new();
        repo.create(ProofRecord {
            job_id: expired,
            proof_type: "balance_threshold".into(),
            artifact: artifact(Some(past)),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        repo.create(ProofRecord {
            job_id: fresh,
            proof_type: "balance_threshold".into(),
            artifact: artifact(Some(future)),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let removed = repo.cleanup_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get_by_id(expired).await.unwrap().is_none());
        assert!(repo.get_by_id(fresh).await.unwrap().is_some());
    }
}
