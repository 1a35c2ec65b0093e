//! Proof generation and verification as pluggable external collaborators
//! (spec §1 Non-goals, §6, §9). The engine orchestrates dispatch; it never
//! performs the underlying arithmetic-circuit cryptography itself.

use crate::error::{EngineError, EngineResult};
use crate::progress::ProgressSnapshot;
use crate::proof::ProofArtifact;
use crate::request::{InputMap, ProofRequest, VerificationRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Produces proofs for one or more proof types.
///
/// Implementations report retryability through the text of their error
/// messages: a message starting with "invalid input" or "validation
/// failed" is never retried; one containing "timeout" or "temporary" is
/// (spec §4.5, §6). `generate`'s `Err(String)` carries that message.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &ProofRequest) -> Result<ProofArtifact, String>;

    /// Async variant that also reports live progress through `on_progress`
    /// as it runs. The default implementation has no native progress
    /// source, so it just runs to completion and skips straight to 1.0.
    async fn generate_async(
        &self,
        request: &ProofRequest,
        _on_progress: Arc<dyn Fn(ProgressSnapshot) + Send + Sync>,
    ) -> Result<ProofArtifact, String> {
        self.generate(request).await
    }

    fn supported_types(&self) -> Vec<String>;

    /// A coarse estimate used for logging and client-side expectations;
    /// not a scheduling input.
    fn estimate_time(&self, proof_type: &str) -> Option<Duration>;
}

/// Verifies previously generated proofs.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, request: &VerificationRequest) -> Result<bool, String>;

    async fn verify_batch(&self, requests: &[VerificationRequest]) -> Vec<Result<bool, String>> {
        let mut out = Vec::with_capacity(requests.len());
        for r in requests {
            out.push(self.verify(r).await);
        }
        out
    }

    fn validate_public_inputs(&self, proof_type: &str, inputs: &InputMap) -> Result<(), String>;
}

/// Dispatch table routing each proof type to its sub-generator/verifier
/// (spec §9 "composite generator"), grounded on the teacher's pattern
/// registry's keyed-dispatch shape.
pub struct CompositeGenerator {
    generators: HashMap<String, Arc<dyn Generator>>,
    verifiers: HashMap<String, Arc<dyn Verifier>>,
}

impl CompositeGenerator {
    pub fn new() -> Self {
        Self {
            generators: HashMap::new(),
            verifiers: HashMap::new(),
        }
    }

    pub fn register_generator(&mut self, generator: Arc<dyn Generator>) {
        for proof_type in generator.supported_types() {
            self.generators.insert(proof_type, generator.clone());
        }
    }

    pub fn register_verifier(&mut self, proof_type: impl Into<String>, verifier: Arc<dyn Verifier>) {
        self.verifiers.insert(proof_type.into(), verifier);
    }

    fn generator_for(&self, proof_type: &str) -> EngineResult<&Arc<dyn Generator>> {
        self.generators.get(proof_type).ok_or_else(|| {
            EngineError::Validation(format!("invalid input: unknown proof type '{}'", proof_type))
        })
    }

    fn verifier_for(&self, proof_type: &str) -> EngineResult<&Arc<dyn Verifier>> {
        self.verifiers.get(proof_type).ok_or_else(|| {
            EngineError::Validation(format!("invalid input: unknown proof type '{}'", proof_type))
        })
    }
}

#[async_trait]
impl Generator for CompositeGenerator {
    async fn generate(&self, request: &ProofRequest) -> Result<ProofArtifact, String> {
        let generator = self
            .generator_for(&request.proof_type)
            .map_err(|e| e.to_string())?;
        generator.generate(request).await
    }

    async fn generate_async(
        &self,
        request: &ProofRequest,
        on_progress: Arc<dyn Fn(ProgressSnapshot) + Send + Sync>,
    ) -> Result<ProofArtifact, String> {
        let generator = self
            .generator_for(&request.proof_type)
            .map_err(|e| e.to_string())?;
        generator.generate_async(request, on_progress).await
    }

    fn supported_types(&self) -> Vec<String> {
        self.generators.keys().cloned().collect()
    }

    fn estimate_time(&self, proof_type: &str) -> Option<Duration> {
        self.generators.get(proof_type)?.estimate_time(proof_type)
    }
}

#[async_trait]
impl Verifier for CompositeGenerator {
    async fn verify(&self, request: &VerificationRequest) -> Result<bool, String> {
        let proof_type = request
            .circuit_hash
            .split(':')
            .next()
            .unwrap_or(&request.circuit_hash);
        let verifier = self.verifier_for(proof_type).map_err(|e| e.to_string())?;
        verifier.verify(request).await
    }

    fn validate_public_inputs(&self, proof_type: &str, inputs: &InputMap) -> Result<(), String> {
        let verifier = self.verifier_for(proof_type).map_err(|e| e.to_string())?;
        verifier.validate_public_inputs(proof_type, inputs)
    }
}

impl Default for CompositeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic hash-based generator for tests and demonstration, not
/// cryptographically sound. It never reports progress beyond 0/1 since it
/// runs to completion synchronously.
pub struct MockGenerator {
    proof_types: Vec<String>,
}

impl MockGenerator {
    pub fn new(proof_types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            proof_types: proof_types.into_iter().map(Into::into).collect(),
        }
    }

    fn digest(request: &ProofRequest) -> Result<Vec<u8>, String> {
        use sha2::{Digest, Sha256};
        if let Some(InputValueCheck::Negative) = check_balance_like(&request.private_inputs) {
            return Err("invalid input: balance must not be negative".to_string());
        }
        let mut hasher = Sha256::new();
        hasher.update(request.proof_type.as_bytes());
        let serialized = serde_json::to_vec(&request.public_inputs)
            .map_err(|e| format!("invalid input: {}", e))?;
        hasher.update(&serialized);
        Ok(hasher.finalize().to_vec())
    }
}

enum InputValueCheck {
    Negative,
}

fn check_balance_like(inputs: &InputMap) -> Option<InputValueCheck> {
    for (key, value) in inputs {
        if key.to_ascii_lowercase().contains("balance") {
            if let Some(n) = value.as_integer() {
                if n < 0 {
                    return Some(InputValueCheck::Negative);
                }
            }
        }
    }
    None
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: &ProofRequest) -> Result<ProofArtifact, String> {
        let proof_bytes = Self::digest(request)?;
        let verification_key = proof_bytes.iter().rev().cloned().collect();
        Ok(ProofArtifact {
            proof_id: uuid::Uuid::new_v4().to_string(),
            circuit_hash: format!("{}:mock", request.proof_type),
            proof_bytes,
            verification_key,
            generated_at: chrono::Utc::now(),
            expires_at: None,
            public_inputs: request.public_inputs.clone(),
        })
    }

    fn supported_types(&self) -> Vec<String> {
        self.proof_types.clone()
    }

    fn estimate_time(&self, _proof_type: &str) -> Option<Duration> {
        Some(Duration::from_millis(50))
    }
}

/// Deterministic counterpart to [`MockGenerator`]: a proof verifies iff
/// recomputing the digest over the supplied public inputs matches the
/// supplied proof bytes.
pub struct MockVerifier;

#[async_trait]
impl Verifier for MockVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<bool, String> {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        let proof_type = request.circuit_hash.split(':').next().unwrap_or_default();
        hasher.update(proof_type.as_bytes());
        let serialized = serde_json::to_vec(&request.public_inputs)
            .map_err(|e| format!("invalid input: {}", e))?;
        hasher.update(&serialized);
        let expected = hasher.finalize().to_vec();
        Ok(expected == request.proof_bytes)
    }

    fn validate_public_inputs(&self, _proof_type: &str, _inputs: &InputMap) -> Result<(), String> {
        Ok(())
    }
}
