//! Shared test harness wiring an engine with an instrumented generator so
//! tests can observe dispatch order, retries, and cancellation without
//! reaching into the engine's internals.

use async_trait::async_trait;
use attestor::generator::Generator;
use attestor::{
    CallbackSink, EngineConfig, InputMap, InputValue, JobId, ProofArtifact, ProofEngine,
    ProofEngineBuilder, ProofRequest, ProofRequestOptions,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const LABEL_KEY: &str = "__label";

/// A generator whose behavior per label is scripted by the test: how long
/// to take, and what to return.
#[derive(Clone)]
pub enum Script {
    Succeed,
    /// Fails `fail_times` times with a transient message, then succeeds.
    FailThenSucceed { fail_times: u32 },
    AlwaysFail(String),
    /// Runs until cancelled; never returns on its own.
    Hang,
}

pub struct ScriptedGenerator {
    order: Mutex<Vec<String>>,
    attempts: Mutex<HashMap<String, u32>>,
    scripts: Mutex<HashMap<String, Script>>,
    default_script: Script,
}

impl ScriptedGenerator {
    pub fn new(default_script: Script) -> Self {
        Self {
            order: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            default_script,
        }
    }

    pub fn set_script(&self, label: &str, script: Script) {
        self.scripts.lock().insert(label.to_string(), script);
    }

    pub fn dispatch_order(&self) -> Vec<String> {
        self.order.lock().clone()
    }
}

fn label_of(request: &ProofRequest) -> String {
    request
        .public_inputs
        .get(LABEL_KEY)
        .and_then(|v| v.as_decimal())
        .unwrap_or("")
        .to_string()
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &ProofRequest) -> Result<ProofArtifact, String> {
        let label = label_of(request);
        self.order.lock().push(label.clone());

        let script = self
            .scripts
            .lock()
            .get(&label)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone());

        match script {
            Script::Succeed => Ok(mock_artifact(request)),
            Script::FailThenSucceed { fail_times } => {
                let mut attempts = self.attempts.lock();
                let count = attempts.entry(label).or_insert(0);
                *count += 1;
                if *count <= fail_times {
                    Err("temporary: generator overloaded, try again".to_string())
                } else {
                    Ok(mock_artifact(request))
                }
            }
            Script::AlwaysFail(message) => Err(message),
            Script::Hang => loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            },
        }
    }

    fn supported_types(&self) -> Vec<String> {
        vec!["balance_threshold".to_string()]
    }

    fn estimate_time(&self, _proof_type: &str) -> Option<Duration> {
        None
    }
}

fn mock_artifact(request: &ProofRequest) -> ProofArtifact {
    ProofArtifact {
        proof_id: uuid::Uuid::new_v4().to_string(),
        proof_bytes: vec![1, 2, 3, 4],
        verification_key: vec![5, 6, 7, 8],
        circuit_hash: format!("{}:test", request.proof_type),
        generated_at: chrono::Utc::now(),
        expires_at: None,
        public_inputs: request.public_inputs.clone(),
    }
}

/// Trivial verifier accepting everything; these tests never exercise
/// verification semantics.
struct PermissiveVerifier;

#[async_trait]
impl attestor::Verifier for PermissiveVerifier {
    async fn verify(&self, _request: &attestor::VerificationRequest) -> Result<bool, String> {
        Ok(true)
    }

    fn validate_public_inputs(&self, _proof_type: &str, _inputs: &InputMap) -> Result<(), String> {
        Ok(())
    }
}

struct HarnessBackend {
    generator: Arc<ScriptedGenerator>,
    verifier: PermissiveVerifier,
}

#[async_trait]
impl Generator for HarnessBackend {
    async fn generate(&self, request: &ProofRequest) -> Result<ProofArtifact, String> {
        self.generator.generate(request).await
    }

    fn supported_types(&self) -> Vec<String> {
        self.generator.supported_types()
    }

    fn estimate_time(&self, proof_type: &str) -> Option<Duration> {
        self.generator.estimate_time(proof_type)
    }
}

#[async_trait]
impl attestor::Verifier for HarnessBackend {
    async fn verify(&self, request: &attestor::VerificationRequest) -> Result<bool, String> {
        self.verifier.verify(request).await
    }

    fn validate_public_inputs(&self, proof_type: &str, inputs: &InputMap) -> Result<(), String> {
        self.verifier.validate_public_inputs(proof_type, inputs)
    }
}

pub struct TestHarness {
    pub engine: ProofEngine,
    pub generator: Arc<ScriptedGenerator>,
    labels: Mutex<HashMap<String, JobId>>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default(), Script::Succeed).await
    }

    /// A pool pinned to exactly one worker, so dispatch order is
    /// observable without concurrent interleaving.
    pub async fn new_serial() -> Self {
        let mut config = EngineConfig::default();
        config.pool.min_workers = 1;
        config.pool.max_workers = 1;
        Self::with_config(config, Script::Succeed).await
    }

    pub async fn with_script(script: Script) -> Self {
        Self::with_config(EngineConfig::default(), script).await
    }

    pub async fn with_config(config: EngineConfig, default_script: Script) -> Self {
        let generator = Arc::new(ScriptedGenerator::new(default_script));
        let backend = Arc::new(HarnessBackend {
            generator: generator.clone(),
            verifier: PermissiveVerifier,
        });
        let engine = ProofEngineBuilder::new(config)
            .backend(backend)
            .build()
            .expect("valid default config with a backend always builds");
        engine.start();
        Self {
            engine,
            generator,
            labels: Mutex::new(HashMap::new()),
        }
    }

    pub async fn submit_labeled(&self, label: &str, priority: i32) -> JobId {
        let mut public_inputs = InputMap::new();
        public_inputs.insert(LABEL_KEY.to_string(), InputValue::Decimal(label.to_string()));
        let request = ProofRequest {
            proof_type: "balance_threshold".to_string(),
            subject_id: None,
            account_id: None,
            public_inputs,
            private_inputs: InputMap::new(),
            options: ProofRequestOptions::default(),
        };
        let job_id = self
            .engine
            .submit_job(request, priority, Vec::new())
            .await
            .expect("well-formed request is always admitted");
        self.labels.lock().insert(label.to_string(), job_id);
        job_id
    }

    pub async fn submit_with_callbacks(&self, label: &str, callbacks: Vec<CallbackSink>) -> JobId {
        let mut public_inputs = InputMap::new();
        public_inputs.insert(LABEL_KEY.to_string(), InputValue::Decimal(label.to_string()));
        public_inputs.insert("balance".to_string(), InputValue::Integer(1_000));
        let mut private_inputs = InputMap::new();
        private_inputs.insert("balance".to_string(), InputValue::Integer(1_000));
        let request = ProofRequest {
            proof_type: "balance_threshold".to_string(),
            subject_id: None,
            account_id: None,
            public_inputs,
            private_inputs,
            options: ProofRequestOptions::default(),
        };
        let job_id = self
            .engine
            .submit_job(request, 0, callbacks)
            .await
            .expect("well-formed request is always admitted");
        self.labels.lock().insert(label.to_string(), job_id);
        job_id
    }

    /// Wait until the generator has recorded `count` dispatches, then
    /// translate the recorded labels back to job ids in dispatch order.
    pub async fn wait_for_label_order(&self, count: usize) -> Vec<JobId> {
        for _ in 0..200 {
            if self.generator.dispatch_order().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let labels = self.labels.lock().clone();
        self.generator
            .dispatch_order()
            .into_iter()
            .filter_map(|label| labels.get(&label).copied())
            .collect()
    }

    pub async fn wait_for_terminal(&self, job_id: JobId, timeout: Duration) -> attestor::JobStatus {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(status) = self.engine.get_job_status(job_id) {
                if status.is_terminal() {
                    return status;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("job {} did not reach a terminal state within {:?}", job_id, timeout);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
