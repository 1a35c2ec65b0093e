//! Declarative configuration for the orchestration engine (spec §4.8).
//!
//! Mirrors the teacher's `ConfigLoader` shape: nested sections, each with
//! its own `validate()`, overridable from environment variables, with
//! `AppConfig::validate()` failing fast on the first invalid section.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub queue: QueueConfig,
    pub result_store: ResultStoreConfig,
    pub callback: CallbackConfig,
    pub scale: ScaleConfig,
}

impl EngineConfig {
    /// Validate every section; fails on the first violation.
    pub fn validate(&self) -> EngineResult<()> {
        self.pool.validate()?;
        self.queue.validate()?;
        self.result_store.validate()?;
        self.callback.validate()?;
        self.scale.validate()?;
        Ok(())
    }

    /// Load configuration from environment variables, overriding defaults,
    /// then validate (spec §6's "subset consumed by core").
    pub fn from_env() -> EngineResult<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ATTESTOR_MIN_WORKERS") {
            config.pool.min_workers = parse_env("ATTESTOR_MIN_WORKERS", &val)?;
        }
        if let Ok(val) = std::env::var("ATTESTOR_MAX_WORKERS") {
            config.pool.max_workers = parse_env("ATTESTOR_MAX_WORKERS", &val)?;
        }
        if let Ok(val) = std::env::var("ATTESTOR_WORKER_TIMEOUT_SECS") {
            let secs: u64 = parse_env("ATTESTOR_WORKER_TIMEOUT_SECS", &val)?;
            config.pool.worker_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("ATTESTOR_DEFAULT_TTL_SECS") {
            let secs: u64 = parse_env("ATTESTOR_DEFAULT_TTL_SECS", &val)?;
            config.pool.default_proof_ttl = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("ATTESTOR_RESULT_STORE_CAPACITY") {
            config.result_store.capacity = parse_env("ATTESTOR_RESULT_STORE_CAPACITY", &val)?;
        }
        if let Ok(val) = std::env::var("ATTESTOR_CALLBACK_TIMEOUT_SECS") {
            let secs: u64 = parse_env("ATTESTOR_CALLBACK_TIMEOUT_SECS", &val)?;
            config.callback.default_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("ATTESTOR_CALLBACK_RETRY_CAP") {
            config.callback.default_retry_cap = parse_env("ATTESTOR_CALLBACK_RETRY_CAP", &val)?;
        }
        if let Ok(val) = std::env::var("ATTESTOR_SCALE_INTERVAL_SECS") {
            let secs: u64 = parse_env("ATTESTOR_SCALE_INTERVAL_SECS", &val)?;
            config.scale.scale_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("ATTESTOR_QUEUE_KIND") {
            config.queue.kind = QueueKind::parse(&val)?;
        }
        if let Ok(val) = std::env::var("ATTESTOR_BROKER_URL") {
            config.queue.broker_url = Some(val);
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            queue: QueueConfig::default(),
            result_store: ResultStoreConfig::default(),
            callback: CallbackConfig::default(),
            scale: ScaleConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> EngineResult<T> {
    raw.parse::<T>()
        .map_err(|_| EngineError::Validation(format!("invalid value for {}: {}", name, raw)))
}

/// Worker pool bounds and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Floor on concurrent workers.
    pub min_workers: usize,
    /// Ceiling on concurrent workers.
    pub max_workers: usize,
    /// Soft per-job timeout applied when a job carries none of its own.
    pub worker_timeout: Duration,
    /// Default proof TTL when the caller doesn't supply one.
    pub default_proof_ttl: Duration,
    /// Offer acceptance window a worker waits on an inbound job (spec §4.5).
    pub offer_timeout: Duration,
    /// Batch size / timeout for the optional batched paths (spec §4.7).
    pub batch_size: usize,
    pub batch_timeout: Duration,
}

impl PoolConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.min_workers == 0 {
            return Err(EngineError::Validation(
                "pool.min_workers must be at least 1".into(),
            ));
        }
        if self.max_workers < self.min_workers {
            return Err(EngineError::Validation(
                "pool.max_workers must be >= pool.min_workers".into(),
            ));
        }
        if self.worker_timeout.is_zero() {
            return Err(EngineError::Validation(
                "pool.worker_timeout must be positive".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(EngineError::Validation(
                "pool.batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 16,
            worker_timeout: Duration::from_secs(60),
            default_proof_ttl: Duration::from_secs(24 * 3600),
            offer_timeout: Duration::from_millis(100),
            batch_size: 16,
            batch_timeout: Duration::from_secs(5),
        }
    }
}

/// Which queue backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Unbounded in-memory priority queue (the only kind this core implements).
    InMemory,
    /// An external broker; the core only validates the configuration shape
    /// since brokered dispatch is an external collaborator (spec §1).
    External,
}

impl QueueKind {
    fn parse(raw: &str) -> EngineResult<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Ok(Self::InMemory),
            "external" | "broker" => Ok(Self::External),
            other => Err(EngineError::Validation(format!(
                "unknown queue kind: {}",
                other
            ))),
        }
    }
}

/// Queue backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub kind: QueueKind,
    /// Required when `kind` is `External`.
    pub broker_url: Option<String>,
}

impl QueueConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.kind == QueueKind::External && self.broker_url.is_none() {
            return Err(EngineError::Validation(
                "queue.broker_url is required when queue.kind is external".into(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: QueueKind::InMemory,
            broker_url: None,
        }
    }
}

/// Result store bounds (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultStoreConfig {
    pub capacity: usize,
}

impl ResultStoreConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.capacity == 0 {
            return Err(EngineError::Validation(
                "result_store.capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ResultStoreConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Callback dispatcher defaults (spec §4.3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    pub default_timeout: Duration,
    pub default_retry_cap: u32,
}

impl CallbackConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.default_timeout.is_zero() {
            return Err(EngineError::Validation(
                "callback.default_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            default_retry_cap: 3,
        }
    }
}

/// Autoscaling policy (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub scale_interval: Duration,
    pub scale_up_threshold: usize,
    pub scale_up_step: usize,
    pub scale_down_threshold: usize,
    pub scale_down_step: usize,
    /// How long a worker must sit idle before it counts toward scale-down.
    pub idle_threshold: Duration,
}

impl ScaleConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.scale_interval.is_zero() {
            return Err(EngineError::Validation(
                "scale.scale_interval must be positive".into(),
            ));
        }
        if self.scale_up_step == 0 || self.scale_down_step == 0 {
            return Err(EngineError::Validation(
                "scale.scale_up_step and scale_down_step must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            scale_interval: Duration::from_secs(10),
            scale_up_threshold: 5,
            scale_up_step: 2,
            scale_down_threshold: 1,
            scale_down_step: 1,
            idle_threshold: Duration::from_secs(60),
        }
    }
}
