//! Proof orchestration engine for a privacy-preserving reserve-attestation
//! platform.
//!
//! Accepts proof requests, schedules them onto an elastic worker pool
//! against a pluggable generator/verifier backend, retries transient
//! failures with backoff, and fans terminal results out to registered
//! callback sinks. Generation and verification cryptography, durable
//! storage, caller authentication, and wire framing are all external
//! collaborators this crate orchestrates rather than implements.

#![deny(clippy::unwrap_used)]

pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod generator;
pub mod job;
pub mod pool;
pub mod progress;
pub mod proof;
pub mod queue;
pub mod repository;
pub mod request;
pub mod result;
pub mod result_store;
pub mod scheduler;
pub mod worker;

pub use config::EngineConfig;
pub use engine::{ProofBackend, ProofEngine, ProofEngineBuilder};
pub use error::{EngineError, EngineResult};
pub use generator::{CompositeGenerator, Generator, MockGenerator, MockVerifier, Verifier};
pub use job::{CallbackKind, CallbackSink, Job, JobId, JobStatus};
pub use proof::{ProofArtifact, ProofSummary};
pub use request::{InputMap, InputValue, ProofRequest, ProofRequestOptions, VerificationRequest};
pub use result::JobResult;
