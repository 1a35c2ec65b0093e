//! Proof and verification request shapes (spec §6).
//!
//! Public/private input maps hold heterogeneous values. Rather than a
//! dynamically-typed blob, they are modeled as a tagged variant with
//! explicit typed accessors (spec §9 "Heterogeneous input maps").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single value inside a public or private input map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputValue {
    Integer(i64),
    /// Arbitrary-precision decimal carried as its canonical string form.
    Decimal(String),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    List(Vec<InputValue>),
    Map(HashMap<String, InputValue>),
}

impl InputValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            InputValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&str> {
        match self {
            InputValue::Decimal(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            InputValue::Bytes(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[InputValue]> {
        match self {
            InputValue::List(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, InputValue>> {
        match self {
            InputValue::Map(v) => Some(v),
            _ => None,
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        hex::decode(raw).map_err(serde::de::Error::custom)
    }
}

/// Input map: a proof type's public or private witness values.
pub type InputMap = HashMap<String, InputValue>;

/// Caller-supplied options accompanying a proof request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProofRequestOptions {
    /// Overrides the engine's default proof TTL, in seconds.
    pub expires_in_secs: Option<u64>,
}

/// A request to generate a proof (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRequest {
    /// Proof category, e.g. "balance_threshold", "solvency_ratio",
    /// "merkle_inclusion", "portfolio_aggregate".
    pub proof_type: String,
    pub subject_id: Option<String>,
    pub account_id: Option<String>,
    pub public_inputs: InputMap,
    pub private_inputs: InputMap,
    pub options: ProofRequestOptions,
}

impl ProofRequest {
    /// Structural validation required before the request is admitted
    /// (spec §4.7): non-empty type, inputs present. Per-type validation is
    /// delegated to the generator via [`crate::generator::Generator::validate`].
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.proof_type.trim().is_empty() {
            return Err("invalid input: proof_type must not be empty".to_string());
        }
        Ok(())
    }
}

/// A request to verify a previously generated proof (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// Identifier of a stored proof record, if verifying one the engine
    /// already generated.
    pub proof_id: Option<String>,
    pub proof_bytes: Vec<u8>,
    pub public_inputs: InputMap,
    pub verification_key: Vec<u8>,
    pub circuit_hash: String,
}
