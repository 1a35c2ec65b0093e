//! Proof artifacts and the summary form exposed to callback sinks (spec §3).

use crate::request::InputMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque proof bytes plus the metadata needed to verify or display them.
///
/// Private inputs never appear here: they never leave the generator
/// boundary (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofArtifact {
    pub proof_id: String,
    #[serde(with = "hex_bytes")]
    pub proof_bytes: Vec<u8>,
    pub verification_key: Vec<u8>,
    pub circuit_hash: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Echo of the public inputs the proof was generated against.
    pub public_inputs: InputMap,
}

impl ProofArtifact {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }

    pub fn summary(&self, proof_type: &str) -> ProofSummary {
        ProofSummary {
            id: self.proof_id.clone(),
            circuit_id: self.circuit_hash.clone(),
            proof_type: proof_type.to_string(),
            generated_at: self.generated_at,
            proof_size: self.proof_bytes.len(),
        }
    }
}

/// The only proof-related information a callback payload may carry unless
/// the sink explicitly opts into raw bytes (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofSummary {
    pub id: String,
    pub circuit_id: String,
    pub proof_type: String,
    pub generated_at: DateTime<Utc>,
    pub proof_size: usize,
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
