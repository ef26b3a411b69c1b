use serde::{Deserialize, Serialize};

use crate::evidence::{EmbeddingRef, EvidenceRef};

/// One proposer's claim.
///
/// Signals are never edited after emission. A proposer that changes its mind
/// emits a new signal in a later wave.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub proposer: String,
    /// Claimed confidence in [0, 1].
    pub confidence: f64,
    /// Requested weight. 0 means "use the proposer's base weight".
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingRef>,
}

impl Signal {
    pub fn new(proposer: impl Into<String>, confidence: f64) -> Self {
        Self {
            proposer: proposer.into(),
            confidence,
            weight: 0.0,
            payload: serde_json::Value::Null,
            evidence: Vec::new(),
            embedding: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_evidence(mut self, evidence: EvidenceRef) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn with_embedding(mut self, embedding: EmbeddingRef) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[inline]
    pub fn cites_evidence(&self) -> bool {
        !self.evidence.is_empty()
    }
}
