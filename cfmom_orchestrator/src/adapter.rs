//! Collaborator boundary: proposers, evidence stores, and signal normalization.
//!
//! The orchestrator does not know how a proposer reaches its judgment or how
//! a store persists data. It only holds these capabilities:
//! - `Proposer`: one async invocation per wave
//! - `EvidenceVerifier`: read-only existence and hash lookups
//!
//! New proposer variants and new evidence stores plug in here without
//! touching fusion logic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cfmom_core::{AggregatedResult, EvidenceKind, Signal};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProposerError, StoreError};

/// What a proposer sees when it is invoked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaveContext {
    pub correlation_id: Uuid,
    /// 1-based wave number.
    pub wave: u32,
    /// Aggregate after the previous wave, for adaptive proposers. `None` in wave 1.
    pub prior: Option<AggregatedResult>,
    /// Validated signals accumulated before this wave.
    pub admitted_so_far: usize,
}

/// An independent evaluator. Variants (model-backed, rule-based, lookup-based)
/// differ only in the body of `invoke`.
#[async_trait]
pub trait Proposer: Send + Sync {
    /// Stable identity, unique within a run.
    fn id(&self) -> &str;

    /// Produce this wave's claims. Invoked fresh every wave the proposer takes part in.
    async fn invoke(&self, ctx: &WaveContext) -> Result<Vec<Signal>, ProposerError>;
}

/// Read-only verification capability of one evidence store.
///
/// Both calls must be idempotent and safe to issue concurrently.
#[async_trait]
pub trait EvidenceVerifier: Send + Sync {
    async fn exists(&self, kind: &EvidenceKind, id: &str) -> Result<bool, StoreError>;

    async fn hash(&self, kind: &EvidenceKind, id: &str) -> Result<Vec<u8>, StoreError>;
}

/// Evidence stores by namespace.
#[derive(Clone, Default)]
pub struct EvidenceStores {
    stores: HashMap<String, Arc<dyn EvidenceVerifier>>,
}

impl EvidenceStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, store: impl Into<String>, verifier: Arc<dyn EvidenceVerifier>) {
        self.stores.insert(store.into(), verifier);
    }

    pub fn with(mut self, store: impl Into<String>, verifier: Arc<dyn EvidenceVerifier>) -> Self {
        self.register(store, verifier);
        self
    }

    pub fn get(&self, store: &str) -> Option<&Arc<dyn EvidenceVerifier>> {
        self.stores.get(store)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl fmt::Debug for EvidenceStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EvidenceStores").field("stores", &names).finish()
    }
}

/// Lightweight normalization of admitted signals.
///
/// This does not impose policy; it only maps proposer-supplied numbers into
/// the ranges the aggregator expects. The raw signal stays in the audit list.
#[derive(Clone, Copy, Debug)]
pub struct Normalizer {
    /// Clamp confidence into [0, 1]. Non-finite confidence always becomes 0.
    pub clamp_confidence: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            clamp_confidence: true,
        }
    }
}

impl Normalizer {
    #[inline]
    fn clamp01(x: f64) -> f64 {
        if !x.is_finite() {
            return 0.0;
        }
        x.clamp(0.0, 1.0)
    }

    pub fn normalize(&self, signal: &Signal) -> Signal {
        let mut out = signal.clone();
        out.confidence = if self.clamp_confidence {
            Self::clamp01(signal.confidence)
        } else if signal.confidence.is_finite() {
            signal.confidence
        } else {
            0.0
        };
        // 0 means "use the proposer's base weight".
        if !out.weight.is_finite() || out.weight < 0.0 {
            out.weight = 0.0;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_and_resets() {
        let n = Normalizer::default();
        let s = n.normalize(&Signal::new("p", 1.7).with_weight(f64::INFINITY));
        assert_eq!(s.confidence, 1.0);
        assert_eq!(s.weight, 0.0);

        let s = n.normalize(&Signal::new("p", f64::NAN).with_weight(-2.0));
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.weight, 0.0);

        let s = n.normalize(&Signal::new("p", 0.3).with_weight(0.5));
        assert_eq!(s.confidence, 0.3);
        assert_eq!(s.weight, 0.5);
    }

    #[test]
    fn stores_debug_lists_names() {
        struct Nothing;

        #[async_trait]
        impl EvidenceVerifier for Nothing {
            async fn exists(&self, _kind: &EvidenceKind, _id: &str) -> Result<bool, StoreError> {
                Ok(false)
            }

            async fn hash(&self, _kind: &EvidenceKind, _id: &str) -> Result<Vec<u8>, StoreError> {
                Err(StoreError::Fault("empty".into()))
            }
        }

        let stores = EvidenceStores::new()
            .with("logs", Arc::new(Nothing))
            .with("docs", Arc::new(Nothing));
        assert_eq!(stores.len(), 2);
        assert!(stores.get("docs").is_some());
        assert_eq!(format!("{stores:?}"), r#"EvidenceStores { stores: ["docs", "logs"] }"#);
    }
}
