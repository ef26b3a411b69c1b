use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------
// Proposer profiles: control how much each proposer can influence the
// fused score, without trusting proposer-supplied weights.
// ---------------------------------------------------------------------

/// Per-proposer trust profile: the default weight and how far a signal may
/// move away from it. All weights live in [0, 1].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposerProfile {
    /// Weight used when the signal doesn't request one (requests 0).
    pub base_weight: f64,
    pub min_weight: f64,
    pub max_weight: f64,
}

impl ProposerProfile {
    pub fn new(base_weight: f64, min_weight: f64, max_weight: f64) -> Self {
        let min_weight = min_weight.clamp(0.0, 1.0);
        let max_weight = max_weight.clamp(min_weight, 1.0);
        Self {
            base_weight: base_weight.clamp(min_weight, max_weight),
            min_weight,
            max_weight,
        }
    }

    /// Clamp a requested weight into this profile's [min, max] band,
    /// falling back to base_weight when requested is 0 or not finite.
    pub fn clamp(&self, requested: f64) -> f64 {
        let w = if requested == 0.0 || !requested.is_finite() {
            self.base_weight
        } else {
            requested
        };
        w.clamp(self.min_weight, self.max_weight)
    }
}

impl Default for ProposerProfile {
    /// Full trust; requested weights are only bounded to [0, 1].
    fn default() -> Self {
        Self::new(1.0, 0.0, 1.0)
    }
}

/// Trust table keyed by proposer id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProposerProfiles {
    #[serde(default)]
    pub profiles: HashMap<String, ProposerProfile>,
    /// Applied to proposers missing from `profiles`. When unset, unknown
    /// proposers are treated as a soft hint with low influence.
    #[serde(default)]
    pub fallback: Option<ProposerProfile>,
}

impl ProposerProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, proposer: impl Into<String>, profile: ProposerProfile) -> Self {
        self.profiles.insert(proposer.into(), profile);
        self
    }

    pub fn with_fallback(mut self, profile: ProposerProfile) -> Self {
        self.fallback = Some(profile);
        self
    }

    pub fn get(&self, proposer: &str) -> Option<&ProposerProfile> {
        self.profiles.get(proposer)
    }

    /// Effective weight of a signal from `proposer` requesting `requested`.
    pub fn weight_for(&self, proposer: &str, requested: f64) -> f64 {
        match self.profiles.get(proposer) {
            Some(p) => p.clamp(requested),
            None => match &self.fallback {
                Some(p) => p.clamp(requested),
                None => ProposerProfile::new(0.2, 0.1, 0.4).clamp(requested),
            },
        }
    }
}

/// Build a small default profile table for a trust-decision deployment.
/// These are *relative* importance hints, not absolutes.
pub fn default_proposer_profiles() -> ProposerProfiles {
    ProposerProfiles::new()
        // Language-model classifier: primary reasoning source.
        .with("llm", ProposerProfile::new(1.0, 0.5, 1.0))
        // Rule engines are precise but narrow.
        .with("rules", ProposerProfile::new(0.9, 0.5, 1.0))
        // Bot-signal detectors: important but noisy.
        .with("bot_signal", ProposerProfile::new(0.8, 0.3, 0.9))
        // Geo lookups corroborate more than they decide.
        .with("geo", ProposerProfile::new(0.6, 0.2, 0.8))
        // Generic vendor classifiers.
        .with("vendor", ProposerProfile::new(0.4, 0.1, 0.6))
}
