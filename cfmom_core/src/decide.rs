//cfmom_core/decide.rs

use serde::{Deserialize, Serialize};

use crate::aggregate::Band;

/// Maps a band to a caller-domain decision. Implementations must be pure.
pub trait DecisionPolicy {
    type Decision;

    fn decide(&self, band: &Band) -> Self::Decision;

    /// Decision for a run in which no proposer completed. Defaults to
    /// deciding on the (empty-evidence) band.
    fn exhausted(&self, band: &Band) -> Self::Decision {
        self.decide(band)
    }
}

impl<D, F> DecisionPolicy for F
where
    F: Fn(&Band) -> D,
{
    type Decision = D;

    fn decide(&self, band: &Band) -> D {
        self(band)
    }
}

/// Trust-system decision: let it through, ask for more proof, or refuse.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrustDecision {
    Allow,
    Challenge,
    Block,
}

/// Rank-based trust policy. Bands below `challenge_from` allow, bands at or
/// above `block_from` block, everything between challenges. A run with no
/// completed proposer challenges rather than allowing on zero evidence.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrustPolicy {
    pub challenge_from: usize,
    pub block_from: usize,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            challenge_from: 1,
            block_from: 2,
        }
    }
}

impl DecisionPolicy for TrustPolicy {
    type Decision = TrustDecision;

    fn decide(&self, band: &Band) -> TrustDecision {
        if band.rank >= self.block_from {
            TrustDecision::Block
        } else if band.rank >= self.challenge_from {
            TrustDecision::Challenge
        } else {
            TrustDecision::Allow
        }
    }

    fn exhausted(&self, _band: &Band) -> TrustDecision {
        TrustDecision::Challenge
    }
}
