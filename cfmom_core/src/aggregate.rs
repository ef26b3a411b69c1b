use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cfg::FusionCfg;
use crate::signal::Signal;
use crate::sources::ProposerProfiles;

/// Discrete classification of a score. `rank` 0 is the weakest band.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Band {
    pub rank: usize,
    pub name: String,
}

impl Band {
    pub fn new(rank: usize, name: impl Into<String>) -> Self {
        Self {
            rank,
            name: name.into(),
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub score: f64,
    pub band: Band,
    pub early_exit: bool,
    /// Number of validated signals fused into `score`.
    pub signal_count: usize,
}

/// Fuses validated signals into an `AggregatedResult`.
///
/// The score is a noisy-OR over per-signal strengths
/// (`confidence * trust weight`): `1 - prod(1 - s_i)`. Every factor is in
/// [0, 1], so adding a signal never lowers the score. Factors are sorted
/// before multiplying, which makes the score bit-identical for every
/// ordering of the same multiset.
#[derive(Clone, Debug)]
pub struct Aggregator {
    cfg: FusionCfg,
    profiles: Option<ProposerProfiles>,
}

impl Aggregator {
    pub fn new(cfg: FusionCfg) -> Self {
        Self { cfg, profiles: None }
    }

    pub fn with_profiles(mut self, profiles: ProposerProfiles) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn set_profiles(&mut self, profiles: ProposerProfiles) {
        self.profiles = Some(profiles);
    }

    pub fn cfg(&self) -> &FusionCfg {
        &self.cfg
    }

    /// Strength of one signal in [0, 1].
    pub fn strength(&self, signal: &Signal) -> f64 {
        let confidence = unit(signal.confidence);
        let weight = match &self.profiles {
            Some(p) => p.weight_for(&signal.proposer, signal.weight),
            None if signal.weight == 0.0 => 1.0,
            None => unit(signal.weight),
        };
        confidence * weight
    }

    /// Fuse the cumulative set of validated signals.
    pub fn aggregate<'a, I>(&self, signals: I) -> AggregatedResult
    where
        I: IntoIterator<Item = &'a Signal>,
    {
        let mut misses: Vec<f64> = Vec::new();
        let mut single_hit = false;

        for s in signals {
            misses.push(1.0 - self.strength(s));
            if let Some(cut) = self.cfg.single_signal_exit {
                if unit(s.confidence) >= cut {
                    single_hit = true;
                }
            }
        }

        if misses.is_empty() {
            return AggregatedResult {
                score: 0.0,
                band: self.cfg.band_thresholds.floor(),
                early_exit: false,
                signal_count: 0,
            };
        }

        misses.sort_by(|a, b| a.total_cmp(b));
        let miss = misses.iter().fold(1.0_f64, |acc, m| acc * m);
        let score = (1.0 - miss).clamp(0.0, 1.0);

        AggregatedResult {
            score,
            band: self.cfg.band_thresholds.classify(score),
            early_exit: score >= self.cfg.early_exit_threshold || single_hit,
            signal_count: misses.len(),
        }
    }
}

#[inline]
fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ProposerProfile;

    fn sig(p: &str, c: f64) -> Signal {
        Signal::new(p, c)
    }

    #[test]
    fn empty_is_floor() {
        let agg = Aggregator::new(FusionCfg::default());
        let none: [Signal; 0] = [];
        let r = agg.aggregate(&none);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.band.name, "low");
        assert!(!r.early_exit);
        assert_eq!(r.signal_count, 0);
    }

    #[test]
    fn noisy_or_of_three() {
        let agg = Aggregator::new(FusionCfg::default());
        let signals = [sig("a", 0.9), sig("b", 0.1), sig("c", 0.1)];
        let r = agg.aggregate(&signals);
        assert!((r.score - (1.0 - 0.1 * 0.9 * 0.9)).abs() < 1e-12);
        assert_eq!(r.band.name, "high");
        assert!(r.early_exit);
    }

    #[test]
    fn profiles_scale_strength() {
        let profiles = ProposerProfiles::new().with("geo", ProposerProfile::new(0.5, 0.5, 0.5));
        let agg = Aggregator::new(FusionCfg::default()).with_profiles(profiles);
        let r = agg.aggregate(&[sig("geo", 0.9)]);
        assert!((r.score - 0.45).abs() < 1e-12);
        assert_eq!(r.band.name, "medium");
    }

    #[test]
    fn single_signal_exit() {
        let cfg = FusionCfg {
            early_exit_threshold: 1.0,
            single_signal_exit: Some(0.95),
            ..FusionCfg::default()
        };
        let agg = Aggregator::new(cfg);
        assert!(!agg.aggregate(&[sig("a", 0.9)]).early_exit);
        assert!(agg.aggregate(&[sig("a", 0.96)]).early_exit);
    }

    #[test]
    fn garbage_confidence_counts_as_zero() {
        let agg = Aggregator::new(FusionCfg::default());
        let r = agg.aggregate(&[sig("a", f64::NAN), sig("b", -3.0)]);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.signal_count, 2);
    }
}
