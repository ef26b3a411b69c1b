use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::Band;
use crate::error::ConfigError;

fn validate_ratio(value: f64, name: &str) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange {
            name: name.to_string(),
            value,
        })
    }
}

/// Whether a proposer that failed in one wave is dispatched again later.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedispatchPolicy {
    /// A failed proposer is never dispatched again and stays failed for the run.
    #[default]
    ExcludeFailed,
    /// Every proposer is dispatched every wave; the latest attempt decides
    /// whether it ends the run completed or failed.
    RetryFailed,
}

/// Lower cut point of one named band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandCut {
    pub name: String,
    pub lower: f64,
}

impl BandCut {
    pub fn new(name: impl Into<String>, lower: f64) -> Self {
        Self {
            name: name.into(),
            lower,
        }
    }
}

/// Ordered score cut points. Each band covers `[lower, next.lower)`; the top
/// band is unbounded above and scores below the first cut land in the first band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandThresholds(Vec<BandCut>);

impl BandThresholds {
    pub fn new(cuts: Vec<BandCut>) -> Result<Self, ConfigError> {
        let t = Self(cuts);
        t.validate()?;
        Ok(t)
    }

    pub fn cuts(&self) -> &[BandCut] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.0.is_empty() {
            return Err(ConfigError::EmptyBands);
        }
        for cut in &self.0 {
            validate_ratio(cut.lower, &format!("band_thresholds.{}", cut.name))?;
        }
        for pair in self.0.windows(2) {
            if pair[1].lower <= pair[0].lower {
                return Err(ConfigError::UnorderedBands {
                    prev_name: pair[0].name.clone(),
                    prev: pair[0].lower,
                    lower_name: pair[1].name.clone(),
                    lower: pair[1].lower,
                });
            }
        }
        Ok(())
    }

    /// Lowest band. Used for empty evidence.
    pub fn floor(&self) -> Band {
        self.band_at(0)
    }

    /// Classify a score. Inclusive lower bound, exclusive upper bound.
    pub fn classify(&self, score: f64) -> Band {
        let mut rank = 0usize;
        for (i, cut) in self.0.iter().enumerate() {
            if score >= cut.lower {
                rank = i;
            } else {
                break;
            }
        }
        self.band_at(rank)
    }

    fn band_at(&self, rank: usize) -> Band {
        match self.0.get(rank) {
            Some(cut) => Band::new(rank, cut.name.clone()),
            None => Band::new(0, "none"),
        }
    }
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self(vec![
            BandCut::new("low", 0.0),
            BandCut::new("medium", 0.4),
            BandCut::new("high", 0.8),
        ])
    }
}

/// Run configuration for one fusion run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionCfg {
    pub max_waves: u32,
    pub per_wave_deadline_ms: u64,
    pub overall_deadline_ms: u64,
    pub early_exit_threshold: f64,
    /// A single validated signal at or above this confidence ends the run.
    pub single_signal_exit: Option<f64>,
    pub band_thresholds: BandThresholds,
    pub evidence_retry_limit: u32,
    /// First retry delay for unreachable stores; doubles on every retry.
    pub evidence_retry_backoff_ms: u64,
    pub redispatch: RedispatchPolicy,
    /// Drop signals that cite no evidence at all.
    pub require_evidence: bool,
}

impl Default for FusionCfg {
    fn default() -> Self {
        Self {
            max_waves: 3,
            per_wave_deadline_ms: 2_000,
            overall_deadline_ms: 10_000,
            early_exit_threshold: 0.8,
            single_signal_exit: None,
            band_thresholds: BandThresholds::default(),
            evidence_retry_limit: 2,
            evidence_retry_backoff_ms: 50,
            redispatch: RedispatchPolicy::default(),
            require_evidence: false,
        }
    }
}

impl FusionCfg {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: FusionCfg = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_waves < 1 {
            return Err(ConfigError::ZeroWaves);
        }
        if self.per_wave_deadline_ms == 0 {
            return Err(ConfigError::ZeroDeadline("per_wave_deadline_ms"));
        }
        if self.overall_deadline_ms == 0 {
            return Err(ConfigError::ZeroDeadline("overall_deadline_ms"));
        }
        validate_ratio(self.early_exit_threshold, "early_exit_threshold")?;
        if let Some(v) = self.single_signal_exit {
            validate_ratio(v, "single_signal_exit")?;
        }
        self.band_thresholds.validate()
    }

    #[inline]
    pub fn per_wave_deadline(&self) -> Duration {
        Duration::from_millis(self.per_wave_deadline_ms)
    }

    #[inline]
    pub fn overall_deadline(&self) -> Duration {
        Duration::from_millis(self.overall_deadline_ms)
    }

    #[inline]
    pub fn evidence_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.evidence_retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_inclusive_lower() {
        let t = BandThresholds::default();
        assert_eq!(t.classify(0.0).name, "low");
        assert_eq!(t.classify(0.39).name, "low");
        assert_eq!(t.classify(0.4).name, "medium");
        assert_eq!(t.classify(0.8).name, "high");
        assert_eq!(t.classify(1.0).name, "high");
        assert_eq!(t.classify(0.8).rank, 2);
    }

    #[test]
    fn below_first_cut_is_floor() {
        let t = BandThresholds::new(vec![BandCut::new("weak", 0.2), BandCut::new("strong", 0.6)]).unwrap();
        assert_eq!(t.classify(0.1), t.floor());
        assert_eq!(t.classify(0.1).name, "weak");
    }

    #[test]
    fn unordered_bands_rejected() {
        let err = BandThresholds::new(vec![BandCut::new("a", 0.5), BandCut::new("b", 0.5)]).unwrap_err();
        assert!(matches!(err, ConfigError::UnorderedBands { .. }));
        assert!(matches!(BandThresholds::new(vec![]), Err(ConfigError::EmptyBands)));
    }

    #[test]
    fn zero_waves_rejected() {
        let cfg = FusionCfg { max_waves: 0, ..FusionCfg::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroWaves)));
        assert!(FusionCfg::default().validate().is_ok());
    }

    #[test]
    fn threshold_range_checked() {
        let cfg = FusionCfg { early_exit_threshold: 1.5, ..FusionCfg::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::ThresholdOutOfRange { .. })));

        let cfg = FusionCfg { single_signal_exit: Some(f64::NAN), ..FusionCfg::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_toml_with_defaults() {
        let cfg = FusionCfg::from_toml_str(
            r#"
            max_waves = 2
            early_exit_threshold = 0.9
            redispatch = "retry_failed"

            [[band_thresholds]]
            name = "allow"
            lower = 0.0

            [[band_thresholds]]
            name = "block"
            lower = 0.7
            "#,
        )
        .unwrap();

        assert_eq!(cfg.max_waves, 2);
        assert_eq!(cfg.redispatch, RedispatchPolicy::RetryFailed);
        assert_eq!(cfg.band_thresholds.len(), 2);
        assert_eq!(cfg.per_wave_deadline_ms, 2_000);
        assert_eq!(cfg.overall_deadline(), Duration::from_secs(10));
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = FusionCfg::from_toml_str("max_waves = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = FusionCfg::from_toml_str("max_waves = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWaves));
    }
}
