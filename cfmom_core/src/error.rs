use thiserror::Error;

/// Invalid run configuration. This is the only error a run surfaces to its
/// caller, and it is raised before any wave starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_waves must be at least 1")]
    ZeroWaves,

    #[error("{0} must be greater than zero")]
    ZeroDeadline(&'static str),

    #[error("{name} must be between 0.0 and 1.0, got {value}")]
    ThresholdOutOfRange { name: String, value: f64 },

    #[error("band thresholds must contain at least one band")]
    EmptyBands,

    #[error("band thresholds must be strictly increasing: {lower} ({lower_name}) is not above {prev} ({prev_name})")]
    UnorderedBands {
        prev_name: String,
        prev: f64,
        lower_name: String,
        lower: f64,
    },

    #[error("at least one proposer is required")]
    NoProposers,

    #[error("proposer id {0:?} is registered more than once")]
    DuplicateProposer(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
