pub mod evidence;
pub mod signal;
pub mod sources;

pub mod error;
pub mod cfg;
pub mod aggregate;
pub mod state;
pub mod decide;
pub mod result;

pub use evidence::{EvidenceKind, Locator, EvidenceRef, EvidenceKey, EmbeddingRef};
pub use signal::Signal;
pub use sources::{ProposerProfile, ProposerProfiles, default_proposer_profiles};

pub use error::ConfigError;
pub use cfg::{FusionCfg, BandCut, BandThresholds, RedispatchPolicy};
pub use aggregate::{Band, AggregatedResult, Aggregator};
pub use state::{RunState, WaveRecord, Verdict};
pub use decide::{DecisionPolicy, TrustDecision, TrustPolicy};
pub use result::{CfmomResult, DropReason, Rejection, FailureKind, ProposerFailure, Termination};
