//! cfmom_orchestrator
//!
//! Outside-world facing orchestration layer for `cfmom_core`.
//!
//! Responsibilities:
//! - dispatch proposers in concurrent waves under per-wave and run deadlines
//! - verify each signal's evidence against the stores that hold it
//! - fold every wave into the core `RunState` and stop as soon as the
//!   aggregate allows
//!
//! Non-goals:
//! - no proposer logic (callers implement `Proposer`)
//! - no storage (callers implement `EvidenceVerifier`)
//! - no transport; the returned `CfmomResult` is plain data

pub mod adapter;
pub mod cancel;
pub mod constrainer;
pub mod error;
pub mod orchestrator;
pub mod scheduler;

pub use adapter::{
    WaveContext,
    Proposer,
    EvidenceVerifier,
    EvidenceStores,
    Normalizer,
};

pub use cancel::{cancellation, CancelHandle, CancelToken};
pub use constrainer::Constrainer;
pub use error::{ProposerError, StoreError};
pub use orchestrator::{run, Orchestrator};
pub use scheduler::{dispatch_wave, WaveOutcome};
