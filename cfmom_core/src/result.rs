use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::AggregatedResult;
use crate::signal::Signal;

/// Why the constrainer dropped a signal. `evidence` names the first
/// reference that failed, as `kind:store/id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// The store does not hold the unit, or no store is registered under that name.
    Unresolvable { evidence: String },
    /// The unit exists but its content changed. Never retried.
    HashMismatch { evidence: String },
    /// The store could not be reached within the retry budget.
    StoreUnreachable { evidence: String, attempts: u32 },
    StoreFault { evidence: String, message: String },
    /// The run was cancelled before the store answered.
    Interrupted { evidence: String },
    /// The signal cites no evidence and the run requires some.
    NoEvidence,
}

impl DropReason {
    /// Unreachable stores may recover; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DropReason::StoreUnreachable { .. })
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Unresolvable { evidence } => write!(f, "unresolvable evidence {evidence}"),
            DropReason::HashMismatch { evidence } => write!(f, "hash mismatch on {evidence}"),
            DropReason::StoreUnreachable { evidence, attempts } => {
                write!(f, "store unreachable for {evidence} after {attempts} attempt(s)")
            }
            DropReason::StoreFault { evidence, message } => write!(f, "store fault on {evidence}: {message}"),
            DropReason::Interrupted { evidence } => write!(f, "verification of {evidence} interrupted"),
            DropReason::NoEvidence => write!(f, "no evidence cited"),
        }
    }
}

/// One entry of the constrainer's drop ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Index into `CfmomResult::signals`.
    pub signal_index: usize,
    pub wave: u32,
    pub proposer: String,
    pub reason: DropReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Error,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Error => write!(f, "error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerFailure {
    pub proposer: String,
    pub wave: u32,
    pub kind: FailureKind,
    pub message: String,
}

/// What ended the wave loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    EarlyExit,
    MaxWaves,
    Deadline,
    /// No proposer completed a wave.
    Exhausted,
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::EarlyExit => write!(f, "early_exit"),
            Termination::MaxWaves => write!(f, "max_waves"),
            Termination::Deadline => write!(f, "deadline"),
            Termination::Exhausted => write!(f, "exhausted"),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal record of one fusion run. Plain data: safe to clone, send, and
/// serialize across process boundaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CfmomResult<D> {
    pub correlation_id: Uuid,
    pub decision: D,
    pub reason: String,
    pub aggregate: AggregatedResult,
    /// Every signal collected, in arrival order, including dropped ones.
    pub signals: Vec<Signal>,
    pub rejections: Vec<Rejection>,
    pub completed_proposers: BTreeSet<String>,
    pub failed_proposers: BTreeSet<String>,
    pub failures: Vec<ProposerFailure>,
    pub wave_count: u32,
    pub duration: Duration,
    pub termination: Termination,
}

impl<D> CfmomResult<D> {
    /// Signals that passed the evidence gate, as emitted (before
    /// normalization), in arrival order.
    pub fn admitted_signals(&self) -> impl Iterator<Item = &Signal> {
        let rejected: BTreeSet<usize> = self.rejections.iter().map(|r| r.signal_index).collect();
        self.signals
            .iter()
            .enumerate()
            .filter(move |(i, _)| !rejected.contains(i))
            .map(|(_, s)| s)
    }

    pub fn dispatched_proposers(&self) -> BTreeSet<String> {
        self.completed_proposers
            .union(&self.failed_proposers)
            .cloned()
            .collect()
    }
}
