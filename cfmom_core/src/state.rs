use std::collections::BTreeSet;
use std::time::Duration;

use uuid::Uuid;

use crate::aggregate::{AggregatedResult, Aggregator};
use crate::decide::DecisionPolicy;
use crate::result::{CfmomResult, DropReason, ProposerFailure, Rejection, Termination};
use crate::signal::Signal;

/// Constrainer outcome for one raw signal.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// Carries the normalized copy that is fused.
    Admitted(Signal),
    Dropped(DropReason),
}

/// Everything one wave produced, handed to `RunState::absorb`.
#[derive(Clone, Debug, Default)]
pub struct WaveRecord {
    pub wave: u32,
    pub completed: Vec<String>,
    pub failures: Vec<ProposerFailure>,
    /// Raw signals in arrival order, each with its verdict.
    pub signals: Vec<(Signal, Verdict)>,
}

/// Accumulated state of a run. Never mutated in place: each wave turns the
/// current value into the next one.
#[derive(Clone, Debug)]
pub struct RunState {
    wave: u32,
    signals: Vec<Signal>,
    admitted: Vec<Signal>,
    rejections: Vec<Rejection>,
    completed: BTreeSet<String>,
    failed: BTreeSet<String>,
    failures: Vec<ProposerFailure>,
    aggregate: AggregatedResult,
}

impl RunState {
    pub fn new(aggregator: &Aggregator) -> Self {
        let none: [Signal; 0] = [];
        Self {
            wave: 0,
            signals: Vec::new(),
            admitted: Vec::new(),
            rejections: Vec::new(),
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
            failures: Vec::new(),
            aggregate: aggregator.aggregate(&none),
        }
    }

    /// Fold one wave into the run and re-aggregate over every admitted signal so far.
    ///
    /// A proposer's latest outcome decides which set it belongs to, so the
    /// completed and failed sets stay disjoint.
    pub fn absorb(self, record: WaveRecord, aggregator: &Aggregator) -> RunState {
        let RunState {
            signals: mut all,
            mut admitted,
            mut rejections,
            mut completed,
            mut failed,
            mut failures,
            ..
        } = self;

        for id in record.completed {
            failed.remove(&id);
            completed.insert(id);
        }
        for f in record.failures {
            completed.remove(&f.proposer);
            failed.insert(f.proposer.clone());
            failures.push(f);
        }

        for (raw, verdict) in record.signals {
            match verdict {
                Verdict::Admitted(s) => admitted.push(s),
                Verdict::Dropped(reason) => rejections.push(Rejection {
                    signal_index: all.len(),
                    wave: record.wave,
                    proposer: raw.proposer.clone(),
                    reason,
                }),
            }
            all.push(raw);
        }

        let aggregate = aggregator.aggregate(&admitted);

        RunState {
            wave: record.wave,
            signals: all,
            admitted,
            rejections,
            completed,
            failed,
            failures,
            aggregate,
        }
    }

    pub fn wave(&self) -> u32 {
        self.wave
    }

    pub fn aggregate(&self) -> &AggregatedResult {
        &self.aggregate
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn admitted(&self) -> &[Signal] {
        &self.admitted
    }

    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }

    pub fn completed(&self) -> &BTreeSet<String> {
        &self.completed
    }

    pub fn failed(&self) -> &BTreeSet<String> {
        &self.failed
    }

    pub fn has_failed(&self, proposer: &str) -> bool {
        self.failed.contains(proposer)
    }

    /// Assemble the terminal record.
    pub fn finish<P>(
        self,
        correlation_id: Uuid,
        termination: Termination,
        duration: Duration,
        policy: &P,
    ) -> CfmomResult<P::Decision>
    where
        P: DecisionPolicy + ?Sized,
    {
        // Evidence admitted before every proposer dropped out still decides.
        let decision = if termination == Termination::Exhausted && self.aggregate.signal_count == 0 {
            policy.exhausted(&self.aggregate.band)
        } else {
            policy.decide(&self.aggregate.band)
        };
        let reason = self.reason(termination);

        CfmomResult {
            correlation_id,
            decision,
            reason,
            aggregate: self.aggregate,
            signals: self.signals,
            rejections: self.rejections,
            completed_proposers: self.completed,
            failed_proposers: self.failed,
            failures: self.failures,
            wave_count: self.wave,
            duration,
            termination,
        }
    }

    /// Human-readable explanation. Never empty.
    pub fn reason(&self, termination: Termination) -> String {
        let a = &self.aggregate;
        let mut out = match termination {
            Termination::EarlyExit => format!(
                "early exit after wave {}: score {:.3} in band {}",
                self.wave, a.score, a.band
            ),
            Termination::MaxWaves => format!(
                "wave budget exhausted after {} wave(s): score {:.3} in band {}",
                self.wave, a.score, a.band
            ),
            Termination::Deadline => format!(
                "overall deadline elapsed after {} wave(s): score {:.3} in band {}",
                self.wave, a.score, a.band
            ),
            Termination::Exhausted if a.signal_count == 0 => format!(
                "all {} dispatched proposer(s) failed; no evidence to fuse, default decision applied",
                self.failed.len()
            ),
            Termination::Exhausted => format!(
                "all {} dispatched proposer(s) failed by wave {}: score {:.3} in band {} from earlier evidence",
                self.failed.len(),
                self.wave,
                a.score,
                a.band
            ),
            Termination::Cancelled => format!(
                "run cancelled during wave {}: score {:.3} in band {}",
                self.wave, a.score, a.band
            ),
        };

        if a.signal_count == 0 && termination != Termination::Exhausted {
            out.push_str("; no validated evidence");
        }

        if !self.rejections.is_empty() {
            let mismatches = self
                .rejections
                .iter()
                .filter(|r| matches!(r.reason, DropReason::HashMismatch { .. }))
                .count();
            out.push_str(&format!(
                "; {} signal(s) dropped for unverifiable evidence",
                self.rejections.len()
            ));
            if mismatches > 0 {
                out.push_str(&format!(" ({mismatches} hash mismatch)"));
            }
        }

        if !self.failed.is_empty() && termination != Termination::Exhausted {
            let names: Vec<&str> = self.failed.iter().map(String::as_str).collect();
            out.push_str(&format!("; failed proposer(s): {}", names.join(", ")));
        }

        out
    }
}
