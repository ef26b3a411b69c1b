//! Wave-loop orchestrator.
//!
//! Drives `Idle -> Running(1..=max_waves) -> Terminated`:
//! - dispatches the eligible proposers as one wave
//! - gates the wave's signals through the constrainer, bounded by the run
//!   deadline and cancellation like the dispatch itself
//! - folds the wave into an immutable `RunState` and re-aggregates
//! - stops on early exit, wave budget, deadline, exhaustion, or cancellation
//!
//! Aggregation state is owned by the single control flow of `run`.
//! Proposers and the constrainer hand back values; nothing else mutates it.

use std::collections::HashSet;
use std::sync::Arc;

use cfmom_core::{
    Aggregator, CfmomResult, ConfigError, DecisionPolicy, FusionCfg, ProposerProfiles,
    RedispatchPolicy, RunState, Termination, WaveRecord,
};
use tokio::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::adapter::{EvidenceStores, Normalizer, Proposer, WaveContext};
use crate::cancel::CancelToken;
use crate::constrainer::Constrainer;
use crate::scheduler::{dispatch_wave, WaveOutcome};

#[derive(Debug)]
pub struct Orchestrator {
    cfg: FusionCfg,
    aggregator: Aggregator,
    constrainer: Constrainer,
}

impl Orchestrator {
    /// Build an orchestrator. Fails on invalid configuration.
    pub fn new(cfg: FusionCfg, stores: EvidenceStores) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            aggregator: Aggregator::new(cfg.clone()),
            constrainer: Constrainer::new(stores, &cfg),
            cfg,
        })
    }

    /// Set proposer trust profiles. These weight signals by proposer id.
    pub fn with_profiles(mut self, profiles: ProposerProfiles) -> Self {
        self.aggregator.set_profiles(profiles);
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.constrainer = self.constrainer.with_normalizer(normalizer);
        self
    }

    pub fn cfg(&self) -> &FusionCfg {
        &self.cfg
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Run to completion.
    ///
    /// Proposer and evidence failures never surface here; they are folded
    /// into the result. Only an unusable proposer set is an error.
    pub async fn run<P>(
        &self,
        proposers: &[Arc<dyn Proposer>],
        policy: &P,
    ) -> Result<CfmomResult<P::Decision>, ConfigError>
    where
        P: DecisionPolicy + ?Sized,
    {
        self.run_inner(proposers, policy, None).await
    }

    /// Like `run`, stopping early when `cancel` fires. Signals admitted in
    /// earlier waves are kept.
    pub async fn run_with_cancel<P>(
        &self,
        proposers: &[Arc<dyn Proposer>],
        policy: &P,
        cancel: CancelToken,
    ) -> Result<CfmomResult<P::Decision>, ConfigError>
    where
        P: DecisionPolicy + ?Sized,
    {
        self.run_inner(proposers, policy, Some(cancel)).await
    }

    async fn run_inner<P>(
        &self,
        proposers: &[Arc<dyn Proposer>],
        policy: &P,
        cancel: Option<CancelToken>,
    ) -> Result<CfmomResult<P::Decision>, ConfigError>
    where
        P: DecisionPolicy + ?Sized,
    {
        check_proposers(proposers)?;

        let correlation_id = Uuid::new_v4();
        let span = info_span!("cfmom_run", %correlation_id);

        async move {
            let started = Instant::now();
            let run_deadline = started + self.cfg.overall_deadline();

            info!(
                proposers = proposers.len(),
                max_waves = self.cfg.max_waves,
                overall_deadline_ms = self.cfg.overall_deadline_ms,
                "starting fusion run"
            );

            let mut state = RunState::new(&self.aggregator);

            let termination = loop {
                if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                    break Termination::Cancelled;
                }

                let eligible: Vec<Arc<dyn Proposer>> = match self.cfg.redispatch {
                    RedispatchPolicy::RetryFailed => proposers.to_vec(),
                    RedispatchPolicy::ExcludeFailed => proposers
                        .iter()
                        .filter(|p| !state.has_failed(p.id()))
                        .cloned()
                        .collect(),
                };
                if eligible.is_empty() {
                    break Termination::Exhausted;
                }

                let now = Instant::now();
                if now >= run_deadline {
                    break Termination::Deadline;
                }
                let wave_deadline = (now + self.cfg.per_wave_deadline()).min(run_deadline);

                let ctx = WaveContext {
                    correlation_id,
                    wave: state.wave() + 1,
                    prior: (state.wave() > 0).then(|| state.aggregate().clone()),
                    admitted_so_far: state.admitted().len(),
                };
                info!(wave = ctx.wave, proposers = eligible.len(), "dispatching wave");

                let outcome = dispatch_wave(&eligible, &ctx, wave_deadline, cancel.as_ref()).await;
                let dispatch_cancelled = outcome.cancelled;
                let record = self.constrain(outcome, run_deadline, cancel.as_ref()).await;
                let cancelled = dispatch_cancelled || cancel.as_ref().is_some_and(|c| c.is_cancelled());

                state = state.absorb(record, &self.aggregator);

                let agg = state.aggregate();
                info!(
                    wave = state.wave(),
                    score = agg.score,
                    band = %agg.band,
                    early_exit = agg.early_exit,
                    admitted = agg.signal_count,
                    rejected = state.rejections().len(),
                    "wave complete"
                );

                if cancelled {
                    break Termination::Cancelled;
                }
                if agg.early_exit {
                    break Termination::EarlyExit;
                }
                if state.completed().is_empty() {
                    break Termination::Exhausted;
                }
                if state.wave() >= self.cfg.max_waves {
                    break Termination::MaxWaves;
                }
                if Instant::now() >= run_deadline {
                    break Termination::Deadline;
                }
            };

            let result = state.finish(correlation_id, termination, started.elapsed(), policy);
            info!(
                termination = %result.termination,
                waves = result.wave_count,
                score = result.aggregate.score,
                band = %result.aggregate.band,
                completed = result.completed_proposers.len(),
                failed = result.failed_proposers.len(),
                duration_ms = result.duration.as_millis() as u64,
                "fusion run finished"
            );
            Ok::<_, ConfigError>(result)
        }
        .instrument(span)
        .await
    }

    async fn constrain(&self, outcome: WaveOutcome, deadline: Instant, cancel: Option<&CancelToken>) -> WaveRecord {
        let mut completed = Vec::with_capacity(outcome.completed.len());
        let mut raw = Vec::with_capacity(outcome.signal_count());
        for (id, signals) in outcome.completed {
            completed.push(id);
            raw.extend(signals);
        }

        let verdicts = self.constrainer.constrain(&raw, deadline, cancel).await;

        WaveRecord {
            wave: outcome.wave,
            completed,
            failures: outcome.failures,
            signals: raw.into_iter().zip(verdicts).collect(),
        }
    }
}

fn check_proposers(proposers: &[Arc<dyn Proposer>]) -> Result<(), ConfigError> {
    if proposers.is_empty() {
        return Err(ConfigError::NoProposers);
    }
    let mut seen = HashSet::with_capacity(proposers.len());
    for p in proposers {
        if !seen.insert(p.id()) {
            return Err(ConfigError::DuplicateProposer(p.id().to_string()));
        }
    }
    Ok(())
}

/// One-shot convenience: build an orchestrator for `cfg` and run it.
pub async fn run<P>(
    proposers: &[Arc<dyn Proposer>],
    stores: EvidenceStores,
    cfg: FusionCfg,
    policy: &P,
) -> Result<CfmomResult<P::Decision>, ConfigError>
where
    P: DecisionPolicy + ?Sized,
{
    Orchestrator::new(cfg, stores)?.run(proposers, policy).await
}
