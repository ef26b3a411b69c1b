//! Evidence gate between proposers and the aggregator.
//!
//! Every signal is checked against the stores that hold its evidence and
//! either admitted or dropped with a recorded reason. The gate is binary per
//! signal: a single unverifiable reference drops the whole signal. A drop
//! never counts against the proposer.

use std::collections::HashMap;
use std::time::Duration;

use cfmom_core::{DropReason, EvidenceKey, EvidenceRef, FusionCfg, Signal, Verdict};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::adapter::{EvidenceStores, EvidenceVerifier, Normalizer};
use crate::cancel::CancelToken;
use crate::error::StoreError;

enum Lookup {
    Verified,
    Missing,
    Mismatch,
}

#[derive(Clone, Debug)]
pub struct Constrainer {
    stores: EvidenceStores,
    normalizer: Normalizer,
    retry_limit: u32,
    backoff: Duration,
    require_evidence: bool,
}

impl Constrainer {
    pub fn new(stores: EvidenceStores, cfg: &FusionCfg) -> Self {
        Self {
            stores,
            normalizer: Normalizer::default(),
            retry_limit: cfg.evidence_retry_limit,
            backoff: cfg.evidence_retry_backoff(),
            require_evidence: cfg.require_evidence,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn stores(&self) -> &EvidenceStores {
        &self.stores
    }

    /// Verify one reference, retrying unreachable stores with exponential backoff.
    ///
    /// A store that has not answered by `deadline` counts as unreachable, and
    /// no retry is scheduled past it.
    pub async fn verify(&self, evidence: &EvidenceRef, deadline: Instant) -> Result<(), DropReason> {
        let label = evidence.to_string();
        let Some(store) = self.stores.get(&evidence.store) else {
            debug!(evidence = %label, "no store registered for evidence");
            return Err(DropReason::Unresolvable { evidence: label });
        };

        let mut attempt = 0u32;
        loop {
            let Ok(lookup) = timeout_at(deadline, Self::lookup(store.as_ref(), evidence)).await else {
                warn!(evidence = %label, attempts = attempt + 1, "evidence store did not answer before the run deadline");
                return Err(DropReason::StoreUnreachable {
                    evidence: label,
                    attempts: attempt + 1,
                });
            };

            match lookup {
                Ok(Lookup::Verified) => return Ok(()),
                Ok(Lookup::Missing) => {
                    debug!(evidence = %label, "evidence not found");
                    return Err(DropReason::Unresolvable { evidence: label });
                }
                Ok(Lookup::Mismatch) => {
                    return Err(DropReason::HashMismatch { evidence: label });
                }
                Err(e) if e.is_transient() && attempt < self.retry_limit => {
                    let delay = self.backoff.saturating_mul(1u32 << attempt.min(16));
                    if Instant::now() + delay >= deadline {
                        warn!(evidence = %label, attempts = attempt + 1, error = %e, "evidence store unreachable, no time left to retry");
                        return Err(DropReason::StoreUnreachable {
                            evidence: label,
                            attempts: attempt + 1,
                        });
                    }
                    debug!(
                        evidence = %label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "evidence store unreachable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(StoreError::Unreachable(msg)) => {
                    warn!(evidence = %label, attempts = attempt + 1, error = %msg, "evidence store unreachable, giving up");
                    return Err(DropReason::StoreUnreachable {
                        evidence: label,
                        attempts: attempt + 1,
                    });
                }
                Err(StoreError::Fault(msg)) => {
                    warn!(evidence = %label, error = %msg, "evidence store fault");
                    return Err(DropReason::StoreFault {
                        evidence: label,
                        message: msg,
                    });
                }
            }
        }
    }

    async fn lookup(store: &dyn EvidenceVerifier, evidence: &EvidenceRef) -> Result<Lookup, StoreError> {
        if !store.exists(&evidence.kind, &evidence.id).await? {
            return Ok(Lookup::Missing);
        }
        match &evidence.content_hash {
            None => Ok(Lookup::Verified),
            Some(expected) => {
                let actual = store.hash(&evidence.kind, &evidence.id).await?;
                if &actual == expected {
                    Ok(Lookup::Verified)
                } else {
                    Ok(Lookup::Mismatch)
                }
            }
        }
    }

    /// Judge a batch of signals. The returned verdicts line up with `signals`.
    ///
    /// Distinct references are verified once each, concurrently, and never
    /// past `deadline`. If `cancel` fires, checks still in flight are
    /// abandoned and their signals dropped as `Interrupted`; finished checks
    /// keep their outcome.
    pub async fn constrain(
        &self,
        signals: &[Signal],
        deadline: Instant,
        cancel: Option<&CancelToken>,
    ) -> Vec<Verdict> {
        let mut distinct: HashMap<EvidenceKey, &EvidenceRef> = HashMap::new();
        for s in signals {
            for e in &s.evidence {
                distinct.entry(e.key()).or_insert(e);
            }
        }

        let mut pending: FuturesUnordered<_> = distinct
            .iter()
            .map(|(key, evidence)| async move { (key.clone(), self.verify(evidence, deadline).await) })
            .collect();

        let cancel_wait = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(cancel_wait);

        let mut outcomes: HashMap<EvidenceKey, Result<(), DropReason>> = HashMap::with_capacity(distinct.len());
        loop {
            tokio::select! {
                biased;
                _ = &mut cancel_wait => {
                    warn!(
                        verified = outcomes.len(),
                        total = distinct.len(),
                        "run cancelled during evidence verification"
                    );
                    break;
                }
                next = pending.next() => match next {
                    Some((key, outcome)) => {
                        outcomes.insert(key, outcome);
                    }
                    None => break,
                },
            }
        }
        drop(pending);

        for (key, evidence) in &distinct {
            outcomes.entry(key.clone()).or_insert_with(|| {
                Err(DropReason::Interrupted {
                    evidence: evidence.to_string(),
                })
            });
        }

        signals
            .iter()
            .map(|s| {
                if self.require_evidence && !s.cites_evidence() {
                    debug!(proposer = %s.proposer, "signal dropped: no evidence cited");
                    return Verdict::Dropped(DropReason::NoEvidence);
                }

                let failed = s
                    .evidence
                    .iter()
                    .find_map(|e| outcomes.get(&e.key()).and_then(|o| o.as_ref().err()));

                match failed {
                    None => Verdict::Admitted(self.normalizer.normalize(s)),
                    Some(reason) => {
                        if let DropReason::HashMismatch { evidence } = reason {
                            warn!(
                                proposer = %s.proposer,
                                evidence = %evidence,
                                "evidence hash mismatch, possible fabrication; signal dropped"
                            );
                        } else {
                            debug!(proposer = %s.proposer, reason = %reason, "signal dropped");
                        }
                        Verdict::Dropped(reason.clone())
                    }
                }
            })
            .collect()
    }
}
