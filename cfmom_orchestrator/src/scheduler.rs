//! Wave scheduler: fan out one cohort of proposers, fan in under a deadline.

use std::sync::Arc;

use cfmom_core::{FailureKind, ProposerFailure, Signal};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinError;
use tokio::time::{error::Elapsed, timeout_at, Instant};
use tracing::{debug, warn};

use crate::adapter::{Proposer, WaveContext};
use crate::cancel::CancelToken;
use crate::error::ProposerError;

/// What one wave produced, before evidence checks.
#[derive(Debug, Default)]
pub struct WaveOutcome {
    pub wave: u32,
    /// `(proposer id, signals)` for every proposer that returned normally,
    /// in dispatch order.
    pub completed: Vec<(String, Vec<Signal>)>,
    pub failures: Vec<ProposerFailure>,
    pub cancelled: bool,
}

impl WaveOutcome {
    pub fn signal_count(&self) -> usize {
        self.completed.iter().map(|(_, s)| s.len()).sum()
    }
}

type CallResult = Result<Result<Result<Vec<Signal>, ProposerError>, JoinError>, Elapsed>;

/// Dispatch every proposer concurrently and wait until all have answered or
/// `deadline` passes, whichever comes first.
///
/// Each proposer runs in its own task, so a panic is reported as an error
/// rather than tearing down the run. Proposers still running at the deadline
/// (or at cancellation) are aborted and their output discarded.
pub async fn dispatch_wave(
    proposers: &[Arc<dyn Proposer>],
    ctx: &WaveContext,
    deadline: Instant,
    cancel: Option<&CancelToken>,
) -> WaveOutcome {
    let mut aborts = Vec::with_capacity(proposers.len());
    let mut pending = FuturesUnordered::new();

    for (idx, p) in proposers.iter().enumerate() {
        let p = Arc::clone(p);
        let ctx = ctx.clone();
        let handle = tokio::spawn(async move { p.invoke(&ctx).await });
        aborts.push(handle.abort_handle());
        pending.push(async move { (idx, timeout_at(deadline, handle).await) });
    }

    let cancel_wait = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(cancel_wait);

    let mut slots: Vec<Option<CallResult>> = (0..proposers.len()).map(|_| None).collect();
    let mut cancelled = false;

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel_wait => {
                cancelled = true;
                break;
            }
            next = pending.next() => match next {
                Some((idx, res)) => slots[idx] = Some(res),
                None => break,
            },
        }
    }

    // Anything still running is abandoned; aborting a finished task is a no-op.
    drop(pending);
    for a in &aborts {
        a.abort();
    }

    let mut out = WaveOutcome {
        wave: ctx.wave,
        cancelled,
        ..WaveOutcome::default()
    };

    for (p, slot) in proposers.iter().zip(slots) {
        let id = p.id().to_string();
        let (kind, message) = match slot {
            Some(Ok(Ok(Ok(mut signals)))) => {
                for s in &mut signals {
                    if s.proposer != id {
                        warn!(proposer = %id, claimed = %s.proposer, "signal claims another proposer; re-attributed");
                        s.proposer = id.clone();
                    }
                }
                debug!(proposer = %id, wave = ctx.wave, signals = signals.len(), "proposer completed");
                out.completed.push((id, signals));
                continue;
            }
            Some(Ok(Ok(Err(e)))) => (FailureKind::Error, e.to_string()),
            Some(Ok(Err(join))) if join.is_panic() => (FailureKind::Error, "proposer panicked".to_string()),
            Some(Ok(Err(_))) => (FailureKind::Cancelled, "proposer task aborted".to_string()),
            Some(Err(_)) => (FailureKind::Timeout, "no answer before the wave deadline".to_string()),
            None if cancelled => (FailureKind::Cancelled, "run cancelled".to_string()),
            None => (FailureKind::Timeout, "no answer before the wave deadline".to_string()),
        };

        warn!(proposer = %id, wave = ctx.wave, kind = %kind, error = %message, "proposer failed");
        out.failures.push(ProposerFailure {
            proposer: id,
            wave: ctx.wave,
            kind,
            message,
        });
    }

    out
}
