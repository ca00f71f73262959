//! Fan-out / join over independent work units.
//!
//! Every unit runs as its own task. Results are collected at a single
//! barrier; a unit that errors or panics becomes a [`UnitFailure`] and
//! never affects its siblings. Flipping the cancel channel to `true` stops
//! the join, aborts whatever is still running and keeps what already
//! finished.

use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::data::WorkUnit;
use crate::types::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub unit: WorkUnit,
    #[serde(serialize_with = "error_string")]
    pub error: EngineError,
}

/// An input a unit left out while still completing, such as a malformed
/// trend rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedInput {
    pub unit: WorkUnit,
    #[serde(serialize_with = "error_string")]
    pub error: EngineError,
}

fn error_string<S: serde::Serializer>(error: &EngineError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}

#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Finished units, in completion order.
    pub completed: Vec<(WorkUnit, T)>,
    pub failures: Vec<UnitFailure>,
    pub cancelled: bool,
}

impl<T> BatchOutcome<T> {
    fn new() -> Self {
        Self {
            completed: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }
}

/// A cancel channel. Send `true` to cancel.
pub fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Run `jobs` concurrently, at most `max_concurrent` at a time.
pub async fn run_units<T, Fut>(
    jobs: Vec<(WorkUnit, Fut)>,
    max_concurrent: usize,
    mut cancel: watch::Receiver<bool>,
) -> BatchOutcome<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    let mut outcome = BatchOutcome::new();
    let units: Vec<WorkUnit> = jobs.iter().map(|(u, _)| u.clone()).collect();
    let mut done = vec![false; units.len()];

    if *cancel.borrow() {
        outcome.cancelled = true;
        outcome.failures = units
            .into_iter()
            .map(|unit| UnitFailure {
                unit,
                error: EngineError::Cancelled,
            })
            .collect();
        return outcome;
    }

    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut set = JoinSet::new();
    for (idx, (_, job)) in jobs.into_iter().enumerate() {
        let permits = permits.clone();
        set.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => match AssertUnwindSafe(job).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(EngineError::UnitPanicked(panic_message(panic.as_ref()))),
                },
                Err(_) => Err(EngineError::Cancelled),
            };
            (idx, result)
        });
    }

    let mut watching = true;
    loop {
        tokio::select! {
            biased;
            changed = cancel.changed(), if watching => {
                match changed {
                    Ok(()) if *cancel.borrow() => {
                        outcome.cancelled = true;
                        break;
                    }
                    Ok(()) => {}
                    // Sender gone: nobody can cancel any more.
                    Err(_) => watching = false,
                }
            }
            joined = set.join_next() => {
                let Some(joined) = joined else { break };
                match joined {
                    Ok((idx, result)) => {
                        done[idx] = true;
                        let unit = units[idx].clone();
                        match result {
                            Ok(value) => outcome.completed.push((unit, value)),
                            Err(error) => {
                                warn!(unit = %unit, error = %error, "Unit failed");
                                outcome.failures.push(UnitFailure { unit, error });
                            }
                        }
                    }
                    // Only reachable through abort, which ends the loop first.
                    Err(e) => warn!(error = %e, "Unit task ended abnormally"),
                }
            }
        }
    }

    if outcome.cancelled {
        set.abort_all();
        for (idx, unit) in units.into_iter().enumerate() {
            if !done[idx] {
                outcome.failures.push(UnitFailure {
                    unit,
                    error: EngineError::Cancelled,
                });
            }
        }
        warn!(
            completed = outcome.completed.len(),
            "Batch cancelled, keeping completed units"
        );
    }

    debug!(
        completed = outcome.completed.len(),
        failed = outcome.failures.len(),
        cancelled = outcome.cancelled,
        "Batch joined"
    );
    outcome
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
