//! Fitness evaluation seam and the bounded worker pool that fans it out.
//!
//! The evaluator is an external collaborator: it executes a scenario against
//! real or simulated infrastructure and returns an impact score. The pool
//! runs one generation's evaluations concurrently and hands the results back
//! in population order once every worker finished, or once the batch was
//! interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::scenario::{Scenario, ScenarioKind};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a; stable across platforms and toolchains.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// A single failed fitness call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("Scenario execution failed: {0}")]
    Execution(String),
    #[error("Metrics backend unavailable: {0}")]
    MetricsUnavailable(String),
    #[error("Evaluator returned a non-finite score ({0})")]
    NonFinite(f64),
}

/// Scores a scenario. Must tolerate repeated calls in any order.
pub trait FitnessEvaluator: Send + Sync {
    fn evaluate(&self, scenario: &Scenario) -> Result<f64, EvaluationError>;
}

impl<F> FitnessEvaluator for F
where
    F: Fn(&Scenario) -> Result<f64, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, scenario: &Scenario) -> Result<f64, EvaluationError> {
        self(scenario)
    }
}

/// Deterministic stand-in evaluator.
///
/// The score is a hash of the scenario's serialized form mapped to `[0, 1)`,
/// so identical genomes always score the same.
#[derive(Debug, Clone, Default)]
pub struct MockEvaluator {
    /// Kinds whose evaluation always fails.
    pub failing: Vec<ScenarioKind>,
    /// Artificial latency per call.
    pub delay: Option<Duration>,
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(scenario: &Scenario) -> f64 {
        let hash = fnv1a(scenario.identity().as_bytes());
        (hash >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl FitnessEvaluator for MockEvaluator {
    fn evaluate(&self, scenario: &Scenario) -> Result<f64, EvaluationError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.failing.contains(&scenario.kind()) {
            return Err(EvaluationError::Execution(format!(
                "{} is configured to fail",
                scenario.kind()
            )));
        }
        Ok(Self::score(scenario))
    }
}

/// Why a batch stopped before every evaluation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    TimedOut,
}

/// Results of one batch, in submission order.
#[derive(Debug)]
pub struct BatchOutcome {
    /// One entry per job. `None` when the job was skipped or had not finished
    /// within the grace period.
    pub results: Vec<Option<Result<f64, EvaluationError>>>,
    pub interrupted: Option<Interrupt>,
}

/// Bounded pool of evaluation workers.
pub struct EvaluationPool {
    pool: rayon::ThreadPool,
    grace: Duration,
}

impl EvaluationPool {
    /// `workers == 0` uses the rayon default (one per core).
    pub fn new(workers: usize, grace: Duration) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fitness-{i}"))
            .build()?;
        Ok(Self { pool, grace })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Evaluate every scenario, stopping early on `cancel` or `deadline`.
    ///
    /// Once interrupted no further job starts; jobs already running get the
    /// grace period to finish and are discarded afterwards.
    pub fn evaluate_all(
        &self,
        evaluator: &Arc<dyn FitnessEvaluator>,
        scenarios: Vec<Scenario>,
        cancel: &Arc<AtomicBool>,
        deadline: Option<Instant>,
    ) -> BatchOutcome {
        let total = scenarios.len();
        let mut results: Vec<Option<Result<f64, EvaluationError>>> = vec![None; total];
        if total == 0 {
            return BatchOutcome {
                results,
                interrupted: None,
            };
        }

        let halt = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        for (slot, scenario) in scenarios.into_iter().enumerate() {
            let tx = tx.clone();
            let evaluator = Arc::clone(evaluator);
            let halt = Arc::clone(&halt);
            self.pool.spawn(move || {
                if halt.load(Ordering::Relaxed) {
                    let _ = tx.send((slot, None));
                    return;
                }
                let result = evaluator.evaluate(&scenario);
                // The receiver is gone once the grace period ran out.
                let _ = tx.send((slot, Some(result)));
            });
        }
        drop(tx);

        let mut received = 0;
        let mut interrupted = None;
        let mut grace_deadline: Option<Instant> = None;
        while received < total {
            if interrupted.is_none() {
                let reason = if cancel.load(Ordering::Relaxed) {
                    Some(Interrupt::Cancelled)
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    Some(Interrupt::TimedOut)
                } else {
                    None
                };
                if let Some(reason) = reason {
                    log::warn!(
                        "evaluation interrupted ({reason:?}), waiting up to {:?} for {} in flight",
                        self.grace,
                        total - received
                    );
                    halt.store(true, Ordering::Relaxed);
                    interrupted = Some(reason);
                    grace_deadline = Some(Instant::now() + self.grace);
                }
            }
            if grace_deadline.is_some_and(|d| Instant::now() >= d) {
                log::warn!("grace period elapsed, discarding {} evaluations", total - received);
                break;
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok((slot, result)) => {
                    results[slot] = result;
                    received += 1;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        BatchOutcome {
            results,
            interrupted,
        }
    }
}
