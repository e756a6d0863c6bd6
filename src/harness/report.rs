//! Outcome of a harness run
//!
//! Harness faults (a worker or the monitor dying on a ledger error) and
//! invariant violations (the signal under test) are kept apart: the first
//! are [`UnitFailure`]s, the second shows up as changes in the monitor's
//! audit trail or as a wrong final total.

use super::monitor::MonitorState;
use crate::domain::invariant::InvariantChange;
use crate::domain::types::WorkerId;
use crate::ledger::{LedgerError, UnitRole};
use crate::{Error, Result};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UnitFailure {
    #[error("{role} could not connect to the ledger: {source}")]
    Connect {
        role: UnitRole,
        #[source]
        source: LedgerError,
    },

    #[error("worker {worker} failed at iteration {iteration}: {source}")]
    Worker {
        worker: WorkerId,
        iteration: u64,
        #[source]
        source: LedgerError,
    },

    #[error("monitor failed after {samples} samples: {source}")]
    Monitor {
        samples: u64,
        #[source]
        source: LedgerError,
    },

    #[error("final verification failed: {0}")]
    Verification(#[source] LedgerError),

    #[error("{unit} task did not complete: {message}")]
    Aborted { unit: String, message: String },
}

impl UnitFailure {
    pub fn worker(worker: WorkerId, iteration: u64, source: LedgerError) -> Self {
        Self::Worker {
            worker,
            iteration,
            source,
        }
    }

    pub fn aborted(unit: impl std::fmt::Display, error: &tokio::task::JoinError) -> Self {
        let message = if error.is_panic() {
            "panicked".to_string()
        } else {
            error.to_string()
        };
        Self::Aborted {
            unit: unit.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub worker: WorkerId,
    pub commits: u64,
    pub elapsed: Duration,
    #[serde(skip)]
    pub finished_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub state: MonitorState,
    pub samples: u64,
    /// First sum the monitor saw
    pub baseline: Option<i64>,
    pub last: Option<i64>,
    /// Audit trail of observed changes, in observation order
    pub changes: Vec<InvariantChange>,
    /// When the monitor read the workers-active flag as false
    #[serde(skip)]
    pub stopped_at: Instant,
}

#[derive(Debug)]
pub enum RunVerdict {
    /// Every sample and the final total matched the expected total
    Consistent,
    /// The store let an inconsistent total become visible
    InvariantViolated {
        expected: i64,
        baseline: Option<i64>,
        changes: Vec<InvariantChange>,
        final_sum: Option<i64>,
    },
    /// At least one unit died; the run proves nothing about the store
    HarnessFailed { failures: usize },
}

impl RunVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            RunVerdict::Consistent => "consistent",
            RunVerdict::InvariantViolated { .. } => "invariant_violated",
            RunVerdict::HarnessFailed { .. } => "harness_failed",
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub expected_total: i64,
    /// Reports of workers that completed, ordered by worker id
    pub workers: Vec<WorkerReport>,
    pub monitor: Option<MonitorReport>,
    pub final_sum: Option<i64>,
    pub failures: Vec<UnitFailure>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn commits(&self) -> u64 {
        self.workers.iter().map(|worker| worker.commits).sum()
    }

    pub fn changes(&self) -> &[InvariantChange] {
        self.monitor
            .as_ref()
            .map(|monitor| monitor.changes.as_slice())
            .unwrap_or_default()
    }

    pub fn verdict(&self) -> RunVerdict {
        if !self.failures.is_empty() {
            return RunVerdict::HarnessFailed {
                failures: self.failures.len(),
            };
        }

        let baseline = self.monitor.as_ref().and_then(|monitor| monitor.baseline);
        let baseline_wrong = baseline.is_some_and(|sum| sum != self.expected_total);
        let final_wrong = self.final_sum.is_some_and(|sum| sum != self.expected_total);
        if baseline_wrong || final_wrong || !self.changes().is_empty() {
            return RunVerdict::InvariantViolated {
                expected: self.expected_total,
                baseline,
                changes: self.changes().to_vec(),
                final_sum: self.final_sum,
            };
        }

        RunVerdict::Consistent
    }

    /// Fail with [`Error::UnitsFailed`] if any unit died
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::UnitsFailed {
                failures: self.failures,
            })
        }
    }

    pub fn summary(&self) -> RunSummary {
        let commits = self.commits();
        let seconds = self.elapsed.as_secs_f64();
        RunSummary {
            run_id: self.run_id,
            verdict: self.verdict().label(),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            workers_completed: self.workers.len(),
            commits,
            updates: commits * 2,
            tps: if seconds > 0.0 {
                commits as f64 / seconds
            } else {
                0.0
            },
            monitor_samples: self.monitor.as_ref().map_or(0, |monitor| monitor.samples),
            invariant_changes: self.changes().len(),
            expected_total: self.expected_total,
            final_sum: self.final_sum,
            failures: self.failures.iter().map(ToString::to_string).collect(),
        }
    }
}

/// One-line machine readable summary of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub verdict: &'static str,
    pub elapsed_ms: u64,
    pub workers_completed: usize,
    pub commits: u64,
    pub updates: u64,
    pub tps: f64,
    pub monitor_samples: u64,
    pub invariant_changes: usize,
    pub expected_total: i64,
    pub final_sum: Option<i64>,
    pub failures: Vec<String>,
}
