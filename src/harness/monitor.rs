//! Invariant monitor
//!
//! Samples the total balance on its own connection for as long as the
//! coordinator reports that workers are active. Samples are taken outside
//! any worker transaction, so they see exactly what the store's default
//! isolation level exposes. Only changes are logged and recorded.

use super::report::{MonitorReport, UnitFailure};
use crate::domain::invariant::{InvariantChange, InvariantTracker, Observation};
use crate::infrastructure::log_messages::monitor as messages;
use crate::ledger::{LedgerConnection, LedgerConnector, LedgerResult, UnitRole};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    NotStarted,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Pause between samples; `None` polls as fast as the store answers
    pub poll_interval: Option<Duration>,
    /// Take one more sample after the stop signal has been observed
    pub final_sample: bool,
}

pub struct InvariantMonitor {
    settings: MonitorSettings,
    workers_active: watch::Receiver<bool>,
    state: MonitorState,
    tracker: InvariantTracker,
    samples: u64,
    baseline: Option<i64>,
    changes: Vec<InvariantChange>,
}

impl InvariantMonitor {
    pub fn new(settings: MonitorSettings, workers_active: watch::Receiver<bool>) -> Self {
        Self {
            settings,
            workers_active,
            state: MonitorState::NotStarted,
            tracker: InvariantTracker::new(),
            samples: 0,
            baseline: None,
            changes: Vec::new(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    #[instrument(skip_all, name = "monitor")]
    pub async fn run(
        self,
        connector: Arc<dyn LedgerConnector>,
    ) -> Result<MonitorReport, UnitFailure> {
        let connection = connector
            .connect(UnitRole::Monitor)
            .await
            .map_err(|source| UnitFailure::Connect {
                role: UnitRole::Monitor,
                source,
            })?;
        self.run_with_connection(connection).await
    }

    /// Poll on an already opened connection until workers are reported done
    pub async fn run_with_connection(
        mut self,
        mut connection: Box<dyn LedgerConnection>,
    ) -> Result<MonitorReport, UnitFailure> {
        self.transition(MonitorState::Polling);
        info!("{}", messages::STARTED);

        while self.workers_active() {
            if let Err(source) = self.sample(connection.as_mut()).await {
                return Err(UnitFailure::Monitor {
                    samples: self.samples,
                    source,
                });
            }
            self.pause().await;
        }

        let stopped_at = Instant::now();
        self.transition(MonitorState::Stopped);

        if self.settings.final_sample {
            debug!("{}", messages::FINAL_SAMPLE);
            if let Err(source) = self.sample(connection.as_mut()).await {
                return Err(UnitFailure::Monitor {
                    samples: self.samples,
                    source,
                });
            }
        }

        drop(connection);
        info!(samples = self.samples, changes = self.changes.len(), "{}", messages::STOPPED);

        Ok(MonitorReport {
            state: self.state,
            samples: self.samples,
            baseline: self.baseline,
            last: self.tracker.last(),
            changes: self.changes,
            stopped_at,
        })
    }

    /// A dropped sender counts as "no workers active"
    fn workers_active(&mut self) -> bool {
        match self.workers_active.has_changed() {
            Ok(_) => *self.workers_active.borrow_and_update(),
            Err(_) => false,
        }
    }

    async fn pause(&mut self) {
        match self.settings.poll_interval {
            Some(interval) => {
                tokio::select! {
                    _ = self.workers_active.changed() => {}
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            // Tight loop, but give other tasks on this thread a chance to run.
            None => tokio::task::yield_now().await,
        }
    }

    async fn sample(&mut self, connection: &mut dyn LedgerConnection) -> LedgerResult<()> {
        let sum = connection.query_invariant_sum().await?;
        self.samples += 1;
        match self.tracker.observe(sum) {
            Observation::Baseline(sum) => {
                info!("Invariant baseline is {}", sum);
                self.baseline = Some(sum);
            }
            Observation::Unchanged => {}
            Observation::Changed(change) => {
                warn!(
                    sequence = change.sequence,
                    previous = change.previous,
                    "Invariant changed to {}",
                    change.current
                );
                self.changes.push(change);
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: MonitorState) {
        debug_assert!(
            matches!(
                (self.state, next),
                (MonitorState::NotStarted, MonitorState::Polling)
                    | (MonitorState::Polling, MonitorState::Stopped)
            ),
            "invalid monitor transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }
}
