//! Harness coordinator
//!
//! Provisions the ledger, runs the transfer workers and the invariant
//! monitor concurrently, and joins them in two phases: every worker first,
//! then the monitor. The monitor is only told to stop once the last worker
//! has returned, so it watches the ledger for the whole duration of the
//! transfer load.

use super::monitor::{InvariantMonitor, MonitorSettings};
use super::report::{MonitorReport, RunReport, UnitFailure, WorkerReport};
use super::worker::TransferWorker;
use crate::domain::assignment::AssignmentPlan;
use crate::domain::types::{
    expected_total, AccountCount, InitialBalance, IterationCount, PoolSize, ProgressInterval,
    WorkerCount, WorkerId,
};
use crate::infrastructure::log_messages::harness as messages;
use crate::ledger::{LedgerConnector, ProvisionRequest, UnitRole};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Validated parameters of one run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub accounts: AccountCount,
    pub initial_balance: InitialBalance,
    pub workers: WorkerCount,
    pub iterations: IterationCount,
    pub progress_interval: ProgressInterval,
    pub pool_size: PoolSize,
    pub monitor: MonitorSettings,
}

impl HarnessConfig {
    pub fn expected_total(&self) -> i64 {
        expected_total(self.accounts, self.initial_balance)
    }
}

pub struct Harness {
    connector: Arc<dyn LedgerConnector>,
    config: HarnessConfig,
    plan: AssignmentPlan,
    seed: Option<u64>,
}

impl Harness {
    /// Build a harness using the striped default assignment plan
    pub fn new(connector: Arc<dyn LedgerConnector>, config: HarnessConfig) -> Result<Self> {
        let plan = AssignmentPlan::striped(config.accounts, config.workers, config.pool_size);
        Self::with_plan(connector, config, plan)
    }

    /// Build a harness with an explicit plan, rejecting it if any worker's
    /// pools overlap or reference unprovisioned accounts
    pub fn with_plan(
        connector: Arc<dyn LedgerConnector>,
        config: HarnessConfig,
        plan: AssignmentPlan,
    ) -> Result<Self> {
        plan.validate(config.accounts, config.workers)?;
        Ok(Self {
            connector,
            config,
            plan,
            seed: None,
        })
    }

    /// Seed the workers' key draws; worker `n` uses `seed + n`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn plan(&self) -> &AssignmentPlan {
        &self.plan
    }

    /// Execute one full run
    ///
    /// Provisioning failures abort the run before any worker starts and are
    /// returned as `Err`. Worker and monitor failures are collected into the
    /// returned report once every unit has been joined.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn run_with_id(&self, run_id: Uuid) -> Result<RunReport> {
        info!("{}", messages::STARTING);
        let started = Instant::now();

        info!("{}", messages::PROVISIONING);
        self.connector
            .provision(ProvisionRequest {
                accounts: self.config.accounts,
                initial_balance: self.config.initial_balance,
            })
            .await
            .map_err(Error::Provisioning)?;
        info!("{}", messages::PROVISIONED);

        let mut failures = Vec::new();

        let (workers_active, workers_active_rx) = watch::channel(true);
        let (mut workers, worker_ids) = self.spawn_workers();
        info!("Launched {} transfer workers", worker_ids.len());

        let monitor = InvariantMonitor::new(self.config.monitor.clone(), workers_active_rx);
        let monitor = tokio::spawn(monitor.run(Arc::clone(&self.connector)));

        let worker_reports = join_workers(&mut workers, &worker_ids, &mut failures).await;
        info!("{}", messages::WORKERS_JOINED);

        info!("{}", messages::STOPPING_MONITOR);
        workers_active.send_replace(false);
        let monitor_report = join_monitor(monitor, &mut failures).await;

        info!("{}", messages::VERIFYING);
        let final_sum = match self.read_final_sum().await {
            Ok(sum) => Some(sum),
            Err(failure) => {
                error!("{}", failure);
                failures.push(failure);
                None
            }
        };

        let report = RunReport {
            run_id,
            expected_total: self.config.expected_total(),
            workers: worker_reports,
            monitor: monitor_report,
            final_sum,
            failures,
            elapsed: started.elapsed(),
        };
        info!(verdict = report.verdict().label(), "{}", messages::FINISHED);
        Ok(report)
    }

    pub async fn run(&self) -> Result<RunReport> {
        self.run_with_id(Uuid::now_v7()).await
    }

    fn spawn_workers(
        &self,
    ) -> (
        JoinSet<std::result::Result<WorkerReport, UnitFailure>>,
        HashMap<tokio::task::Id, WorkerId>,
    ) {
        let mut workers = JoinSet::new();
        let mut ids = HashMap::new();
        for (id, assignment) in self.plan.iter() {
            let mut worker = TransferWorker::new(
                id,
                assignment.clone(),
                self.config.iterations,
                self.config.progress_interval,
            );
            if let Some(seed) = self.seed {
                worker = worker.with_seed(seed.wrapping_add(id.into_inner() as u64));
            }
            let handle = workers.spawn(worker.run(Arc::clone(&self.connector)));
            ids.insert(handle.id(), id);
        }
        (workers, ids)
    }

    async fn read_final_sum(&self) -> std::result::Result<i64, UnitFailure> {
        let mut connection = self
            .connector
            .connect(UnitRole::Verifier)
            .await
            .map_err(UnitFailure::Verification)?;
        connection
            .query_invariant_sum()
            .await
            .map_err(UnitFailure::Verification)
    }
}

/// Wait for every worker, never just the first; failures are collected so
/// that one dead worker cannot hide behind the others' success
async fn join_workers(
    workers: &mut JoinSet<std::result::Result<WorkerReport, UnitFailure>>,
    ids: &HashMap<tokio::task::Id, WorkerId>,
    failures: &mut Vec<UnitFailure>,
) -> Vec<WorkerReport> {
    let mut reports = Vec::with_capacity(ids.len());
    while let Some(joined) = workers.join_next_with_id().await {
        match joined {
            Ok((_, Ok(report))) => reports.push(report),
            // The worker has already logged its own failure.
            Ok((_, Err(failure))) => failures.push(failure),
            Err(join_error) => {
                let unit = ids
                    .get(&join_error.id())
                    .map_or_else(|| "worker".to_string(), |id| UnitRole::Worker(*id).to_string());
                let failure = UnitFailure::aborted(unit, &join_error);
                error!("{}", failure);
                failures.push(failure);
            }
        }
    }
    reports.sort_by_key(|report| report.worker);
    reports
}

async fn join_monitor(
    monitor: tokio::task::JoinHandle<std::result::Result<MonitorReport, UnitFailure>>,
    failures: &mut Vec<UnitFailure>,
) -> Option<MonitorReport> {
    match monitor.await {
        Ok(Ok(report)) => Some(report),
        Ok(Err(failure)) => {
            error!("{}", failure);
            failures.push(failure);
            None
        }
        Err(join_error) => {
            let failure = UnitFailure::aborted(UnitRole::Monitor, &join_error);
            error!("{}", failure);
            failures.push(failure);
            None
        }
    }
}
