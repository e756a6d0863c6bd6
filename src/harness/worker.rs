//! Transfer worker
//!
//! A worker commits a fixed number of unit transfers, each adding one unit
//! to a debit-pool account and taking it from a credit-pool account inside
//! one transaction. Every transfer preserves the total balance, so any observed
//! change of the total is a fault of the store, not of the workload.

use super::report::{UnitFailure, WorkerReport};
use crate::domain::assignment::WorkerAssignment;
use crate::domain::types::{IterationCount, ProgressInterval, WorkerId};
use crate::infrastructure::log_messages::worker as messages;
use crate::ledger::{LedgerConnector, Mutation, UnitRole};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

pub struct TransferWorker {
    id: WorkerId,
    assignment: WorkerAssignment,
    iterations: IterationCount,
    progress_interval: ProgressInterval,
    rng: StdRng,
}

impl TransferWorker {
    pub fn new(
        id: WorkerId,
        assignment: WorkerAssignment,
        iterations: IterationCount,
        progress_interval: ProgressInterval,
    ) -> Self {
        Self {
            id,
            assignment,
            iterations,
            progress_interval,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed seed so the sequence of drawn keys is reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Run every iteration on a dedicated connection
    ///
    /// The first ledger error ends the worker; no further transfers are
    /// attempted and the failed transfer is not retried.
    #[instrument(skip_all, fields(worker = %self.id))]
    pub async fn run(
        mut self,
        connector: Arc<dyn LedgerConnector>,
    ) -> Result<WorkerReport, UnitFailure> {
        let started = Instant::now();
        let mut connection = connector
            .connect(UnitRole::Worker(self.id))
            .await
            .map_err(|source| {
                error!("Could not connect: {}", source);
                UnitFailure::Connect {
                    role: UnitRole::Worker(self.id),
                    source,
                }
            })?;
        debug!("{}", messages::STARTED);

        let iterations = self.iterations.into_inner();
        let interval = self.progress_interval.into_inner();
        for iteration in 0..iterations {
            let (debit, credit) = self.assignment.draw(&mut self.rng);
            let transfer = [Mutation::new(debit, 1), Mutation::new(credit, -1)];

            if let Err(source) = connection.execute_transaction(&transfer).await {
                error!(iteration, "Transfer failed: {}", source);
                return Err(UnitFailure::worker(self.id, iteration, source));
            }

            let completed = iteration + 1;
            if completed % interval == 0 {
                info!("{} iterations processed", completed);
            }
        }

        drop(connection);
        debug!("{}", messages::FINISHED);

        Ok(WorkerReport {
            worker: self.id,
            commits: iterations,
            elapsed: started.elapsed(),
            finished_at: Instant::now(),
        })
    }
}
