//! Stub ledger clients for driving the harness in tests
//!
//! [`StubLedger`] wraps the in-process ledger and adds commit counting,
//! per-worker commit delays, and injected failures.

#![allow(dead_code)]

use async_trait::async_trait;
use ledger_harness::domain::{
    AccountCount, InitialBalance, IterationCount, PoolSize, ProgressInterval, WorkerCount,
    WorkerId,
};
use ledger_harness::harness::{HarnessConfig, MonitorSettings};
use ledger_harness::ledger::memory::InMemoryConnection;
use ledger_harness::ledger::{
    InMemoryLedger, LedgerConnection, LedgerConnector, LedgerError, LedgerResult, LedgerStage,
    Mutation, ProvisionRequest, UnitRole,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn config(accounts: u32, workers: usize, iterations: u64) -> HarnessConfig {
    HarnessConfig {
        accounts: AccountCount::try_new(accounts).unwrap(),
        initial_balance: InitialBalance::try_new(10_000).unwrap(),
        workers: WorkerCount::try_new(workers).unwrap(),
        iterations: IterationCount::try_new(iterations).unwrap(),
        progress_interval: ProgressInterval::try_new(1_000).unwrap(),
        pool_size: PoolSize::try_new(8).unwrap(),
        monitor: MonitorSettings::default(),
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicU64,
    pub commits: AtomicU64,
    pub queries: AtomicU64,
}

impl Counters {
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubLedger {
    pub inner: InMemoryLedger,
    pub counters: Arc<Counters>,
    /// Fail the n-th (1-based) commit call of a worker
    commit_faults: HashMap<WorkerId, u64>,
    /// Drop the credit mutation of the n-th commit of a worker
    lost_credits: HashMap<WorkerId, u64>,
    commit_delays: HashMap<WorkerId, Duration>,
    fail_provision: bool,
    fail_monitor_query_after: Option<u64>,
}

impl StubLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_commit(mut self, worker: usize, nth_call: u64) -> Self {
        self.commit_faults.insert(WorkerId::new(worker), nth_call);
        self
    }

    pub fn losing_credit(mut self, worker: usize, nth_commit: u64) -> Self {
        self.lost_credits.insert(WorkerId::new(worker), nth_commit);
        self
    }

    pub fn delaying_commits(mut self, worker: usize, delay: Duration) -> Self {
        self.commit_delays.insert(WorkerId::new(worker), delay);
        self
    }

    pub fn failing_provision(mut self) -> Self {
        self.fail_provision = true;
        self
    }

    pub fn failing_monitor_query_after(mut self, samples: u64) -> Self {
        self.fail_monitor_query_after = Some(samples);
        self
    }
}

#[async_trait]
impl LedgerConnector for StubLedger {
    async fn connect(&self, role: UnitRole) -> LedgerResult<Box<dyn LedgerConnection>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let worker = match role {
            UnitRole::Worker(worker) => Some(worker),
            _ => None,
        };
        let lookup = |map: &HashMap<WorkerId, u64>| worker.and_then(|w| map.get(&w).copied());
        Ok(Box::new(StubConnection {
            inner: self.inner.open(),
            counters: Arc::clone(&self.counters),
            commit_calls: 0,
            queries: 0,
            pending: Vec::new(),
            fail_commit_at: lookup(&self.commit_faults),
            lose_credit_at: lookup(&self.lost_credits),
            commit_delay: worker.and_then(|w| self.commit_delays.get(&w).copied()),
            fail_query_after: match role {
                UnitRole::Monitor => self.fail_monitor_query_after,
                _ => None,
            },
        }))
    }

    async fn provision(&self, request: ProvisionRequest) -> LedgerResult<()> {
        if self.fail_provision {
            return Err(LedgerError::injected(
                LedgerStage::Provision,
                "schema setup failed",
            ));
        }
        self.inner.provision(request).await
    }
}

struct StubConnection {
    inner: InMemoryConnection,
    counters: Arc<Counters>,
    commit_calls: u64,
    queries: u64,
    pending: Vec<Mutation>,
    fail_commit_at: Option<u64>,
    lose_credit_at: Option<u64>,
    commit_delay: Option<Duration>,
    fail_query_after: Option<u64>,
}

#[async_trait]
impl LedgerConnection for StubConnection {
    async fn begin(&mut self) -> LedgerResult<()> {
        self.pending.clear();
        self.inner.begin().await
    }

    async fn mutate(&mut self, mutation: Mutation) -> LedgerResult<()> {
        self.pending.push(mutation);
        Ok(())
    }

    async fn commit(&mut self) -> LedgerResult<()> {
        self.commit_calls += 1;
        if self.fail_commit_at == Some(self.commit_calls) {
            self.inner.rollback().await?;
            return Err(LedgerError::injected(
                LedgerStage::Commit,
                "could not serialize access due to concurrent update",
            ));
        }
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }

        let lose_credit = self.lose_credit_at == Some(self.commit_calls);
        for mutation in std::mem::take(&mut self.pending) {
            if lose_credit && mutation.delta < 0 {
                continue;
            }
            self.inner.mutate(mutation).await?;
        }
        self.inner.commit().await?;
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> LedgerResult<()> {
        self.pending.clear();
        self.inner.rollback().await
    }

    async fn query_invariant_sum(&mut self) -> LedgerResult<i64> {
        self.queries += 1;
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_query_after.is_some_and(|after| self.queries > after) {
            return Err(LedgerError::injected(LedgerStage::Query, "connection reset"));
        }
        self.inner.query_invariant_sum().await
    }
}
