//! The ledger client seam
//!
//! The harness never talks to a store directly. A [`LedgerConnector`] hands
//! out one [`LedgerConnection`] per worker or monitor; connections are owned
//! exclusively by the unit that opened them and are never pooled.

pub mod memory;
pub mod postgres;

use crate::domain::types::{AccountCount, AccountKey, InitialBalance, WorkerId};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use memory::InMemoryLedger;
pub use postgres::PgLedger;

/// Which ledger call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LedgerStage {
    Connect,
    Provision,
    Begin,
    Mutate,
    Commit,
    Rollback,
    Query,
}

impl std::fmt::Display for LedgerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            LedgerStage::Connect => "connect",
            LedgerStage::Provision => "provision",
            LedgerStage::Begin => "begin",
            LedgerStage::Mutate => "mutate",
            LedgerStage::Commit => "commit",
            LedgerStage::Rollback => "rollback",
            LedgerStage::Query => "query",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{stage} failed: {source}")]
    Database {
        stage: LedgerStage,
        #[source]
        source: sqlx::Error,
    },

    #[error("account {0} does not exist")]
    UnknownAccount(AccountKey),

    #[error("{stage} called without an open transaction")]
    NoTransaction { stage: LedgerStage },

    #[error("begin called while a transaction is already open")]
    TransactionInProgress,

    #[error("provisioned ledger does not verify: expected {expected_accounts} accounts totalling {expected_total}, found {actual_accounts} totalling {actual_total}")]
    ProvisionMismatch {
        expected_accounts: i64,
        expected_total: i64,
        actual_accounts: i64,
        actual_total: i64,
    },

    #[error("{stage} failed: {message}")]
    Injected { stage: LedgerStage, message: String },
}

impl LedgerError {
    pub fn database(stage: LedgerStage) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Database { stage, source }
    }

    pub fn injected(stage: LedgerStage, message: impl Into<String>) -> Self {
        Self::Injected {
            stage,
            message: message.into(),
        }
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// One `balance[key] += delta` statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mutation {
    pub key: AccountKey,
    pub delta: i64,
}

impl Mutation {
    pub fn new(key: AccountKey, delta: i64) -> Self {
        Self { key, delta }
    }
}

/// The harness unit a connection is opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnitRole {
    Worker(WorkerId),
    Monitor,
    Verifier,
    /// Schema setup and seeding before any unit starts
    Provisioner,
}

impl std::fmt::Display for UnitRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitRole::Worker(worker) => write!(f, "worker-{worker}"),
            UnitRole::Monitor => f.write_str("monitor"),
            UnitRole::Verifier => f.write_str("verifier"),
            UnitRole::Provisioner => f.write_str("provisioner"),
        }
    }
}

/// Accounts to provision, all at the same starting balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub accounts: AccountCount,
    pub initial_balance: InitialBalance,
}

/// Factory for exclusively owned ledger connections
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    /// Open a new connection dedicated to `role`
    async fn connect(&self, role: UnitRole) -> LedgerResult<Box<dyn LedgerConnection>>;

    /// Create every account at its starting balance, replacing any previous
    /// contents, and verify the result. Running it twice yields the same state.
    async fn provision(&self, request: ProvisionRequest) -> LedgerResult<()>;
}

/// A single connection to the ledger
///
/// At most one transaction is open on a connection at a time; `mutate` and
/// `commit` act on that transaction.
#[async_trait]
pub trait LedgerConnection: Send {
    async fn begin(&mut self) -> LedgerResult<()>;

    /// Apply `balance[key] += delta` inside the open transaction
    async fn mutate(&mut self, mutation: Mutation) -> LedgerResult<()>;

    async fn commit(&mut self) -> LedgerResult<()>;

    async fn rollback(&mut self) -> LedgerResult<()>;

    /// Sum of all balances, read outside any explicit transaction
    async fn query_invariant_sum(&mut self) -> LedgerResult<i64>;

    /// Run `mutations` in order inside one transaction and commit it.
    ///
    /// A failed mutation rolls the transaction back before the error is
    /// returned. A failed commit is returned as is; it is never retried.
    async fn execute_transaction(&mut self, mutations: &[Mutation]) -> LedgerResult<()> {
        self.begin().await?;
        for mutation in mutations {
            if let Err(error) = self.mutate(*mutation).await {
                // The mutation error is the one worth reporting.
                let _ = self.rollback().await;
                return Err(error);
            }
        }
        self.commit().await
    }
}
