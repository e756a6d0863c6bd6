//! In-process ledger
//!
//! Transactions buffer their mutations and apply them under a single lock at
//! commit, so every commit is atomic and every sum is taken from a consistent
//! snapshot. Used for dry runs and as the base of test doubles.

use super::{
    LedgerConnection, LedgerConnector, LedgerError, LedgerResult, LedgerStage, Mutation,
    ProvisionRequest, UnitRole,
};
use crate::domain::types::{expected_total, AccountKey};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    accounts: Arc<Mutex<BTreeMap<AccountKey, i64>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection with its concrete type, for wrappers that need it
    pub fn open(&self) -> InMemoryConnection {
        InMemoryConnection {
            accounts: Arc::clone(&self.accounts),
            pending: None,
        }
    }

    pub fn balance(&self, key: AccountKey) -> Option<i64> {
        self.accounts.lock().get(&key).copied()
    }

    pub fn total(&self) -> i64 {
        self.accounts.lock().values().sum()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().len()
    }
}

#[async_trait]
impl LedgerConnector for InMemoryLedger {
    async fn connect(&self, _role: UnitRole) -> LedgerResult<Box<dyn LedgerConnection>> {
        Ok(Box::new(self.open()))
    }

    async fn provision(&self, request: ProvisionRequest) -> LedgerResult<()> {
        let balance = request.initial_balance.into_inner();
        let mut accounts = self.accounts.lock();
        *accounts = request.accounts.keys().map(|key| (key, balance)).collect();

        let expected_accounts = i64::from(request.accounts.into_inner());
        let expected_total = expected_total(request.accounts, request.initial_balance);
        let actual_accounts = i64::try_from(accounts.len()).unwrap_or(i64::MAX);
        let actual_total: i64 = accounts.values().sum();
        if actual_accounts != expected_accounts || actual_total != expected_total {
            return Err(LedgerError::ProvisionMismatch {
                expected_accounts,
                expected_total,
                actual_accounts,
                actual_total,
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryConnection {
    accounts: Arc<Mutex<BTreeMap<AccountKey, i64>>>,
    pending: Option<Vec<Mutation>>,
}

#[async_trait]
impl LedgerConnection for InMemoryConnection {
    async fn begin(&mut self) -> LedgerResult<()> {
        if self.pending.is_some() {
            return Err(LedgerError::TransactionInProgress);
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    async fn mutate(&mut self, mutation: Mutation) -> LedgerResult<()> {
        if !self.accounts.lock().contains_key(&mutation.key) {
            return Err(LedgerError::UnknownAccount(mutation.key));
        }
        match self.pending.as_mut() {
            Some(pending) => {
                pending.push(mutation);
                Ok(())
            }
            None => Err(LedgerError::NoTransaction {
                stage: LedgerStage::Mutate,
            }),
        }
    }

    async fn commit(&mut self) -> LedgerResult<()> {
        let pending = self.pending.take().ok_or(LedgerError::NoTransaction {
            stage: LedgerStage::Commit,
        })?;
        let mut accounts = self.accounts.lock();
        for mutation in pending {
            // Accounts are never deleted during a run, so keys checked at
            // mutate time are still present.
            if let Some(balance) = accounts.get_mut(&mutation.key) {
                *balance += mutation.delta;
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> LedgerResult<()> {
        self.pending = None;
        Ok(())
    }

    async fn query_invariant_sum(&mut self) -> LedgerResult<i64> {
        Ok(self.accounts.lock().values().sum())
    }
}
