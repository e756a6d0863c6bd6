//! Static assignment of account keys to transfer workers
//!
//! Each worker draws its debit key from one pool and its credit key from
//! another. The two pools of a single worker never share a key, so a single
//! transfer always touches two distinct accounts. Pools of different workers
//! may overlap; that overlap is where the contention under test comes from.

use super::types::{AccountCount, AccountKey, PoolSize, WorkerCount, WorkerId};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolKind {
    Debit,
    Credit,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Debit => write!(f, "debit"),
            PoolKind::Credit => write!(f, "credit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("{pool} pool is empty")]
    EmptyPool { pool: PoolKind },

    #[error("account {key} is in both the debit and the credit pool")]
    OverlappingPools { key: AccountKey },

    #[error("worker {worker} references account {key} which is not provisioned")]
    UnknownAccount { worker: WorkerId, key: AccountKey },

    #[error("plan has no assignment for worker {worker}")]
    MissingWorker { worker: WorkerId },

    #[error("plan assigns {actual} workers but {expected} are configured")]
    WorkerCountMismatch { expected: usize, actual: usize },
}

/// The two key pools of one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerAssignment {
    debit: Vec<AccountKey>,
    credit: Vec<AccountKey>,
}

impl WorkerAssignment {
    pub fn new(
        debit: impl IntoIterator<Item = AccountKey>,
        credit: impl IntoIterator<Item = AccountKey>,
    ) -> Result<Self, AssignmentError> {
        let debit: BTreeSet<AccountKey> = debit.into_iter().collect();
        let credit: BTreeSet<AccountKey> = credit.into_iter().collect();

        if debit.is_empty() {
            return Err(AssignmentError::EmptyPool {
                pool: PoolKind::Debit,
            });
        }
        if credit.is_empty() {
            return Err(AssignmentError::EmptyPool {
                pool: PoolKind::Credit,
            });
        }
        if let Some(key) = debit.intersection(&credit).next() {
            return Err(AssignmentError::OverlappingPools { key: *key });
        }

        Ok(Self {
            debit: debit.into_iter().collect(),
            credit: credit.into_iter().collect(),
        })
    }

    pub fn debit(&self) -> &[AccountKey] {
        &self.debit
    }

    pub fn credit(&self) -> &[AccountKey] {
        &self.credit
    }

    /// Draw one debit key and one credit key, each uniformly at random
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> (AccountKey, AccountKey) {
        let debit = self.debit[rng.gen_range(0..self.debit.len())];
        let credit = self.credit[rng.gen_range(0..self.credit.len())];
        (debit, credit)
    }

    fn keys(&self) -> impl Iterator<Item = AccountKey> + '_ {
        self.debit.iter().chain(self.credit.iter()).copied()
    }
}

/// Assignment of key pools to every worker of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentPlan {
    workers: BTreeMap<WorkerId, WorkerAssignment>,
}

impl AssignmentPlan {
    pub fn new(workers: BTreeMap<WorkerId, WorkerAssignment>) -> Self {
        Self { workers }
    }

    /// Build the default plan: debit keys come from the odd accounts, credit
    /// keys from the even ones, and each worker takes a window of
    /// `pool_size` keys. Windows advance by half a window per worker, so
    /// neighbouring workers always contend on shared rows.
    ///
    /// Every transfer updates its odd key before its even key, which keeps
    /// row locks acquired in one global order.
    pub fn striped(accounts: AccountCount, workers: WorkerCount, pool_size: PoolSize) -> Self {
        let (odd, even): (Vec<AccountKey>, Vec<AccountKey>) = accounts
            .keys()
            .partition(|key| key.into_inner() % 2 == 1);

        let plan = workers
            .ids()
            .map(|worker| {
                let debit = window(&odd, worker, pool_size);
                let credit = window(&even, worker, pool_size);
                let assignment = WorkerAssignment { debit, credit };
                (worker, assignment)
            })
            .collect();

        Self { workers: plan }
    }

    /// Check the plan against the provisioned accounts and worker count
    pub fn validate(
        &self,
        accounts: AccountCount,
        workers: WorkerCount,
    ) -> Result<(), AssignmentError> {
        for worker in workers.ids() {
            if !self.workers.contains_key(&worker) {
                return Err(AssignmentError::MissingWorker { worker });
            }
        }
        if self.workers.len() != workers.into_inner() {
            return Err(AssignmentError::WorkerCountMismatch {
                expected: workers.into_inner(),
                actual: self.workers.len(),
            });
        }

        for (worker, assignment) in &self.workers {
            // Re-run construction checks; a plan may have been deserialized
            // or assembled by hand.
            WorkerAssignment::new(
                assignment.debit.iter().copied(),
                assignment.credit.iter().copied(),
            )?;
            if let Some(key) = assignment.keys().find(|key| !accounts.contains(*key)) {
                return Err(AssignmentError::UnknownAccount {
                    worker: *worker,
                    key,
                });
            }
        }

        Ok(())
    }

    pub fn get(&self, worker: WorkerId) -> Option<&WorkerAssignment> {
        self.workers.get(&worker)
    }

    pub fn iter(&self) -> impl Iterator<Item = (WorkerId, &WorkerAssignment)> {
        self.workers
            .iter()
            .map(|(worker, assignment)| (*worker, assignment))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

fn window(keys: &[AccountKey], worker: WorkerId, pool_size: PoolSize) -> Vec<AccountKey> {
    let width = pool_size.into_inner().min(keys.len());
    let step = width / 2;
    let start = worker.into_inner() % keys.len() * step % keys.len();
    let window: BTreeSet<AccountKey> = (0..width)
        .map(|offset| keys[(start + offset) % keys.len()])
        .collect();
    window.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn key(value: i32) -> AccountKey {
        AccountKey::try_new(value).unwrap()
    }

    fn keys(values: &[i32]) -> Vec<AccountKey> {
        values.iter().copied().map(key).collect()
    }

    #[test]
    fn test_assignment_rejects_overlapping_pools() {
        let result = WorkerAssignment::new(keys(&[1, 3, 5]), keys(&[2, 5]));
        assert_eq!(
            result,
            Err(AssignmentError::OverlappingPools { key: key(5) })
        );
    }

    #[test]
    fn test_assignment_rejects_empty_pools() {
        assert_eq!(
            WorkerAssignment::new(Vec::new(), keys(&[2])),
            Err(AssignmentError::EmptyPool {
                pool: PoolKind::Debit
            })
        );
        assert_eq!(
            WorkerAssignment::new(keys(&[1]), Vec::new()),
            Err(AssignmentError::EmptyPool {
                pool: PoolKind::Credit
            })
        );
    }

    #[test]
    fn test_draw_stays_inside_pools() {
        let assignment = WorkerAssignment::new(keys(&[1, 3, 4]), keys(&[2, 6, 9])).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let (debit, credit) = assignment.draw(&mut rng);
            assert!(assignment.debit().contains(&debit));
            assert!(assignment.credit().contains(&credit));
            assert_ne!(debit, credit);
        }
    }

    #[test]
    fn test_striped_plan_splits_odd_debit_and_even_credit_keys() {
        let plan = AssignmentPlan::striped(
            AccountCount::try_new(100).unwrap(),
            WorkerCount::try_new(8).unwrap(),
            PoolSize::try_new(8).unwrap(),
        );
        assert_eq!(plan.len(), 8);
        let first = plan.get(WorkerId::new(0)).unwrap();
        assert_eq!(first.debit(), keys(&[1, 3, 5, 7, 9, 11, 13, 15]).as_slice());
        assert_eq!(first.credit(), keys(&[2, 4, 6, 8, 10, 12, 14, 16]).as_slice());
    }

    #[test]
    fn test_validate_rejects_unknown_account() {
        let mut workers = BTreeMap::new();
        workers.insert(
            WorkerId::new(0),
            WorkerAssignment::new(keys(&[1]), keys(&[42])).unwrap(),
        );
        let plan = AssignmentPlan::new(workers);
        let result = plan.validate(
            AccountCount::try_new(10).unwrap(),
            WorkerCount::try_new(1).unwrap(),
        );
        assert_eq!(
            result,
            Err(AssignmentError::UnknownAccount {
                worker: WorkerId::new(0),
                key: key(42)
            })
        );
    }

    #[test]
    fn test_validate_rejects_missing_worker() {
        let mut workers = BTreeMap::new();
        workers.insert(
            WorkerId::new(1),
            WorkerAssignment::new(keys(&[1]), keys(&[2])).unwrap(),
        );
        let plan = AssignmentPlan::new(workers);
        let result = plan.validate(
            AccountCount::try_new(10).unwrap(),
            WorkerCount::try_new(1).unwrap(),
        );
        assert_eq!(
            result,
            Err(AssignmentError::MissingWorker {
                worker: WorkerId::new(0)
            })
        );
    }

    #[test]
    fn test_validate_rejects_extra_workers() {
        let plan = AssignmentPlan::striped(
            AccountCount::try_new(10).unwrap(),
            WorkerCount::try_new(3).unwrap(),
            PoolSize::try_new(2).unwrap(),
        );
        let result = plan.validate(
            AccountCount::try_new(10).unwrap(),
            WorkerCount::try_new(2).unwrap(),
        );
        assert_eq!(
            result,
            Err(AssignmentError::WorkerCountMismatch {
                expected: 2,
                actual: 3
            })
        );
    }

    /// Keys of `worker` that at least one other worker also draws from
    fn shared_keys(plan: &AssignmentPlan, worker: WorkerId) -> usize {
        let own = plan.get(worker).unwrap();
        own.keys()
            .filter(|key| {
                plan.iter()
                    .any(|(other, assignment)| other != worker && assignment.keys().any(|k| k == *key))
            })
            .count()
    }

    #[test]
    fn test_default_plan_makes_every_worker_contend() {
        let plan = AssignmentPlan::striped(
            AccountCount::try_new(100).unwrap(),
            WorkerCount::try_new(8).unwrap(),
            PoolSize::try_new(8).unwrap(),
        );
        for (worker, _) in plan.iter() {
            assert!(
                shared_keys(&plan, worker) > 0,
                "worker {worker} touches no row any other worker touches"
            );
        }
        let second = plan.get(WorkerId::new(1)).unwrap();
        assert_eq!(second.debit(), keys(&[9, 11, 13, 15, 17, 19, 21, 23]).as_slice());
    }

    proptest! {
        #[test]
        fn prop_striped_plan_shares_keys_between_workers(
            accounts in 2u32..500,
            workers in 2usize..32,
            pool_size in 1usize..20,
        ) {
            let plan = AssignmentPlan::striped(
                AccountCount::try_new(accounts).unwrap(),
                WorkerCount::try_new(workers).unwrap(),
                PoolSize::try_new(pool_size).unwrap(),
            );
            for (worker, _) in plan.iter() {
                prop_assert!(shared_keys(&plan, worker) > 0);
            }
        }

        #[test]
        fn prop_striped_plan_is_always_valid_and_disjoint(
            accounts in 2u32..500,
            workers in 1usize..32,
            pool_size in 1usize..20,
        ) {
            let accounts = AccountCount::try_new(accounts).unwrap();
            let workers = WorkerCount::try_new(workers).unwrap();
            let plan = AssignmentPlan::striped(accounts, workers, PoolSize::try_new(pool_size).unwrap());

            prop_assert!(plan.validate(accounts, workers).is_ok());
            for (_, assignment) in plan.iter() {
                prop_assert!(!assignment.debit().is_empty());
                prop_assert!(!assignment.credit().is_empty());
                for debit in assignment.debit() {
                    prop_assert!(!assignment.credit().contains(debit));
                }
            }
        }
    }
}
