//! Validated newtypes for harness configuration and ledger identities
//!
//! Every value the harness is configured with passes through one of these
//! types, so an out-of-range account count or an unsafe table name is
//! rejected before any connection to the ledger is opened.

use nutype::nutype;
#[allow(unused_imports)] // These are used by nutype derive macros
use serde::{Deserialize, Serialize};

/// Upper bound on provisioned accounts; keeps keys inside `i32` and the
/// expected total far from `i64` overflow.
pub const MAX_ACCOUNTS: u32 = 1_000_000;

/// Upper bound on a single account's starting balance.
pub const MAX_INITIAL_BALANCE: i64 = 1_000_000_000;

/// Key of a ledger account. Keys are 1-based.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Serialize,
        Deserialize,
        Display
    )
)]
pub struct AccountKey(i32);

/// Identity of a transfer worker within one run
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display
))]
pub struct WorkerId(usize);

/// Number of accounts to provision
///
/// At least two accounts are required so that a worker's debit and credit
/// pools can be disjoint.
#[nutype(
    validate(greater_or_equal = 2, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Serialize,
        Deserialize,
        Display
    )
)]
pub struct AccountCount(u32);

impl AccountCount {
    /// All account keys in `1..=count`, in ascending order
    pub fn keys(&self) -> impl Iterator<Item = AccountKey> {
        let upper = i32::try_from(self.into_inner()).unwrap_or(i32::MAX);
        (1..=upper).filter_map(|key| AccountKey::try_new(key).ok())
    }

    pub fn contains(&self, key: AccountKey) -> bool {
        u32::try_from(key.into_inner()).is_ok_and(|key| key <= self.into_inner())
    }
}

/// Starting balance of every account
#[nutype(
    validate(greater_or_equal = 0, less_or_equal = 1_000_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Serialize,
        Deserialize,
        Display
    )
)]
pub struct InitialBalance(i64);

/// Number of concurrent transfer workers
#[nutype(
    validate(greater = 0),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)
)]
pub struct WorkerCount(usize);

impl WorkerCount {
    pub fn ids(&self) -> impl Iterator<Item = WorkerId> {
        (0..self.into_inner()).map(WorkerId::new)
    }
}

/// Number of transfers each worker commits
#[nutype(
    validate(greater = 0),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)
)]
pub struct IterationCount(u64);

/// How many iterations pass between two progress lines
#[nutype(
    validate(greater = 0),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)
)]
pub struct ProgressInterval(u64);

/// Number of keys in each of a worker's debit and credit pools
#[nutype(
    validate(greater = 0),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)
)]
pub struct PoolSize(usize);

/// Name of the accounts table
///
/// Restricted to lower-case SQL identifiers because it is interpolated into
/// statements; Postgres truncates identifiers past 63 bytes.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 63, regex = r"^[a-z_][a-z0-9_]*$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct TableName(String);

impl Default for TableName {
    fn default() -> Self {
        Self::try_new("accounts".to_string()).expect("Default table name is valid")
    }
}

/// Total balance every consistent snapshot of the ledger must show
pub fn expected_total(accounts: AccountCount, initial_balance: InitialBalance) -> i64 {
    i64::from(accounts.into_inner()) * initial_balance.into_inner()
}
