//! Ledger Harness - a concurrency-correctness harness for transactional stores
//!
//! Many workers commit balance-preserving transfers against a shared ledger
//! while a monitor keeps re-reading the total balance. Any change of the
//! total it observes exposes an isolation or atomicity fault in the store.

pub mod config;
pub mod domain;
pub mod error;
pub mod harness;
pub mod infrastructure;
pub mod ledger;

pub use error::{Error, Result};
pub use harness::{Harness, HarnessConfig, RunReport, RunVerdict};
