//! Domain types for the ledger harness
//!
//! Validated configuration values, the assignment of account keys to
//! workers, and tracking of the observed total balance.

pub mod assignment;
pub mod invariant;
pub mod types;

pub use assignment::{AssignmentError, AssignmentPlan, WorkerAssignment};
pub use invariant::{InvariantChange, InvariantTracker, Observation};
pub use types::*;
