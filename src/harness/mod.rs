//! The concurrent part of the harness: transfer workers, the invariant
//! monitor, and the coordinator that runs and joins them.

pub mod coordinator;
pub mod monitor;
pub mod report;
pub mod worker;

pub use coordinator::{Harness, HarnessConfig};
pub use monitor::{InvariantMonitor, MonitorSettings, MonitorState};
pub use report::{MonitorReport, RunReport, RunSummary, RunVerdict, UnitFailure, WorkerReport};
pub use worker::TransferWorker;
