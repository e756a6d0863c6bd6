//! Log message constants for harness components
//!
//! Messages without parameters live here so the wording stays consistent
//! between the coordinator, the workers and the monitor.

/// Coordinator lifecycle messages
pub mod harness {
    pub const STARTING: &str = "Starting ledger harness";
    pub const PROVISIONING: &str = "Provisioning ledger accounts";
    pub const PROVISIONED: &str = "Ledger provisioned and verified";
    pub const WORKERS_JOINED: &str = "All transfer workers have finished";
    pub const STOPPING_MONITOR: &str = "Signalling invariant monitor to stop";
    pub const VERIFYING: &str = "Reading final ledger total";
    pub const FINISHED: &str = "Ledger harness run finished";
}

/// Transfer worker messages
pub mod worker {
    pub const STARTED: &str = "Transfer worker started";
    pub const FINISHED: &str = "Transfer worker finished, releasing connection";
}

/// Invariant monitor messages
pub mod monitor {
    pub const STARTED: &str = "Invariant monitor polling";
    pub const STOPPED: &str = "Invariant monitor stopped";
    pub const FINAL_SAMPLE: &str = "Taking final invariant sample";
}
