use crate::domain::assignment::AssignmentError;
use crate::harness::report::UnitFailure;
use crate::ledger::LedgerError;
use thiserror::Error;

/// Ledger harness error types
///
/// An observed change of the total balance is not an error; it is reported
/// through [`crate::harness::RunVerdict`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Invalid worker assignment: {0}")]
    Assignment(#[from] AssignmentError),

    #[error("Provisioning failed: {0}")]
    Provisioning(#[source] LedgerError),

    #[error("{} harness unit(s) failed", .failures.len())]
    UnitsFailed { failures: Vec<UnitFailure> },
}

impl Error {
    pub fn validation(field: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Validation {
            field,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
