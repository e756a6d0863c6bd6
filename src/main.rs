use anyhow::{bail, Result};
use ledger_harness::config::{LedgerBackend, Settings};
use ledger_harness::ledger::{InMemoryLedger, LedgerConnector, PgLedger};
use ledger_harness::{Harness, RunVerdict};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = settings.harness_config()?;
    let connector: Arc<dyn LedgerConnector> = match settings.ledger.backend {
        LedgerBackend::Postgres => {
            info!(
                "Connecting to database at {}:{}",
                settings.database.host, settings.database.port
            );
            Arc::new(PgLedger::from_url(
                &settings.database_url(),
                settings.table_name()?,
            )?)
        }
        LedgerBackend::Memory => {
            info!("Using in-process ledger");
            Arc::new(InMemoryLedger::new())
        }
    };

    let harness = Harness::new(connector, config)?;
    let report = harness.run().await?;
    println!("{}", serde_json::to_string(&report.summary())?);

    match report.verdict() {
        RunVerdict::Consistent => {
            info!("done");
            Ok(())
        }
        RunVerdict::InvariantViolated {
            expected,
            changes,
            final_sum,
            ..
        } => {
            warn!(
                expected,
                ?final_sum,
                "Observed {} change(s) of the total balance",
                changes.len()
            );
            bail!("invariant violated: total balance did not stay at {expected}")
        }
        RunVerdict::HarnessFailed { failures } => {
            for failure in &report.failures {
                error!("{}", failure);
            }
            bail!("{failures} harness unit(s) failed")
        }
    }
}
