use crate::domain::types::{
    AccountCount, InitialBalance, IterationCount, PoolSize, ProgressInterval, TableName,
    WorkerCount,
};
use crate::harness::{HarnessConfig, MonitorSettings};
use crate::{Error, Result};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub ledger: LedgerSettings,
    pub harness: HarnessSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database_name: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerSettings {
    pub backend: LedgerBackend,
    pub table: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarnessSettings {
    pub accounts: u32,
    pub initial_balance: i64,
    pub workers: usize,
    pub iterations: u64,
    pub progress_interval: u64,
    pub pool_size: usize,
    pub poll_interval_ms: u64,
    pub final_sample: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

impl Settings {
    pub fn new() -> std::result::Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("database.host", "127.0.0.1")?
            .set_default("database.port", 5432)?
            .set_default("database.username", "postgres")?
            .set_default("database.password", "password")?
            .set_default("database.database_name", "ledger_harness")?
            .set_default("ledger.backend", "postgres")?
            .set_default("ledger.table", "accounts")?
            .set_default("harness.accounts", 100)?
            .set_default("harness.initial_balance", 10_000)?
            .set_default("harness.workers", 8)?
            .set_default("harness.iterations", 10_000)?
            .set_default("harness.progress_interval", 1_000)?
            .set_default("harness.pool_size", 8)?
            .set_default("harness.poll_interval_ms", 0)?
            .set_default("harness.final_sample", false)?
            .set_default("logging.level", "info")?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix("LEDGER_HARNESS").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database_name
        )
    }

    pub fn table_name(&self) -> Result<TableName> {
        TableName::try_new(self.ledger.table.clone()).map_err(|e| Error::validation("ledger.table", e))
    }

    /// Validate the raw harness section into a run configuration
    pub fn harness_config(&self) -> Result<HarnessConfig> {
        let raw = &self.harness;
        let poll_interval = match raw.poll_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(HarnessConfig {
            accounts: AccountCount::try_new(raw.accounts)
                .map_err(|e| Error::validation("harness.accounts", e))?,
            initial_balance: InitialBalance::try_new(raw.initial_balance)
                .map_err(|e| Error::validation("harness.initial_balance", e))?,
            workers: WorkerCount::try_new(raw.workers)
                .map_err(|e| Error::validation("harness.workers", e))?,
            iterations: IterationCount::try_new(raw.iterations)
                .map_err(|e| Error::validation("harness.iterations", e))?,
            progress_interval: ProgressInterval::try_new(raw.progress_interval)
                .map_err(|e| Error::validation("harness.progress_interval", e))?,
            pool_size: PoolSize::try_new(raw.pool_size)
                .map_err(|e| Error::validation("harness.pool_size", e))?,
            monitor: MonitorSettings {
                poll_interval,
                final_sample: raw.final_sample,
            },
        })
    }
}
