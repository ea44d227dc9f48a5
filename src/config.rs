use clap::Parser;
use std::time::Duration;
use thiserror::Error;

use crate::logging::LogFormat;
use crate::pruner::PruneConfig;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "signer-relay")]
#[command(about = "Relay for short-lived remote signing events")]
#[command(version)]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "RELAY_PORT", default_value_t = 3334)]
    pub port: u16,

    // Max events per pubkey per rate window
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value_t = 100)]
    pub rate_limit: usize,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_WINDOW_SECS", default_value_t = 60)]
    pub rate_window: u64,

    // How often idle pubkeys are evicted, in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 120)]
    pub sweep_interval: u64,

    // How long events are kept, in minutes
    #[arg(long, env = "KEEP_IN_MINUTES", default_value_t = 10)]
    pub keep_minutes: u64,

    // Accepted distance between created_at and now, in minutes
    #[arg(long, env = "ACCEPT_WINDOW_IN_MINUTES", default_value_t = 1)]
    pub accept_window_minutes: u64,

    // Time budget for one pruning pass, in seconds
    #[arg(long, env = "PRUNE_BUDGET_SECS", default_value_t = 30)]
    pub prune_budget: u64,

    // Log filter, e.g. "info" or "signer_relay=debug"
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    // compact | json
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    MustBePositive(&'static str),
}

// Validated settings, fixed for the lifetime of the process
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub sweep_interval: Duration,
    pub acceptance_window: Duration,
    pub prune: PruneConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Args {
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let positive = |value: u64, name: &'static str| {
            if value == 0 {
                Err(ConfigError::MustBePositive(name))
            } else {
                Ok(value)
            }
        };

        let rate_limit = positive(self.rate_limit as u64, "rate limit")? as usize;
        let rate_window = Duration::from_secs(positive(self.rate_window, "rate window")?);
        let sweep_interval = Duration::from_secs(positive(self.sweep_interval, "sweep interval")?);
        let retention = Duration::from_secs(positive(self.keep_minutes, "retention")? * 60);
        let acceptance_window =
            Duration::from_secs(positive(self.accept_window_minutes, "acceptance window")? * 60);
        let budget = Duration::from_secs(positive(self.prune_budget, "prune budget")?);

        Ok(Settings {
            port: self.port,
            rate_limit,
            rate_window,
            sweep_interval,
            acceptance_window,
            prune: PruneConfig {
                budget,
                ..PruneConfig::for_retention(retention)
            },
            log_level: self.log_level.clone(),
            log_format: LogFormat::parse(&self.log_format),
        })
    }
}
