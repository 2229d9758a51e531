//! Manager configuration.
//!
//! Every setting is a command-line flag with a `TRIBUTARY_*` environment
//! fallback; [`ManagerConfig::from_args`] validates and converts them.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tributary_broker::{RetryPolicy, RouterConfig};
use tributary_catalog::ReconcilerOptions;
use tributary_logging::LogConfig;
use tributary_protocol::defaults::{
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL_SECS,
    DEFAULT_STATUS_STORE_URL, DEFAULT_TABLE_OWNER, DEFAULT_TICKET_TTL_HOURS,
};
use tributary_protocol::topics::DEAD_LETTER;
use tributary_status_store::{RetentionPolicy, StatusStoreUrl};

pub const APP_NAME: &str = "tributary-manager";

#[derive(Parser, Debug, Clone)]
#[command(name = "tributary-manager", about = "Tenant ingestion manager")]
pub struct ManagerArgs {
    /// Ticket status store (`memory:` or `sqlite:<path>`)
    #[arg(long, env = "TRIBUTARY_STATUS_STORE_URL", default_value = DEFAULT_STATUS_STORE_URL)]
    pub status_store_url: String,

    /// Broker messages processed at once per topic
    #[arg(long, env = "TRIBUTARY_MAX_IN_FLIGHT", default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,

    /// Redeliveries of a failed message before it is dead-lettered
    #[arg(long, env = "TRIBUTARY_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Seconds between redeliveries
    #[arg(long, env = "TRIBUTARY_RETRY_INTERVAL_SECS", default_value_t = DEFAULT_RETRY_INTERVAL_SECS)]
    pub retry_interval_secs: u64,

    #[arg(long, env = "TRIBUTARY_DEAD_LETTER_TOPIC", default_value = DEAD_LETTER)]
    pub dead_letter_topic: String,

    /// Hours a finished or failed ticket stays readable
    #[arg(long, env = "TRIBUTARY_TICKET_TTL_HOURS", default_value_t = DEFAULT_TICKET_TTL_HOURS)]
    pub ticket_ttl_hours: i64,

    /// Owner recorded on created catalog tables
    #[arg(long, env = "TRIBUTARY_TABLE_OWNER", default_value = DEFAULT_TABLE_OWNER)]
    pub table_owner: String,

    /// Keep the case of top-level column names
    #[arg(long, env = "TRIBUTARY_PRESERVE_COLUMN_CASE")]
    pub preserve_column_case: bool,

    /// Log directory (default: ~/.tributary/logs)
    #[arg(long, env = "TRIBUTARY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Debug output on stderr
    #[arg(short, long, env = "TRIBUTARY_VERBOSE")]
    pub verbose: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid status store URL: {0}")]
    StatusStoreUrl(String),

    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: i64 },

    #[error("{name} is out of range, got {value}")]
    OutOfRange { name: &'static str, value: i64 },

    #[error("Dead-letter topic must not be empty")]
    EmptyDeadLetterTopic,
}

/// Validated manager settings.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub status_store: StatusStoreUrl,
    pub router: RouterConfig,
    pub retention: RetentionPolicy,
    pub reconciler: ReconcilerOptions,
    pub log_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl ManagerConfig {
    pub fn from_args(args: ManagerArgs) -> Result<Self, ConfigError> {
        let status_store = StatusStoreUrl::parse(&args.status_store_url)
            .map_err(|e| ConfigError::StatusStoreUrl(e.to_string()))?;
        if args.max_in_flight == 0 {
            return Err(ConfigError::NotPositive {
                name: "max_in_flight",
                value: 0,
            });
        }
        if args.ticket_ttl_hours <= 0 {
            return Err(ConfigError::NotPositive {
                name: "ticket_ttl_hours",
                value: args.ticket_ttl_hours,
            });
        }
        let retention =
            RetentionPolicy::hours(args.ticket_ttl_hours).ok_or(ConfigError::OutOfRange {
                name: "ticket_ttl_hours",
                value: args.ticket_ttl_hours,
            })?;
        let dead_letter_topic = args.dead_letter_topic.trim().to_string();
        if dead_letter_topic.is_empty() {
            return Err(ConfigError::EmptyDeadLetterTopic);
        }

        Ok(Self {
            status_store,
            router: RouterConfig {
                retry: RetryPolicy {
                    max_retries: args.max_retries,
                    interval: Duration::from_secs(args.retry_interval_secs),
                },
                dead_letter_topic,
                max_in_flight: args.max_in_flight,
            },
            retention,
            reconciler: ReconcilerOptions {
                owner: args.table_owner,
                lowercase_columns: !args.preserve_column_case,
                ..ReconcilerOptions::default()
            },
            log_dir: args.log_dir,
            verbose: args.verbose,
        })
    }

    pub fn log_config(&self) -> LogConfig<'static> {
        let mut config = LogConfig::new(APP_NAME);
        config.verbose = self.verbose;
        config.log_dir = self.log_dir.clone();
        config
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            status_store: StatusStoreUrl::Memory,
            router: RouterConfig::default(),
            retention: RetentionPolicy::default(),
            reconciler: ReconcilerOptions::default(),
            log_dir: None,
            verbose: false,
        }
    }
}
