//! Command-line and environment configuration

use clap::{Args, Parser, ValueEnum};
use jiff::Timestamp;

use crate::cli::Command;

/// Conditions CLI configuration
#[derive(Debug, Parser)]
#[command(name = "conditions", about = "Commercial condition resolution", long_about = None)]
pub struct AppConfig {
    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Application database settings.
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Resolution settings.
    #[command(flatten)]
    pub resolution: ResolutionConfig,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

impl AppConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }
}

/// Database settings.
#[derive(Debug, Args)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Maximum pooled connections; resolution lookups for one request share the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 8)]
    pub max_connections: u32,

    /// Time to wait for a pooled connection, in milliseconds.
    #[arg(long, env = "DATABASE_ACQUIRE_TIMEOUT_MS", default_value_t = 3_000)]
    pub acquire_timeout_ms: u64,
}

/// Log output format.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Args)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "warn")]
    pub log_level: String,

    /// Log format (compact, json)
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

/// Resolution settings.
#[derive(Debug, Args)]
pub struct ResolutionConfig {
    /// Abort the operation after this many milliseconds.
    #[arg(long, env = "RESOLUTION_TIMEOUT_MS", default_value_t = 5_000)]
    pub timeout_ms: u64,

    /// Evaluate validity windows at this instant instead of now (RFC 3339).
    #[arg(long)]
    pub at: Option<Timestamp>,
}

impl ResolutionConfig {
    /// The evaluation instant for this run.
    #[must_use]
    pub fn point_in_time(&self) -> Timestamp {
        self.at.unwrap_or_else(Timestamp::now)
    }
}
