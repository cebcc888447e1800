//! # Command-Line & Environment Configuration
//!
//! Every setting is a flag with an environment-variable fallback. Flags win
//! over the environment; both win over the defaults.

use std::time::Duration;

use clap::{ArgAction, Parser};
use tollgate_core::Level;

use crate::db::DbConfig;
use crate::middleware::rate_limit::RateLimitConfig;
use crate::state::{AppConfig, Environment};

/// Tollgate API server.
///
/// Serves the user and token endpoints over an in-memory store, or over
/// Postgres when a DSN is given.
#[derive(Parser, Debug)]
#[command(name = "tollgate-api", version, about)]
pub struct Cli {
    /// API server port.
    #[arg(long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    /// Environment.
    #[arg(long, env = "APP_ENV", value_enum, default_value_t = Environment::Development)]
    pub env: Environment,

    /// PostgreSQL DSN. Without one the in-memory store is used.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub db_dsn: Option<String>,

    /// PostgreSQL max open connections.
    #[arg(long, env = "DB_MAX_OPEN_CONNS", default_value_t = 25)]
    pub db_max_open_conns: u32,

    /// PostgreSQL max connection idle time (e.g. 30s, 15m, 1h).
    #[arg(long, env = "DB_MAX_IDLE_TIME", default_value = "15m", value_parser = parse_duration)]
    pub db_max_idle_time: Duration,

    /// Rate limiter maximum requests per second.
    #[arg(long, env = "LIMITER_RPS", default_value_t = 2.0)]
    pub limiter_rps: f64,

    /// Rate limiter maximum burst.
    #[arg(long, env = "LIMITER_BURST", default_value_t = 4)]
    pub limiter_burst: u32,

    /// Enable rate limiter.
    #[arg(long, env = "LIMITER_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub limiter_enabled: bool,

    /// Trusted CORS origins (space separated).
    #[arg(long, env = "CORS_TRUSTED_ORIGINS", value_delimiter = ' ', num_args = 0..)]
    pub cors_trusted_origins: Vec<String>,

    /// Permissions granted at registration (comma separated).
    #[arg(
        long,
        env = "DEFAULT_PERMISSIONS",
        value_delimiter = ',',
        default_value = "resources:read"
    )]
    pub default_permissions: Vec<String>,

    /// Minimum log level (info, error, fatal, off).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: Level,
}

impl Cli {
    /// Resolve into the service configuration.
    pub fn into_config(self) -> AppConfig {
        AppConfig {
            port: self.port,
            env: self.env,
            db: DbConfig {
                dsn: self.db_dsn.filter(|dsn| !dsn.trim().is_empty()),
                max_open_conns: self.db_max_open_conns,
                max_idle_time: self.db_max_idle_time,
            },
            limiter: RateLimitConfig {
                requests_per_second: self.limiter_rps,
                burst: self.limiter_burst,
                enabled: self.limiter_enabled,
            },
            cors_trusted_origins: self
                .cors_trusted_origins
                .into_iter()
                .filter(|o| !o.is_empty())
                .collect(),
            default_permissions: self
                .default_permissions
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            log_level: self.log_level,
        }
    }
}

/// Parse `<n>s`, `<n>m` or `<n>h`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.char_indices().last().map_or(0, |(i, _)| i);
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration \"{s}\" (expected e.g. 30s, 15m, 1h)"))?;
    let secs = match unit {
        "s" => n,
        "m" => n.saturating_mul(60),
        "h" => n.saturating_mul(3600),
        _ => return Err(format!("invalid duration unit in \"{s}\" (expected s, m or h)")),
    };
    Ok(Duration::from_secs(secs))
}
