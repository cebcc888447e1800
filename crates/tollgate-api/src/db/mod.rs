//! # Database Persistence Layer
//!
//! Postgres persistence for principals, tokens and permissions via SQLx.
//!
//! The database layer is **optional**. When a DSN is configured the service
//! stores everything in PostgreSQL through [`PgRepository`]. Without one it
//! runs over the in-memory store, which is suitable for development and
//! tests and loses all state on restart.
//!
//! Connecting is bounded by a five-second deadline. Embedded migrations run
//! before the pool is handed out.

pub mod postgres;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

pub use postgres::PgRepository;

/// Deadline for establishing the pool and verifying connectivity.
pub const CONNECT_DEADLINE: Duration = Duration::from_secs(5);

/// Store connection settings.
#[derive(Clone)]
pub struct DbConfig {
    /// PostgreSQL DSN. `None` selects the in-memory store.
    pub dsn: Option<String>,
    /// Upper bound on open connections.
    pub max_open_conns: u32,
    /// Idle connections are closed after this long.
    pub max_idle_time: Duration,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("dsn", &self.dsn.as_ref().map(|_| "<redacted>"))
            .field("max_open_conns", &self.max_open_conns)
            .field("max_idle_time", &self.max_idle_time)
            .finish()
    }
}

/// Failure to bring up the database.
#[derive(Error, Debug)]
pub enum DbError {
    /// No DSN configured.
    #[error("no database DSN configured")]
    NoDsn,

    /// Connecting or pinging failed.
    #[error("database connection failed: {0}")]
    Connect(#[from] sqlx::Error),

    /// Connectivity was not established within the deadline.
    #[error("database connection timed out after {0:?}")]
    Timeout(Duration),

    /// Embedded migrations failed.
    #[error("database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Open the pool, verify connectivity and apply migrations.
pub async fn connect(config: &DbConfig) -> Result<PgPool, DbError> {
    let dsn = config.dsn.as_deref().ok_or(DbError::NoDsn)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_open_conns)
        .idle_timeout(config.max_idle_time)
        .acquire_timeout(CONNECT_DEADLINE)
        .connect_lazy(dsn)?;

    tokio::time::timeout(CONNECT_DEADLINE, sqlx::query("SELECT 1").execute(&pool))
        .await
        .map_err(|_| DbError::Timeout(CONNECT_DEADLINE))??;
    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_dsn() {
        let config = DbConfig {
            dsn: Some("postgres://app:hunter2@db/tollgate".into()),
            max_open_conns: 25,
            max_idle_time: Duration::from_secs(900),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn connect_without_dsn_fails_fast() {
        let config = DbConfig {
            dsn: None,
            max_open_conns: 1,
            max_idle_time: Duration::from_secs(1),
        };
        assert!(matches!(connect(&config).await, Err(DbError::NoDsn)));
    }

    #[tokio::test]
    async fn malformed_dsn_is_a_connect_error() {
        let config = DbConfig {
            dsn: Some("not a url".into()),
            max_open_conns: 1,
            max_idle_time: Duration::from_secs(1),
        };
        assert!(matches!(connect(&config).await, Err(DbError::Connect(_))));
    }
}
