//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor. Every field is cheap to clone.

use std::sync::Arc;
use std::time::Duration;

use tollgate_core::{Level, Logger, Repository, TokenManager};

use crate::db::DbConfig;
use crate::mailer::Mailer;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::tasks::BackgroundTasks;

/// Deployment environment, reported by the healthcheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved service configuration. The DSN is redacted in `Debug`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Deployment environment.
    pub env: Environment,
    /// Store connection settings. `dsn: None` selects the in-memory store.
    pub db: DbConfig,
    /// Per-client rate limiting.
    pub limiter: RateLimitConfig,
    /// Origins allowed by the CORS gate.
    pub cors_trusted_origins: Vec<String>,
    /// Capabilities granted at registration.
    pub default_permissions: Vec<String>,
    /// Minimum level written by the structured logger.
    pub log_level: Level,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            env: Environment::Development,
            db: DbConfig {
                dsn: None,
                max_open_conns: 25,
                max_idle_time: Duration::from_secs(15 * 60),
            },
            limiter: RateLimitConfig::default(),
            cors_trusted_origins: Vec::new(),
            default_permissions: vec!["resources:read".to_string()],
            log_level: Level::Info,
        }
    }
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Resolved configuration.
    pub config: Arc<AppConfig>,
    /// Process-wide structured logger.
    pub logger: Logger,
    /// Principal, token and permission store.
    pub repo: Arc<dyn Repository>,
    /// Outbound mail collaborator.
    pub mailer: Arc<dyn Mailer>,
    /// Tracker for detached work, drained at shutdown.
    pub tasks: BackgroundTasks,
    /// Per-client request budget.
    pub limiter: RateLimiter,
}

impl AppState {
    /// Assemble state from its collaborators.
    pub fn new(
        config: AppConfig,
        logger: Logger,
        repo: Arc<dyn Repository>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let limiter = RateLimiter::new(config.limiter.clone());
        let tasks = BackgroundTasks::new(logger.clone());
        Self {
            config: Arc::new(config),
            logger,
            repo,
            mailer,
            tasks,
            limiter,
        }
    }

    /// Token manager over this state's store.
    pub fn tokens(&self) -> TokenManager {
        TokenManager::new(Arc::clone(&self.repo))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}
