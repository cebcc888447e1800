//! # tollgate-api Entry Point
//!
//! Parses configuration, selects the store, assembles the application and
//! serves it until SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tollgate_api::config::Cli;
use tollgate_api::db::{self, PgRepository};
use tollgate_api::mailer::LogMailer;
use tollgate_api::server::{shutdown_signal, Server};
use tollgate_api::{app, AppState};
use tollgate_core::logger::props;
use tollgate_core::{Logger, MemoryRepository, Properties, Repository};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse().into_config();
    let logger = Logger::stdout(config.log_level);

    let repo: Arc<dyn Repository> = match &config.db.dsn {
        Some(_) => match db::connect(&config.db).await {
            Ok(pool) => {
                logger.info("database connection pool established", Properties::new());
                Arc::new(PgRepository::new(pool))
            }
            Err(e) => logger.fatal(e, Properties::new()),
        },
        None => {
            logger.info(
                "no database DSN configured, using the in-memory store",
                Properties::new(),
            );
            Arc::new(MemoryRepository::new())
        }
    };

    let mailer = Arc::new(LogMailer::new(logger.clone()));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config, logger.clone(), repo, mailer);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => logger.fatal(e, props([("addr", addr.to_string())])),
    };

    if let Err(e) = Server::new(&state)
        .run(app(state.clone()), listener, shutdown_signal())
        .await
    {
        logger.fatal(e, Properties::new());
    }
}
