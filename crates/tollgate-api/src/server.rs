//! # Server Lifecycle
//!
//! [`Server::run`] serves the router until the shutdown future resolves,
//! then shuts down in two strictly ordered phases:
//!
//! 1. stop accepting connections and drain in-flight requests, bounded by
//!    the drain deadline (30 seconds by default);
//! 2. wait for every background task registered on [`BackgroundTasks`].
//!
//! Phase 2 always runs, even when the drain failed, so queued mail still goes
//! out. A background task that never finishes blocks shutdown indefinitely.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tollgate_core::logger::props;
use tollgate_core::Logger;

use crate::state::{AppState, Environment};
use crate::tasks::BackgroundTasks;

/// Default bound on draining in-flight requests after the shutdown signal.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Fault raised while serving or draining.
#[derive(Error, Debug)]
pub enum ServeError {
    /// Listener or connection I/O failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// In-flight requests did not finish within the drain deadline.
    #[error("in-flight requests did not drain within {0:?}")]
    DrainTimeout(Duration),
}

/// HTTP server with graceful shutdown.
#[derive(Debug, Clone)]
pub struct Server {
    logger: Logger,
    env: Environment,
    tasks: BackgroundTasks,
    drain_deadline: Duration,
}

impl Server {
    /// Server over `state`'s logger and task tracker.
    pub fn new(state: &AppState) -> Self {
        Self {
            logger: state.logger.clone(),
            env: state.config.env,
            tasks: state.tasks.clone(),
            drain_deadline: DRAIN_DEADLINE,
        }
    }

    /// Override the drain deadline.
    pub fn drain_deadline(mut self, deadline: Duration) -> Self {
        self.drain_deadline = deadline;
        self
    }

    /// Serve `app` on `listener` until `shutdown` resolves with a signal name.
    ///
    /// Returns `Ok(())` after a clean drain, or the first drain fault. Either
    /// way every background task has finished by the time this returns.
    pub async fn run<F>(self, app: Router, listener: TcpListener, shutdown: F) -> Result<(), ServeError>
    where
        F: Future<Output = String> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        self.logger.info(
            "starting server",
            props([("addr", addr.to_string()), ("env", self.env.to_string())]),
        );

        let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
        let logger = self.logger.clone();
        let graceful = async move {
            let signal = shutdown.await;
            logger.info("shutting down server", props([("signal", signal)]));
            let _ = signalled_tx.send(());
        };

        let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(graceful)
            .into_future();
        tokio::pin!(server);

        let drained = tokio::select! {
            result = &mut server => result.map_err(ServeError::from),
            () = drain_expiry(signalled_rx, self.drain_deadline) => {
                Err(ServeError::DrainTimeout(self.drain_deadline))
            }
        };

        self.logger.info(
            "completing background tasks",
            props([("addr", addr.to_string())]),
        );
        self.tasks.wait().await;

        drained?;
        self.logger.info("stopped server", props([("addr", addr.to_string())]));
        Ok(())
    }
}

/// Resolves `deadline` after the shutdown signal. Never resolves if the
/// server stops without one.
async fn drain_expiry(signalled: oneshot::Receiver<()>, deadline: Duration) {
    if signalled.await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(deadline).await;
}

/// Wait for SIGINT or SIGTERM and return its name.
///
/// If a handler cannot be installed the failure is logged and that signal is
/// never reported.
pub async fn shutdown_signal() -> String {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT".to_string(),
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM".to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<String>();

    tokio::select! {
        signal = interrupt => signal,
        signal = terminate => signal,
    }
}
