//! # Background Task Supervisor
//!
//! Detached work (mail delivery, mostly) runs on its own tokio task so the
//! response is not held up. Each task is counted from the moment it is
//! spawned until it finishes; [`BackgroundTasks::wait`] resolves once the
//! count reaches zero. Shutdown calls it after the server has drained.
//!
//! A panic inside a task is caught at the task boundary and logged at error
//! level. It never reaches the process.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tollgate_core::{Logger, Properties};

#[derive(Debug, Default)]
struct Counter {
    active: AtomicUsize,
    idle: Notify,
}

/// Decrements the counter when the supervised task ends, however it ends.
struct Registration(Arc<Counter>);

impl Registration {
    fn new(counter: Arc<Counter>) -> Self {
        counter.active.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Counting tracker for detached work.
#[derive(Clone)]
pub struct BackgroundTasks {
    counter: Arc<Counter>,
    logger: Logger,
}

impl BackgroundTasks {
    /// Create an empty tracker that reports panics through `logger`.
    pub fn new(logger: Logger) -> Self {
        Self {
            counter: Arc::new(Counter::default()),
            logger,
        }
    }

    /// Run `task` on its own tokio task.
    ///
    /// The task is counted before this returns, so a [`wait`](Self::wait)
    /// issued afterwards always covers it.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registration = Registration::new(Arc::clone(&self.counter));
        let logger = self.logger.clone();
        tokio::spawn(async move {
            let _registration = registration;
            if let Err(err) = tokio::spawn(task).await {
                if err.is_panic() {
                    let message = panic_message(err.into_panic().as_ref());
                    logger.error(format!("background task panicked: {message}"), Properties::new());
                }
            }
        });
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        self.counter.active.load(Ordering::SeqCst)
    }

    /// Resolve once no tracked task is running.
    pub async fn wait(&self) {
        loop {
            let notified = self.counter.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("active", &self.active())
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
