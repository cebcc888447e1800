//! # Outbound Mail
//!
//! The [`Mailer`] trait is the boundary to mail delivery. Template rendering
//! and transport live behind it. Handlers never call it directly: they go
//! through [`send_in_background`], which runs delivery on the task
//! supervisor, retries transient failures and logs the final outcome.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tollgate_core::logger::props;
use tollgate_core::Logger;

use crate::state::AppState;

/// Welcome message carrying the first activation token.
pub const USER_WELCOME: &str = "user_welcome";
/// Fresh activation token on request.
pub const TOKEN_ACTIVATION: &str = "token_activation";
/// Password-reset token.
pub const TOKEN_PASSWORD_RESET: &str = "token_password_reset";

const ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Mail delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// No template with this name.
    #[error("unknown mail template \"{0}\"")]
    UnknownTemplate(String),

    /// Transport rejected or lost the message.
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Mail delivery collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Render `template` with `data` and deliver it to `recipient`.
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), MailError>;
}

/// Mailer that records each delivery as a log entry instead of sending it.
///
/// Template data is not logged, since it carries token plaintext.
#[derive(Debug, Clone)]
pub struct LogMailer {
    logger: Logger,
}

impl LogMailer {
    /// Create a mailer writing through `logger`.
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        _data: serde_json::Value,
    ) -> Result<(), MailError> {
        if ![USER_WELCOME, TOKEN_ACTIVATION, TOKEN_PASSWORD_RESET].contains(&template) {
            return Err(MailError::UnknownTemplate(template.to_string()));
        }
        self.logger.info(
            "mail delivered",
            props([
                ("recipient", recipient.to_string()),
                ("template", template.to_string()),
            ]),
        );
        Ok(())
    }
}

/// Deliver with up to three attempts, half a second apart.
pub async fn deliver(
    mailer: &dyn Mailer,
    recipient: &str,
    template: &str,
    data: serde_json::Value,
) -> Result<(), MailError> {
    let mut attempt = 1;
    loop {
        match mailer.send(recipient, template, data.clone()).await {
            Ok(()) => return Ok(()),
            Err(MailError::UnknownTemplate(name)) => {
                return Err(MailError::UnknownTemplate(name))
            }
            Err(e) if attempt >= ATTEMPTS => return Err(e),
            Err(_) => {
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// Queue a delivery on the background task supervisor.
pub fn send_in_background(
    state: &AppState,
    recipient: String,
    template: &'static str,
    data: serde_json::Value,
) {
    let mailer = Arc::clone(&state.mailer);
    let logger = state.logger.clone();
    state.tasks.spawn(async move {
        if let Err(e) = deliver(mailer.as_ref(), &recipient, template, data).await {
            logger.error(e, props([("template", template.to_string())]));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tollgate_core::Level;

    /// Fails the first `failures` sends.
    struct Flaky {
        failures: Mutex<u32>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl Mailer for Flaky {
        async fn send(&self, _: &str, _: &str, _: serde_json::Value) -> Result<(), MailError> {
            *self.calls.lock() += 1;
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(MailError::Delivery("smtp timeout".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let mailer = Flaky {
            failures: Mutex::new(2),
            calls: Mutex::new(0),
        };
        deliver(&mailer, "a@example.com", USER_WELCOME, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(*mailer.calls.lock(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let mailer = Flaky {
            failures: Mutex::new(10),
            calls: Mutex::new(0),
        };
        let err = deliver(&mailer, "a@example.com", USER_WELCOME, serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, MailError::Delivery("smtp timeout".into()));
        assert_eq!(*mailer.calls.lock(), 3);
    }

    #[tokio::test]
    async fn log_mailer_records_delivery_without_data() {
        let (logger, log) = Logger::capture(Level::Info);
        let mailer = LogMailer::new(logger);
        mailer
            .send(
                "a@example.com",
                TOKEN_ACTIVATION,
                serde_json::json!({"activation_token": "SECRET"}),
            )
            .await
            .unwrap();
        let contents = log.contents();
        assert!(contents.contains("a@example.com"));
        assert!(contents.contains(TOKEN_ACTIVATION));
        assert!(!contents.contains("SECRET"));
    }

    #[tokio::test]
    async fn log_mailer_rejects_unknown_template() {
        let (logger, _) = Logger::capture(Level::Info);
        let err = LogMailer::new(logger)
            .send("a@example.com", "newsletter", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, MailError::UnknownTemplate("newsletter".into()));
    }
}
