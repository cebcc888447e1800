//! # Field Validation
//!
//! [`Validator`] accumulates per-field failure messages. The first message
//! recorded for a field wins; later checks on the same field are ignored so
//! that clients see the most basic problem first.
//!
//! The free functions encode the input rules shared by every route that
//! accepts an email, a password or a token.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::token::TOKEN_LENGTH;

/// Field name to failure message. Serializes as a JSON object.
pub type FieldErrors = BTreeMap<String, String>;

/// Longest accepted display name, in bytes.
pub const MAX_NAME_BYTES: usize = 500;
/// Shortest accepted password, in bytes.
pub const MIN_PASSWORD_BYTES: usize = 8;
/// Longest accepted password, in bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Accumulates field errors.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    /// An empty validator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no errors have been recorded.
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record `message` for `field` unless the field already has one.
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record `message` for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    /// Recorded errors.
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Consume the validator, returning its errors.
    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("email regex is valid")
    })
}

/// Whether `email` is syntactically a plausible address.
pub fn is_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

/// Email must be present and well formed.
pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_email(email), "email", "must be a valid email address");
}

/// Password must be present and between 8 and 72 bytes.
pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

/// Registration and profile fields. `password` is checked only when given.
pub fn validate_principal(v: &mut Validator, name: &str, email: &str, password: Option<&str>) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_NAME_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );
    validate_email(v, email);
    if let Some(password) = password {
        validate_password_plaintext(v, password);
    }
}

/// Token plaintext must be present and exactly [`TOKEN_LENGTH`] characters.
pub fn validate_token_plaintext(v: &mut Validator, token: &str) {
    v.check(!token.is_empty(), "token", "must be provided");
    v.check(
        token.len() == TOKEN_LENGTH,
        "token",
        "must be 43 bytes long",
    );
}
