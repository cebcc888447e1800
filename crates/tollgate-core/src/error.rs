//! # Error Hierarchy
//!
//! Structured error types for the credential substrate, built with `thiserror`.
//!
//! Store errors form a closed set: every backend maps its failures onto
//! [`StoreError`] so that callers branch on meaning, not on driver details.

use thiserror::Error;

/// Failure of a call into the persistent store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record matched the lookup. Token lookups also use this for expired
    /// tokens and scope mismatches.
    #[error("record not found")]
    NotFound,

    /// The record's version no longer matches the version the caller read.
    #[error("edit conflict")]
    EditConflict,

    /// A principal with the same email address already exists.
    #[error("duplicate email")]
    DuplicateEmail,

    /// Opaque backend failure (connection loss, driver error, ...).
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Errors raised while minting or validating tokens.
#[derive(Error, Debug)]
pub enum TokenError {
    /// The OS random source could not produce token bytes.
    #[error("random source unavailable: {0}")]
    Entropy(String),

    /// The store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while hashing or verifying passwords.
///
/// A password that simply does not match is *not* an error; see
/// [`PasswordHash::matches`](crate::PasswordHash::matches).
#[derive(Error, Debug)]
pub enum PasswordError {
    /// The hashing function failed internally.
    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// The stored hash is not a valid PHC string.
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}
