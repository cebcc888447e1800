#![deny(missing_docs)]

//! # tollgate-core: Foundational Types for Tollgate
//!
//! This crate defines the credential-handling substrate that the HTTP layer
//! (`tollgate-api`) builds on. It has no HTTP or database dependencies.
//!
//! ## Design Principles
//!
//! 1. **Plaintext credentials never persist.** Passwords are stored as
//!    Argon2id PHC strings ([`PasswordHash`]); bearer tokens are stored as
//!    SHA-256 digests ([`TokenHash`]). The plaintext token is surfaced exactly
//!    once, in the [`Token`] returned by [`TokenManager::mint`].
//!
//! 2. **One uniform "not found".** Token validation never distinguishes an
//!    expired token from a nonexistent one or a scope mismatch.
//!
//! 3. **The store is a trait.** [`Repository`] names every call the core
//!    issues to persistence. [`MemoryRepository`] backs development and tests;
//!    the API crate provides the Postgres implementation.
//!
//! 4. **One logger per process.** [`Logger`] is constructed once and cloned
//!    into every component that needs it. There is no global logger.

pub mod error;
pub mod logger;
pub mod password;
pub mod permission;
pub mod principal;
pub mod store;
pub mod token;
pub mod validator;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{PasswordError, StoreError, TokenError};
pub use logger::{Level, Logger, Properties};
pub use password::PasswordHash;
pub use permission::Permissions;
pub use principal::{NewPrincipal, Principal, PrincipalId};
pub use store::memory::MemoryRepository;
pub use store::Repository;
pub use token::{Token, TokenHash, TokenManager, TokenRecord, TokenScope};
pub use validator::{FieldErrors, Validator};
