//! # Request Gates
//!
//! Layers that run before authentication: cross-origin policy and per-client
//! rate limiting.

pub mod cors;
pub mod rate_limit;
