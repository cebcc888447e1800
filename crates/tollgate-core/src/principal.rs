//! # Principals
//!
//! The authenticated identity behind a request. A principal is created on
//! registration and mutated on activation, password change and profile
//! update. Every mutation bumps [`Principal::version`]; the store rejects an
//! update whose version no longer matches (optimistic concurrency).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::password::PasswordHash;

/// Unique identifier of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    /// Create a new random principal identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a principal identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered principal.
///
/// The password hash and version counter are never serialized into API
/// responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Store-assigned identifier.
    pub id: PrincipalId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// One-way password credential.
    #[serde(skip)]
    pub password: PasswordHash,
    /// Whether the principal has confirmed their email address.
    pub activated: bool,
    /// Optimistic-concurrency version. Starts at 1.
    #[serde(skip)]
    pub version: i32,
}

/// Fields supplied at registration. The store assigns id, timestamp and
/// version.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// Hashed password.
    pub password: PasswordHash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_hides_credential_and_version() {
        let p = Principal {
            id: PrincipalId::new(),
            created_at: Utc::now(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password: PasswordHash::from_phc("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"),
            activated: false,
            version: 3,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["activated"], false);
        assert!(json.get("password").is_none());
        assert!(json.get("version").is_none());
        assert_eq!(json["id"], p.id.to_string());
    }

    #[test]
    fn principal_ids_are_unique() {
        assert_ne!(PrincipalId::new(), PrincipalId::new());
    }
}
