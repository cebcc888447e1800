//! # In-Memory Repository
//!
//! Development and test backend. All state sits behind `parking_lot` locks
//! that are never held across an `.await`. Each mutation runs under a single
//! write lock, so the version check and the write are atomic. Email lookups
//! ignore ASCII case, matching the Postgres `citext` column. Expired token
//! records are dropped whenever a new token is inserted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::Repository;
use crate::error::StoreError;
use crate::permission::Permissions;
use crate::principal::{NewPrincipal, Principal, PrincipalId};
use crate::token::{TokenHash, TokenRecord, TokenScope};

#[derive(Debug, Default)]
struct Tables {
    principals: HashMap<PrincipalId, Principal>,
    tokens: Vec<TokenRecord>,
    permissions: HashMap<PrincipalId, Permissions>,
}

/// Thread-safe, cloneable in-memory [`Repository`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored token record.
    pub fn token_records(&self) -> Vec<TokenRecord> {
        self.tables.read().tokens.clone()
    }

    /// Number of registered principals.
    pub fn principal_count(&self) -> usize {
        self.tables.read().principals.len()
    }
}

fn email_taken(tables: &Tables, email: &str, except: Option<PrincipalId>) -> bool {
    tables
        .principals
        .values()
        .any(|p| p.email.eq_ignore_ascii_case(email) && Some(p.id) != except)
}

/// The stored row must exist at the caller's version.
fn check_version(tables: &Tables, principal: &Principal) -> Result<(), StoreError> {
    match tables.principals.get(&principal.id) {
        Some(stored) if stored.version == principal.version => Ok(()),
        _ => Err(StoreError::EditConflict),
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_principal(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        let mut tables = self.tables.write();
        if email_taken(&tables, &new.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        let principal = Principal {
            id: PrincipalId::new(),
            created_at: Utc::now(),
            name: new.name,
            email: new.email,
            password: new.password,
            activated: false,
            version: 1,
        };
        tables.principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn principal_by_email(&self, email: &str) -> Result<Principal, StoreError> {
        self.tables
            .read()
            .principals
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn principal_by_id(&self, id: PrincipalId) -> Result<Principal, StoreError> {
        self.tables
            .read()
            .principals
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn principal_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        let tables = self.tables.read();
        // TokenHash equality is constant-time.
        let owner = tables
            .tokens
            .iter()
            .find(|t| t.scope == scope && t.hash == *hash && t.is_live(now))
            .map(|t| t.principal_id)
            .ok_or(StoreError::NotFound)?;
        tables
            .principals
            .get(&owner)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_principal(&self, principal: &Principal) -> Result<Principal, StoreError> {
        let mut tables = self.tables.write();
        check_version(&tables, principal)?;
        if email_taken(&tables, &principal.email, Some(principal.id)) {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = tables
            .principals
            .get_mut(&principal.id)
            .ok_or(StoreError::EditConflict)?;
        *stored = Principal {
            version: principal.version + 1,
            ..principal.clone()
        };
        Ok(stored.clone())
    }

    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.principals.contains_key(&record.principal_id) {
            return Err(StoreError::NotFound);
        }
        let now = Utc::now();
        tables.tokens.retain(|t| t.is_live(now));
        tables.tokens.push(record.clone());
        Ok(())
    }

    async fn delete_tokens(
        &self,
        scope: TokenScope,
        principal_id: PrincipalId,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .tokens
            .retain(|t| !(t.scope == scope && t.principal_id == principal_id));
        Ok(())
    }

    async fn add_permissions(
        &self,
        principal: &Principal,
        labels: &[String],
    ) -> Result<Principal, StoreError> {
        if labels.is_empty() {
            return Ok(principal.clone());
        }
        let mut tables = self.tables.write();
        check_version(&tables, principal)?;

        let held = tables.permissions.entry(principal.id).or_default();
        for label in labels {
            held.insert(label.as_str());
        }
        let stored = tables
            .principals
            .get_mut(&principal.id)
            .ok_or(StoreError::EditConflict)?;
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn permissions(&self, principal_id: PrincipalId) -> Result<Permissions, StoreError> {
        Ok(self
            .tables
            .read()
            .permissions
            .get(&principal_id)
            .cloned()
            .unwrap_or_default())
    }
}
