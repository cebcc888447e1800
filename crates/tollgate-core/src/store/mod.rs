//! # Persistence Boundary
//!
//! [`Repository`] lists every call the credential substrate makes to the
//! store. Token lookups receive digests, never plaintext: hashing happens in
//! [`TokenManager`](crate::TokenManager) before the store is consulted.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::permission::Permissions;
use crate::principal::{NewPrincipal, Principal, PrincipalId};
use crate::token::{TokenHash, TokenRecord, TokenScope};

/// Principal, token and permission storage.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a new principal with version 1 and `activated = false`.
    ///
    /// Fails with [`StoreError::DuplicateEmail`] when the email is taken.
    async fn insert_principal(&self, new: NewPrincipal) -> Result<Principal, StoreError>;

    /// Look up a principal by email address.
    async fn principal_by_email(&self, email: &str) -> Result<Principal, StoreError>;

    /// Look up a principal by id.
    async fn principal_by_id(&self, id: PrincipalId) -> Result<Principal, StoreError>;

    /// Resolve the owner of a live token with the given digest and scope.
    ///
    /// A missing, expired or wrong-scope token is [`StoreError::NotFound`].
    async fn principal_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError>;

    /// Persist changes to a principal, returning it with the bumped version.
    ///
    /// Fails with [`StoreError::EditConflict`] when `principal.version` no
    /// longer matches the stored version or the record is gone.
    async fn update_principal(&self, principal: &Principal) -> Result<Principal, StoreError>;

    /// Persist a token record.
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError>;

    /// Delete every token of `scope` owned by `principal_id`.
    async fn delete_tokens(
        &self,
        scope: TokenScope,
        principal_id: PrincipalId,
    ) -> Result<(), StoreError>;

    /// Grant capability labels, returning the principal with the bumped
    /// version. Labels already held are ignored; an empty grant is a no-op.
    ///
    /// Version-checked like [`update_principal`](Self::update_principal).
    async fn add_permissions(
        &self,
        principal: &Principal,
        labels: &[String],
    ) -> Result<Principal, StoreError>;

    /// Capability labels held by a principal.
    async fn permissions(&self, principal_id: PrincipalId) -> Result<Permissions, StoreError>;
}
