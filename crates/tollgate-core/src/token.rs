//! # Scoped Bearer Tokens
//!
//! Opaque tokens bound to one principal and one purpose ([`TokenScope`]).
//!
//! ## Lifecycle
//!
//! 1. **Mint**: 32 bytes from the OS CSPRNG, encoded base64url without
//!    padding (43 characters). Only the SHA-256 digest is persisted.
//! 2. **Validate**: hash the presented plaintext and look up a record with
//!    the same digest and scope whose expiry is still in the future.
//!    Unknown, wrong-scope and expired tokens are all [`StoreError::NotFound`].
//! 3. **Invalidate**: delete every record of one scope for one principal,
//!    so activation and password-reset tokens are single-use in effect.
//!
//! The plaintext lives only inside the [`Token`] returned by
//! [`TokenManager::mint`] and is zeroized when that value is dropped.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{StoreError, TokenError};
use crate::principal::{Principal, PrincipalId};
use crate::store::Repository;

/// Length in characters of every plaintext token.
pub const TOKEN_LENGTH: usize = 43;

const TOKEN_BYTES: usize = 32;

// -- Scope ----------------------------------------------------------------

/// The purpose a token is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenScope {
    /// Confirms ownership of the registration email address.
    Activation,
    /// Bearer credential for API requests.
    Authentication,
    /// Authorizes a single password change.
    PasswordReset,
}

impl TokenScope {
    /// Every scope, in declaration order.
    pub const ALL: [TokenScope; 3] = [
        TokenScope::Activation,
        TokenScope::Authentication,
        TokenScope::PasswordReset,
    ];

    /// The string stored in the `scope` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Authentication => "authentication",
            Self::PasswordReset => "password-reset",
        }
    }

    /// Parse a stored scope string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scope| scope.as_str() == s)
    }

    /// Time-to-live used when minting a token of this scope.
    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::Activation => Duration::days(3),
            Self::Authentication => Duration::hours(24),
            Self::PasswordReset => Duration::minutes(45),
        }
    }
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Hash -----------------------------------------------------------------

/// SHA-256 digest of a plaintext token. This is the only form persisted.
#[derive(Clone, Copy, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    /// Hash a plaintext token.
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }

    /// Rebuild a hash from stored bytes. Returns `None` on a length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Constant-time comparison.
impl PartialEq for TokenHash {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl std::fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenHash(")?;
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "..)")
    }
}

// -- Records --------------------------------------------------------------

/// Persisted token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// Digest of the plaintext.
    pub hash: TokenHash,
    /// Owning principal.
    pub principal_id: PrincipalId,
    /// Purpose.
    pub scope: TokenScope,
    /// Instant after which the token no longer validates.
    pub expiry: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether the record is still valid at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }
}

/// A freshly minted token. Serializes as `{"token": "...", "expiry": "..."}`.
#[derive(Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    plaintext: String,
    #[serde(skip)]
    hash: TokenHash,
    #[serde(skip)]
    principal_id: PrincipalId,
    expiry: DateTime<Utc>,
    #[serde(skip)]
    scope: TokenScope,
}

impl Token {
    /// Generate a token without persisting it.
    pub fn generate(
        principal_id: PrincipalId,
        ttl: Duration,
        scope: TokenScope,
    ) -> Result<Self, TokenError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| TokenError::Entropy(e.to_string()))?;
        let plaintext = URL_SAFE_NO_PAD.encode(bytes);
        bytes.zeroize();

        let hash = TokenHash::of(&plaintext);
        Ok(Self {
            plaintext,
            hash,
            principal_id,
            expiry: Utc::now() + ttl,
            scope,
        })
    }

    /// The plaintext. Surface it to the owner once; never log or store it.
    pub fn plaintext(&self) -> &str {
        &self.plaintext
    }

    /// Digest of the plaintext.
    pub fn hash(&self) -> TokenHash {
        self.hash
    }

    /// Owning principal.
    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// Expiry instant.
    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// Purpose.
    pub fn scope(&self) -> TokenScope {
        self.scope
    }

    /// The persisted form of this token.
    pub fn record(&self) -> TokenRecord {
        TokenRecord {
            hash: self.hash,
            principal_id: self.principal_id,
            scope: self.scope,
            expiry: self.expiry,
        }
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.plaintext.zeroize();
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[REDACTED]")
            .field("hash", &self.hash)
            .field("principal_id", &self.principal_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

// -- Manager --------------------------------------------------------------

/// Mints, validates and invalidates tokens against a [`Repository`].
#[derive(Clone)]
pub struct TokenManager {
    repo: Arc<dyn Repository>,
}

impl TokenManager {
    /// Create a manager over the given store.
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Generate a token, persist its record and return it.
    pub async fn mint(
        &self,
        principal_id: PrincipalId,
        ttl: Duration,
        scope: TokenScope,
    ) -> Result<Token, TokenError> {
        let token = Token::generate(principal_id, ttl, scope)?;
        self.repo.insert_token(&token.record()).await?;
        Ok(token)
    }

    /// Resolve the principal owning a live token of `scope`.
    pub async fn validate(&self, scope: TokenScope, plaintext: &str) -> Result<Principal, StoreError> {
        self.validate_at(scope, plaintext, Utc::now()).await
    }

    /// [`validate`](Self::validate) against an explicit clock reading.
    pub async fn validate_at(
        &self,
        scope: TokenScope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        if plaintext.len() != TOKEN_LENGTH {
            return Err(StoreError::NotFound);
        }
        let hash = TokenHash::of(plaintext);
        self.repo.principal_for_token(scope, &hash, now).await
    }

    /// Delete every token of `scope` owned by `principal_id`.
    pub async fn invalidate(
        &self,
        scope: TokenScope,
        principal_id: PrincipalId,
    ) -> Result<(), StoreError> {
        self.repo.delete_tokens(scope, principal_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::PasswordHash;
    use crate::principal::NewPrincipal;
    use crate::store::memory::MemoryRepository;
    use proptest::prelude::*;

    async fn setup() -> (TokenManager, Arc<MemoryRepository>, Principal) {
        let repo = Arc::new(MemoryRepository::new());
        let principal = repo
            .insert_principal(NewPrincipal {
                name: "Alice".into(),
                email: "alice@example.com".into(),
                password: PasswordHash::from_phc("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"),
            })
            .await
            .unwrap();
        let manager = TokenManager::new(repo.clone());
        (manager, repo, principal)
    }

    #[test]
    fn generated_plaintext_has_fixed_length_and_url_safe_alphabet() {
        let token =
            Token::generate(PrincipalId::new(), Duration::hours(1), TokenScope::Activation)
                .unwrap();
        assert_eq!(token.plaintext().len(), TOKEN_LENGTH);
        assert!(token
            .plaintext()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(token.hash(), TokenHash::of(token.plaintext()));
    }

    #[test]
    fn generated_tokens_differ() {
        let id = PrincipalId::new();
        let a = Token::generate(id, Duration::hours(1), TokenScope::Activation).unwrap();
        let b = Token::generate(id, Duration::hours(1), TokenScope::Activation).unwrap();
        assert_ne!(a.plaintext(), b.plaintext());
    }

    #[test]
    fn serialized_token_exposes_only_plaintext_and_expiry() {
        let token =
            Token::generate(PrincipalId::new(), Duration::hours(1), TokenScope::Authentication)
                .unwrap();
        let json = serde_json::to_value(&token).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(json["token"], token.plaintext());
        assert!(json["expiry"].is_string());
    }

    #[test]
    fn debug_never_prints_plaintext() {
        let token =
            Token::generate(PrincipalId::new(), Duration::hours(1), TokenScope::Authentication)
                .unwrap();
        assert!(!format!("{token:?}").contains(token.plaintext()));
    }

    #[test]
    fn scope_strings_round_trip() {
        for scope in TokenScope::ALL {
            assert_eq!(TokenScope::parse(scope.as_str()), Some(scope));
            assert_eq!(
                serde_json::to_value(scope).unwrap(),
                serde_json::json!(scope.as_str())
            );
        }
        assert_eq!(TokenScope::parse("admin"), None);
    }

    #[test]
    fn default_ttls() {
        assert_eq!(TokenScope::Activation.default_ttl(), Duration::days(3));
        assert_eq!(TokenScope::Authentication.default_ttl(), Duration::hours(24));
        assert_eq!(TokenScope::PasswordReset.default_ttl(), Duration::minutes(45));
    }

    #[tokio::test]
    async fn mint_then_validate_resolves_owner_for_every_scope() {
        let (manager, _, principal) = setup().await;
        for scope in TokenScope::ALL {
            let token = manager
                .mint(principal.id, scope.default_ttl(), scope)
                .await
                .unwrap();
            let resolved = manager.validate(scope, token.plaintext()).await.unwrap();
            assert_eq!(resolved.id, principal.id);
        }
    }

    #[tokio::test]
    async fn expired_token_is_not_found() {
        let (manager, _, principal) = setup().await;
        let ttl = Duration::minutes(10);
        let token = manager
            .mint(principal.id, ttl, TokenScope::Authentication)
            .await
            .unwrap();

        let just_before = token.expiry() - Duration::seconds(1);
        assert!(manager
            .validate_at(TokenScope::Authentication, token.plaintext(), just_before)
            .await
            .is_ok());

        let result = manager
            .validate_at(TokenScope::Authentication, token.plaintext(), token.expiry())
            .await;
        assert_eq!(result.unwrap_err(), StoreError::NotFound);
    }

    #[tokio::test]
    async fn scope_mismatch_is_not_found() {
        let (manager, _, principal) = setup().await;
        let token = manager
            .mint(principal.id, Duration::hours(1), TokenScope::Activation)
            .await
            .unwrap();
        let result = manager
            .validate(TokenScope::Authentication, token.plaintext())
            .await;
        assert_eq!(result.unwrap_err(), StoreError::NotFound);
    }

    #[tokio::test]
    async fn unknown_and_malformed_tokens_are_not_found() {
        let (manager, _, _) = setup().await;
        let unknown = "A".repeat(TOKEN_LENGTH);
        assert_eq!(
            manager
                .validate(TokenScope::Authentication, &unknown)
                .await
                .unwrap_err(),
            StoreError::NotFound
        );
        assert_eq!(
            manager
                .validate(TokenScope::Authentication, "short")
                .await
                .unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn invalidate_revokes_every_token_of_the_scope() {
        let (manager, _, principal) = setup().await;
        let first = manager
            .mint(principal.id, Duration::hours(1), TokenScope::PasswordReset)
            .await
            .unwrap();
        let second = manager
            .mint(principal.id, Duration::hours(1), TokenScope::PasswordReset)
            .await
            .unwrap();
        let other_scope = manager
            .mint(principal.id, Duration::hours(1), TokenScope::Authentication)
            .await
            .unwrap();

        manager
            .invalidate(TokenScope::PasswordReset, principal.id)
            .await
            .unwrap();

        for token in [&first, &second] {
            assert_eq!(
                manager
                    .validate(TokenScope::PasswordReset, token.plaintext())
                    .await
                    .unwrap_err(),
                StoreError::NotFound
            );
        }
        assert!(manager
            .validate(TokenScope::Authentication, other_scope.plaintext())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn store_never_sees_plaintext() {
        let (manager, repo, principal) = setup().await;
        let token = manager
            .mint(principal.id, Duration::hours(1), TokenScope::Authentication)
            .await
            .unwrap();
        let records = repo.token_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hash, TokenHash::of(token.plaintext()));
        assert_ne!(records[0].hash.as_bytes().as_slice(), token.plaintext().as_bytes());
    }

    proptest! {
        #[test]
        fn hash_is_deterministic(s in "[A-Za-z0-9_-]{43}") {
            prop_assert_eq!(TokenHash::of(&s), TokenHash::of(&s));
        }

        #[test]
        fn distinct_plaintexts_hash_differently(a in "[A-Za-z0-9_-]{43}", b in "[A-Za-z0-9_-]{43}") {
            prop_assume!(a != b);
            prop_assert_ne!(TokenHash::of(&a), TokenHash::of(&b));
        }

        #[test]
        fn hash_survives_byte_round_trip(s in ".*") {
            let hash = TokenHash::of(&s);
            prop_assert_eq!(TokenHash::from_slice(hash.as_bytes()), Some(hash));
        }
    }
}
