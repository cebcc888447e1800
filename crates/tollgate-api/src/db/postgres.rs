//! Postgres [`Repository`].
//!
//! Operates on the `principals`, `tokens`, `permissions` and
//! `principals_permissions` tables created by the embedded migrations.
//! Driver errors are folded into [`StoreError`] by [`store_error`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tollgate_core::{
    NewPrincipal, PasswordHash, Permissions, Principal, PrincipalId, Repository, StoreError,
    TokenHash, TokenRecord, TokenScope,
};
use uuid::Uuid;

/// SQLx-backed store.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Wrap a connected, migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct PrincipalRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    name: String,
    email: String,
    password_hash: String,
    activated: bool,
    version: i32,
}

impl From<PrincipalRow> for Principal {
    fn from(row: PrincipalRow) -> Self {
        Principal {
            id: PrincipalId::from_uuid(row.id),
            created_at: row.created_at,
            name: row.name,
            email: row.email,
            password: PasswordHash::from_phc(row.password_hash),
            activated: row.activated,
            version: row.version,
        }
    }
}

const PRINCIPAL_COLUMNS: &str =
    "p.id, p.created_at, p.name, p.email::text AS email, p.password_hash, p.activated, p.version";

/// Map a driver error onto the store taxonomy.
fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StoreError::NotFound,
        _ => StoreError::Backend(err.to_string()),
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn insert_principal(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "INSERT INTO principals AS p (id, name, email, password_hash, activated)
             VALUES ($1, $2, $3, $4, FALSE)
             RETURNING p.id, p.created_at, p.name, p.email::text AS email,
                       p.password_hash, p.activated, p.version",
        )
        .bind(*PrincipalId::new().as_uuid())
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.password.as_phc())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.into())
    }

    async fn principal_by_email(&self, email: &str) -> Result<Principal, StoreError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals p WHERE p.email = $1");
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.into())
    }

    async fn principal_by_id(&self, id: PrincipalId) -> Result<Principal, StoreError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals p WHERE p.id = $1");
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.into())
    }

    async fn principal_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        let sql = format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals p
             INNER JOIN tokens t ON t.principal_id = p.id
             WHERE t.hash = $1 AND t.scope = $2 AND t.expiry > $3"
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(hash.as_bytes().as_slice())
            .bind(scope.as_str())
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.into())
    }

    async fn update_principal(&self, principal: &Principal) -> Result<Principal, StoreError> {
        let version: Option<i32> = sqlx::query_scalar(
            "UPDATE principals
             SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
             WHERE id = $5 AND version = $6
             RETURNING version",
        )
        .bind(&principal.name)
        .bind(&principal.email)
        .bind(principal.password.as_phc())
        .bind(principal.activated)
        .bind(principal.id.as_uuid())
        .bind(principal.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        let version = version.ok_or(StoreError::EditConflict)?;
        Ok(Principal {
            version,
            ..principal.clone()
        })
    }

    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tokens (hash, principal_id, expiry, scope) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.hash.as_bytes().as_slice())
        .bind(record.principal_id.as_uuid())
        .bind(record.expiry)
        .bind(record.scope.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn delete_tokens(
        &self,
        scope: TokenScope,
        principal_id: PrincipalId,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM tokens WHERE scope = $1 AND principal_id = $2")
            .bind(scope.as_str())
            .bind(principal_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

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
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Row lock on the principal serializes concurrent grants.
        let version: Option<i32> = sqlx::query_scalar(
            "UPDATE principals SET version = version + 1
             WHERE id = $1 AND version = $2
             RETURNING version",
        )
        .bind(principal.id.as_uuid())
        .bind(principal.version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;
        let version = version.ok_or(StoreError::EditConflict)?;

        sqlx::query("INSERT INTO permissions (code) SELECT UNNEST($1::text[]) ON CONFLICT (code) DO NOTHING")
            .bind(labels)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        sqlx::query(
            "INSERT INTO principals_permissions (principal_id, permission_id)
             SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
             ON CONFLICT DO NOTHING",
        )
        .bind(principal.id.as_uuid())
        .bind(labels)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(Principal {
            version,
            ..principal.clone()
        })
    }

    async fn permissions(&self, principal_id: PrincipalId) -> Result<Permissions, StoreError> {
        let codes: Vec<String> = sqlx::query_scalar(
            "SELECT permissions.code FROM permissions
             INNER JOIN principals_permissions pp ON pp.permission_id = permissions.id
             WHERE pp.principal_id = $1",
        )
        .bind(principal_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(codes.into_iter().collect())
    }
}
