/// Refresh-token blacklist
///
/// A refresh token is identified by its `jti` claim. Inserting the `jti` is the
/// single atomic step that consumes a token: the primary key guarantees that
/// of two concurrent attempts exactly one inserts a row.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlacklistedToken {
    pub jti: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub blacklisted_at: DateTime<Utc>,
}

impl BlacklistedToken {
    /// Blacklists a token id
    ///
    /// Returns `true` if this call inserted the row, `false` if the token was
    /// already blacklisted.
    pub async fn insert(
        pool: &PgPool,
        jti: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO blacklisted_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn exists(pool: &PgPool, jti: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM blacklisted_tokens WHERE jti = $1)")
            .bind(jti)
            .fetch_one(pool)
            .await
    }

    /// Removes entries whose token has expired anyway
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at < NOW()")
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
