/// Password-reset token operations
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::Result;
use crate::models::PasswordResetToken;

pub async fn insert(
    pool: &PgPool,
    account_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO password_reset_tokens (token_hash, account_id, expires_at, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(token_hash)
    .bind(account_id)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_hash(pool: &PgPool, token_hash: &str) -> Result<Option<PasswordResetToken>> {
    let token = sqlx::query_as::<_, PasswordResetToken>(
        "SELECT * FROM password_reset_tokens WHERE token_hash = $1",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(token)
}

/// Conditionally consume a token inside the reset transaction.
///
/// Returns `false` when the token was already used: the caller must roll the
/// transaction back so a lost race never half-applies the reset.
pub async fn mark_used_tx(
    tx: &mut Transaction<'_, Postgres>,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE password_reset_tokens
        SET used_at = $2
        WHERE token_hash = $1 AND used_at IS NULL
        "#,
    )
    .bind(token_hash)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}
