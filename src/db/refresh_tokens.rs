/// Refresh-token ledger operations
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::Result;
use crate::models::RefreshTokenRecord;
use crate::store::{NewRefreshToken, RefreshConsumption, RefreshTokenState};

pub async fn insert(pool: &PgPool, token: NewRefreshToken) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (token_id, account_id, family, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(token.token_id)
    .bind(token.account_id)
    .bind(token.family)
    .bind(token.expires_at)
    .bind(token.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Read-only revocation state for a ledger row
pub async fn state(pool: &PgPool, token_id: Uuid) -> Result<RefreshTokenState> {
    let record = sqlx::query_as::<_, RefreshTokenRecord>(
        "SELECT * FROM refresh_tokens WHERE token_id = $1",
    )
    .bind(token_id)
    .fetch_optional(pool)
    .await?;

    Ok(match record {
        Some(record) if record.is_revoked() => RefreshTokenState::Revoked,
        Some(_) => RefreshTokenState::Active,
        None => RefreshTokenState::Missing,
    })
}

/// Atomically consume an active ledger row.
///
/// The conditional update guarantees exactly one winner among concurrent
/// callers presenting the same token; losers observe `AlreadyRevoked`.
pub async fn consume(
    pool: &PgPool,
    token_id: Uuid,
    now: DateTime<Utc>,
) -> Result<RefreshConsumption> {
    let consumed = sqlx::query_as::<_, RefreshTokenRecord>(
        r#"
        UPDATE refresh_tokens
        SET revoked_at = $2
        WHERE token_id = $1 AND revoked_at IS NULL
        RETURNING *
        "#,
    )
    .bind(token_id)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    if let Some(record) = consumed {
        return Ok(RefreshConsumption::Consumed(record));
    }

    Ok(match state(pool, token_id).await? {
        RefreshTokenState::Missing => RefreshConsumption::Missing,
        _ => RefreshConsumption::AlreadyRevoked,
    })
}

/// Idempotent revocation for logout.
///
/// Upserts a revoked row keyed by `token_id`, carrying the token's own
/// expiry so the row is prunable once the token would have died naturally.
/// A row that is already revoked keeps its original `revoked_at`.
pub async fn revoke(
    pool: &PgPool,
    token_id: Uuid,
    account_id: Uuid,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (token_id, account_id, family, expires_at, created_at, revoked_at)
        VALUES ($1, $2, $1, $3, $4, $4)
        ON CONFLICT (token_id) DO UPDATE
            SET revoked_at = COALESCE(refresh_tokens.revoked_at, EXCLUDED.revoked_at)
        "#,
    )
    .bind(token_id)
    .bind(account_id)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Revoke every outstanding token for an account
pub async fn revoke_all_for_account(
    pool: &PgPool,
    account_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = $2 WHERE account_id = $1 AND revoked_at IS NULL",
    )
    .bind(account_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Transaction participant for the reset flow
pub async fn revoke_all_for_account_tx(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = $2 WHERE account_id = $1 AND revoked_at IS NULL",
    )
    .bind(account_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}
