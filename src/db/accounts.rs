/// Account row operations
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AuthError, Result};
use crate::models::Account;
use crate::store::{LoginFailure, NewAccount};

/// Insert a new account row.
///
/// The unique constraint on `email` is the authoritative duplicate guard;
/// a violation maps to `EmailAlreadyExists` rather than a raw storage error.
pub async fn insert(pool: &PgPool, account: NewAccount<'_>) -> Result<Account> {
    sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (id, email, password_hash, first_name, last_name, role,
                              is_active, failed_login_attempts, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE, 0, $7, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account.email)
    .bind(account.password_hash)
    .bind(account.first_name)
    .bind(account.last_name)
    .bind(account.role)
    .bind(account.now)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            AuthError::EmailAlreadyExists
        } else {
            AuthError::from(e)
        }
    })
}

/// Find account by normalized email
pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(account)
}

/// Find account by ID
pub async fn find_by_id(pool: &PgPool, account_id: Uuid) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
        .bind(account_id)
        .fetch_optional(pool)
        .await?;

    Ok(account)
}

/// Record one failed login attempt.
///
/// One conditional statement so concurrent failures never lose increments:
/// the counter increments and, when the post-increment count reaches the
/// threshold, `locked_until` is set in the same update.
pub async fn record_login_failure(
    pool: &PgPool,
    account_id: Uuid,
    lock_threshold: i32,
    lock_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<LoginFailure> {
    let (attempts, locked_until) = sqlx::query_as::<_, (i32, Option<DateTime<Utc>>)>(
        r#"
        UPDATE accounts
        SET failed_login_attempts = failed_login_attempts + 1,
            locked_until = CASE
                WHEN failed_login_attempts + 1 >= $2 THEN $3
                ELSE locked_until
            END,
            updated_at = $4
        WHERE id = $1
        RETURNING failed_login_attempts, locked_until
        "#,
    )
    .bind(account_id)
    .bind(lock_threshold)
    .bind(lock_until)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(LoginFailure {
        attempts,
        locked_until,
    })
}

/// Reset the failure counter, clear the lock, and stamp the login time
pub async fn record_login_success(pool: &PgPool, account_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE accounts
        SET failed_login_attempts = 0, locked_until = NULL, last_login_at = $2, updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update the password digest
pub async fn update_password(
    pool: &PgPool,
    account_id: Uuid,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE accounts SET password_hash = $2, updated_at = $3 WHERE id = $1")
        .bind(account_id)
        .bind(password_hash)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(())
}

/// Transaction participant for the reset flow: new digest plus a clean
/// lockout slate.
pub async fn reset_credentials_tx(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE accounts
        SET password_hash = $2, failed_login_attempts = 0, locked_until = NULL, updated_at = $3
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(password_hash)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
