//! Postgres implementation of the [`CredentialStore`] boundary.
//!
//! Query modules are per-entity free functions on `&PgPool`; the tables are
//! `accounts` (unique lowercased `email`), `refresh_tokens` (ledger keyed by
//! `token_id`), and `password_reset_tokens` (keyed by `token_hash`). Schema
//! migrations are managed outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub mod accounts;
pub mod password_resets;
pub mod refresh_tokens;

use crate::error::Result;
use crate::models::{Account, PasswordResetToken};
use crate::store::{
    CredentialStore, LoginFailure, NewAccount, NewRefreshToken, PasswordResetApplied,
    RefreshConsumption, RefreshTokenState,
};

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        accounts::find_by_email(&self.pool, email).await
    }

    async fn find_account_by_id(&self, account_id: Uuid) -> Result<Option<Account>> {
        accounts::find_by_id(&self.pool, account_id).await
    }

    async fn insert_account(&self, account: NewAccount<'_>) -> Result<Account> {
        accounts::insert(&self.pool, account).await
    }

    async fn record_login_failure(
        &self,
        account_id: Uuid,
        lock_threshold: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<LoginFailure> {
        accounts::record_login_failure(&self.pool, account_id, lock_threshold, lock_until, now)
            .await
    }

    async fn record_login_success(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        accounts::record_login_success(&self.pool, account_id, now).await
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<()> {
        refresh_tokens::insert(&self.pool, token).await
    }

    async fn refresh_token_state(&self, token_id: Uuid) -> Result<RefreshTokenState> {
        refresh_tokens::state(&self.pool, token_id).await
    }

    async fn consume_refresh_token(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefreshConsumption> {
        refresh_tokens::consume(&self.pool, token_id, now).await
    }

    async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        refresh_tokens::revoke(&self.pool, token_id, account_id, expires_at, now).await
    }

    async fn revoke_account_refresh_tokens(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        refresh_tokens::revoke_all_for_account(&self.pool, account_id, now).await
    }

    async fn insert_reset_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        password_resets::insert(&self.pool, account_id, token_hash, expires_at, now).await
    }

    async fn find_reset_token(&self, token_hash: &str) -> Result<Option<PasswordResetToken>> {
        password_resets::find_by_hash(&self.pool, token_hash).await
    }

    async fn apply_password_reset(
        &self,
        account_id: Uuid,
        token_hash: &str,
        password_hash: &str,
        revoke_refresh_tokens: bool,
        now: DateTime<Utc>,
    ) -> Result<PasswordResetApplied> {
        let mut tx = self.pool.begin().await?;

        // Consume the token first: losing the race aborts before anything
        // else is touched, so partial application is never observable.
        if !password_resets::mark_used_tx(&mut tx, token_hash, now).await? {
            tx.rollback().await?;
            return Ok(PasswordResetApplied::AlreadyUsed);
        }

        accounts::reset_credentials_tx(&mut tx, account_id, password_hash, now).await?;

        if revoke_refresh_tokens {
            refresh_tokens::revoke_all_for_account_tx(&mut tx, account_id, now).await?;
        }

        tx.commit().await?;
        Ok(PasswordResetApplied::Applied)
    }

    async fn update_password(
        &self,
        account_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        accounts::update_password(&self.pool, account_id, password_hash, now).await
    }
}
