//! The persistent-store boundary consumed by the authentication service.
//!
//! Implementations must uphold the conditional-update contracts spelled out
//! on each method: the failed-login increment, refresh-token consumption, and
//! reset confirmation are the three places where correctness under concurrent
//! requests depends on the store, not the service. All timestamps are passed
//! in by the caller from the injected clock; implementations never read the
//! process clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Account, AccountRole, PasswordResetToken, RefreshTokenRecord};

/// Fields for a new account row. `email` must already be normalized.
#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub role: AccountRole,
    pub now: DateTime<Utc>,
}

/// Ledger row for a freshly issued refresh token.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_id: Uuid,
    pub account_id: Uuid,
    pub family: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// State persisted by one failed login attempt.
#[derive(Debug, Clone, Copy)]
pub struct LoginFailure {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Revocation state of a refresh-token ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenState {
    Active,
    Revoked,
    /// No ledger row. Fails safe: the service treats this as revoked.
    Missing,
}

/// Outcome of an atomic refresh-token consumption.
#[derive(Debug, Clone)]
pub enum RefreshConsumption {
    /// This caller won the race and now owns the rotation.
    Consumed(RefreshTokenRecord),
    /// The token was already revoked (rotation replay or logout).
    AlreadyRevoked,
    /// No ledger row existed.
    Missing,
}

/// Outcome of the reset-confirmation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordResetApplied {
    Applied,
    /// A concurrent confirmation consumed the token first; nothing was
    /// changed.
    AlreadyUsed,
}

/// Typed access layer over the `accounts`, `refresh_tokens`, and
/// `password_reset_tokens` entities.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Point lookup by normalized (lowercased) email.
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn find_account_by_id(&self, account_id: Uuid) -> Result<Option<Account>>;

    /// Insert a new account. The store's unique constraint on `email` is the
    /// authoritative duplicate guard: a violation maps to
    /// [`crate::AuthError::EmailAlreadyExists`], never a raw storage error.
    async fn insert_account(&self, account: NewAccount<'_>) -> Result<Account>;

    /// Record one failed login attempt as a single atomic conditional
    /// update: increment the counter and, when the post-increment count
    /// reaches `lock_threshold`, set `locked_until = lock_until`. Returns
    /// the resulting state. Concurrent failures must not lose increments.
    async fn record_login_failure(
        &self,
        account_id: Uuid,
        lock_threshold: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<LoginFailure>;

    /// Reset the failure counter, clear any lock, and stamp `last_login_at`.
    async fn record_login_success(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<()>;

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<()>;

    /// Read-only revocation check for a refresh token.
    async fn refresh_token_state(&self, token_id: Uuid) -> Result<RefreshTokenState>;

    /// Atomically revoke an active ledger row and return it. Exactly one of
    /// any set of concurrent callers may observe `Consumed`; the rest must
    /// observe `AlreadyRevoked`.
    async fn consume_refresh_token(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefreshConsumption>;

    /// Idempotent revocation for logout: upsert a revoked row for
    /// `token_id` carrying the token's own expiry so it is prunable.
    /// A duplicate call succeeds without error.
    async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Revoke every outstanding refresh token for an account. Returns the
    /// number of rows revoked.
    async fn revoke_account_refresh_tokens(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    async fn insert_reset_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn find_reset_token(&self, token_hash: &str) -> Result<Option<PasswordResetToken>>;

    /// Apply a password reset in one transaction: update the digest, zero
    /// the failure counter, clear the lock, mark the reset token used
    /// (conditionally — losing a race yields `AlreadyUsed` with no changes),
    /// and optionally revoke the account's refresh tokens.
    async fn apply_password_reset(
        &self,
        account_id: Uuid,
        token_hash: &str,
        password_hash: &str,
        revoke_refresh_tokens: bool,
        now: DateTime<Utc>,
    ) -> Result<PasswordResetApplied>;

    /// Update the password digest outside the reset flow (authenticated
    /// password change).
    async fn update_password(
        &self,
        account_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;
}
