//! Shared test fixtures: an in-memory credential store that mirrors the
//! Postgres conditional-update semantics, a hand-driven clock, and notifier
//! doubles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::clock::ManualClock;
use crate::config::{AuthConfig, RefreshRotation};
use crate::error::{AuthError, Result};
use crate::models::{Account, PasswordResetToken, RefreshTokenRecord, RegisterRequest};
use crate::services::notifier::ResetNotifier;
use crate::services::AuthenticationService;
use crate::store::{
    CredentialStore, LoginFailure, NewAccount, NewRefreshToken, PasswordResetApplied,
    RefreshConsumption, RefreshTokenState,
};

/// Strong enough for the composition rules and the zxcvbn threshold.
pub const TEST_PASSWORD: &str = "xK9#mQ2$vLp7!aZ";
pub const NEW_PASSWORD: &str = "nB4$wR8@tYe2^Hu";

/// In-memory `CredentialStore`.
///
/// Each method reproduces the conditional-update contract of the Postgres
/// implementation so service-level tests exercise the same race semantics.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
    refresh_tokens: Mutex<HashMap<Uuid, RefreshTokenRecord>>,
    reset_tokens: Mutex<HashMap<String, PasswordResetToken>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, account_id: Uuid) -> Option<Account> {
        self.accounts.lock().unwrap().get(&account_id).cloned()
    }

    pub fn deactivate(&self, account_id: Uuid) {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.get_mut(&account_id) {
            account.is_active = false;
        }
    }

    pub fn refresh_records_for(&self, account_id: Uuid) -> Vec<RefreshTokenRecord> {
        self.refresh_tokens
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn reset_token_count(&self) -> usize {
        self.reset_tokens.lock().unwrap().len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_account_by_id(&self, account_id: Uuid) -> Result<Option<Account>> {
        Ok(self.account(account_id))
    }

    async fn insert_account(&self, account: NewAccount<'_>) -> Result<Account> {
        let mut accounts = self.accounts.lock().unwrap();
        // The in-memory stand-in for the unique constraint on email.
        if accounts.values().any(|a| a.email == account.email) {
            return Err(AuthError::EmailAlreadyExists);
        }

        let row = Account {
            id: Uuid::new_v4(),
            email: account.email.to_string(),
            password_hash: account.password_hash.to_string(),
            first_name: account.first_name.to_string(),
            last_name: account.last_name.to_string(),
            role: account.role,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            created_at: account.now,
            updated_at: account.now,
        };
        accounts.insert(row.id, row.clone());
        Ok(row)
    }

    async fn record_login_failure(
        &self,
        account_id: Uuid,
        lock_threshold: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<LoginFailure> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&account_id)
            .ok_or(AuthError::UserNotFound)?;

        account.failed_login_attempts += 1;
        if account.failed_login_attempts >= lock_threshold {
            account.locked_until = Some(lock_until);
        }
        account.updated_at = now;

        Ok(LoginFailure {
            attempts: account.failed_login_attempts,
            locked_until: account.locked_until,
        })
    }

    async fn record_login_success(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&account_id)
            .ok_or(AuthError::UserNotFound)?;
        account.failed_login_attempts = 0;
        account.locked_until = None;
        account.last_login_at = Some(now);
        account.updated_at = now;
        Ok(())
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<()> {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        tokens.insert(
            token.token_id,
            RefreshTokenRecord {
                token_id: token.token_id,
                account_id: token.account_id,
                family: token.family,
                expires_at: token.expires_at,
                created_at: token.created_at,
                revoked_at: None,
            },
        );
        Ok(())
    }

    async fn refresh_token_state(&self, token_id: Uuid) -> Result<RefreshTokenState> {
        let tokens = self.refresh_tokens.lock().unwrap();
        Ok(match tokens.get(&token_id) {
            Some(record) if record.is_revoked() => RefreshTokenState::Revoked,
            Some(_) => RefreshTokenState::Active,
            None => RefreshTokenState::Missing,
        })
    }

    async fn consume_refresh_token(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefreshConsumption> {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        Ok(match tokens.get_mut(&token_id) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(now);
                RefreshConsumption::Consumed(record.clone())
            }
            Some(_) => RefreshConsumption::AlreadyRevoked,
            None => RefreshConsumption::Missing,
        })
    }

    async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        tokens
            .entry(token_id)
            .and_modify(|record| {
                record.revoked_at.get_or_insert(now);
            })
            .or_insert(RefreshTokenRecord {
                token_id,
                account_id,
                family: token_id,
                expires_at,
                created_at: now,
                revoked_at: Some(now),
            });
        Ok(())
    }

    async fn revoke_account_refresh_tokens(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        let mut revoked = 0;
        for record in tokens.values_mut() {
            if record.account_id == account_id && record.revoked_at.is_none() {
                record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn insert_reset_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tokens = self.reset_tokens.lock().unwrap();
        tokens.insert(
            token_hash.to_string(),
            PasswordResetToken {
                token_hash: token_hash.to_string(),
                account_id,
                expires_at,
                used_at: None,
                created_at: now,
            },
        );
        Ok(())
    }

    async fn find_reset_token(&self, token_hash: &str) -> Result<Option<PasswordResetToken>> {
        let tokens = self.reset_tokens.lock().unwrap();
        Ok(tokens.get(token_hash).cloned())
    }

    async fn apply_password_reset(
        &self,
        account_id: Uuid,
        token_hash: &str,
        password_hash: &str,
        revoke_refresh_tokens: bool,
        now: DateTime<Utc>,
    ) -> Result<PasswordResetApplied> {
        // Token consumption decides first, as in the Postgres transaction.
        {
            let mut tokens = self.reset_tokens.lock().unwrap();
            match tokens.get_mut(token_hash) {
                Some(record) if record.used_at.is_none() => {
                    record.used_at = Some(now);
                }
                _ => return Ok(PasswordResetApplied::AlreadyUsed),
            }
        }

        {
            let mut accounts = self.accounts.lock().unwrap();
            if let Some(account) = accounts.get_mut(&account_id) {
                account.password_hash = password_hash.to_string();
                account.failed_login_attempts = 0;
                account.locked_until = None;
                account.updated_at = now;
            }
        }

        if revoke_refresh_tokens {
            self.revoke_account_refresh_tokens(account_id, now).await?;
        }

        Ok(PasswordResetApplied::Applied)
    }

    async fn update_password(
        &self,
        account_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&account_id)
            .ok_or(AuthError::UserNotFound)?;
        account.password_hash = password_hash.to_string();
        account.updated_at = now;
        Ok(())
    }
}

/// Captures every delivery handed to the notifier.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, DateTime<Utc>)>>,
}

#[async_trait]
impl ResetNotifier for RecordingNotifier {
    async fn send_reset(
        &self,
        recipient_email: &str,
        raw_token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((
            recipient_email.to_string(),
            raw_token.to_string(),
            expires_at,
        ));
        Ok(())
    }
}

/// Always fails, for asserting that delivery errors never propagate.
pub struct FailingNotifier;

#[async_trait]
impl ResetNotifier for FailingNotifier {
    async fn send_reset(
        &self,
        _recipient_email: &str,
        _raw_token: &str,
        _expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        anyhow::bail!("smtp relay unreachable")
    }
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        access_token_secret: "access-secret-for-tests".into(),
        refresh_token_secret: "refresh-secret-for-tests".into(),
        access_token_ttl_secs: 900,
        refresh_token_ttl_secs: 7 * 24 * 3600,
        issuer: "hr-platform".into(),
        audience: "hr-platform-api".into(),
        max_failed_logins: 5,
        lockout_duration_secs: 1800,
        reset_token_ttl_secs: 3600,
        refresh_rotation: RefreshRotation::Rotating,
    }
}

pub struct TestEnv {
    pub service: AuthenticationService,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Best-effort tracing for test debugging; repeated init attempts are fine.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_env() -> TestEnv {
    env_with_config(test_config())
}

pub fn env_with_config(config: AuthConfig) -> TestEnv {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let service = AuthenticationService::new(
        &config,
        store.clone(),
        notifier.clone(),
        clock.clone(),
    )
    .expect("test config must be valid");

    TestEnv {
        service,
        store,
        clock,
        notifier,
    }
}

pub fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: TEST_PASSWORD.to_string(),
        password_confirm: TEST_PASSWORD.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        role: None,
    }
}
