/// Credential and session lifecycle orchestration.
///
/// Composes the password policy, token codec, lockout policy, and the
/// credential store into the register / login / refresh / logout /
/// password-reset state machine. The service is stateless between requests;
/// all mutable state lives behind the store boundary, and every failure is
/// normalized into the `AuthError` taxonomy before it crosses this layer.
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{AuthConfig, RefreshRotation};
use crate::error::{AuthError, Result};
use crate::models::{Account, LoginRequest, RegisterRequest, TokenPair};
use crate::security::jwt::AccessClaims;
use crate::security::{LockoutPolicy, PasswordPolicy, TokenCodec};
use crate::services::notifier::ResetNotifier;
use crate::store::{
    CredentialStore, NewAccount, NewRefreshToken, PasswordResetApplied, RefreshConsumption,
    RefreshTokenState,
};
use crate::validators;

/// Length of the raw password-reset secret (before hashing)
const RESET_TOKEN_LEN: usize = 32;

/// Successful authentication: the account snapshot plus a token pair.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub account: Account,
    pub tokens: TokenPair,
}

/// Result of a reset request.
///
/// Structurally identical for known and unknown emails; for the latter the
/// token was never persisted and will never validate.
#[derive(Debug, Clone)]
pub struct PasswordResetRequested {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthenticationService {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    lockout: LockoutPolicy,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn ResetNotifier>,
    rotation: RefreshRotation,
    reset_token_ttl: Duration,
}

impl AuthenticationService {
    /// Build the service from a validated configuration.
    ///
    /// Misconfiguration (shared secrets, non-positive TTLs) fails here, at
    /// startup, never at request time.
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn ResetNotifier>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        Ok(Self {
            codec: TokenCodec::new(config, clock.clone()),
            lockout: LockoutPolicy::new(config.max_failed_logins, config.lockout_duration_secs),
            rotation: config.refresh_rotation,
            reset_token_ttl: Duration::seconds(config.reset_token_ttl_secs),
            store,
            notifier,
            clock,
        })
    }

    pub fn token_codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Register a new account and sign it in.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthOutcome> {
        let email = validators::normalize_email(&request.email);
        let first_name = request.first_name.trim();
        let last_name = request.last_name.trim();

        // Collect every violation, not just the first.
        let mut errors = Vec::new();
        if !validators::is_valid_email(&email) {
            errors.push("email address is not valid".to_string());
        }
        if !validators::is_valid_name(first_name) {
            errors.push("first name is required".to_string());
        }
        if !validators::is_valid_name(last_name) {
            errors.push("last name is required".to_string());
        }
        if request.password != request.password_confirm {
            errors.push("password confirmation does not match".to_string());
        }
        errors.extend(PasswordPolicy::validate(&request.password).errors);
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        // Pre-check is an optimization for a friendly error; the store's
        // unique constraint remains the authoritative guard.
        if self.store.find_account_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let now = self.clock.now();
        let password_hash = crate::security::hash_password(&request.password)?;
        let account = self
            .store
            .insert_account(NewAccount {
                email: &email,
                password_hash: &password_hash,
                first_name,
                last_name,
                role: request.role.unwrap_or_default(),
                now,
            })
            .await?;

        let tokens = self.issue_pair(&account, None, now).await?;

        info!(
            account_id = %account.id,
            email = %mask_email(&account.email),
            role = %account.role,
            "account registered"
        );

        Ok(AuthOutcome { account, tokens })
    }

    /// Authenticate a credential pair.
    ///
    /// The response always reflects the *resulting* account state: a wrong
    /// password that crosses the lockout threshold reports the lock, not
    /// just the bad credential.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthOutcome> {
        let mut errors = Vec::new();
        if request.email.trim().is_empty() {
            errors.push("email is required".to_string());
        }
        if request.password.is_empty() {
            errors.push("password is required".to_string());
        }
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let email = validators::normalize_email(&request.email);
        let now = self.clock.now();

        // Unknown email and wrong password are indistinguishable.
        let account = match self.store.find_account_by_email(&email).await? {
            Some(account) => account,
            None => {
                warn!(email = %mask_email(&email), "login attempt for unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        // Lock expiry is lazy: an expired lock simply stops matching here.
        // No password comparison happens on a locked account.
        if let Some(locked_until) = account.locked_until {
            if locked_until > now {
                return Err(AuthError::AccountLocked {
                    retry_after_secs: LockoutPolicy::remaining_secs(locked_until, now),
                });
            }
        }

        if !account.is_active {
            return Err(AuthError::AccountInactive);
        }

        if !crate::security::verify_password(&request.password, &account.password_hash)? {
            let failure = self
                .store
                .record_login_failure(
                    account.id,
                    self.lockout.max_attempts(),
                    self.lockout.lock_until(now),
                    now,
                )
                .await?;

            warn!(
                account_id = %account.id,
                failed_attempts = failure.attempts,
                "failed login attempt"
            );

            return Err(match failure.locked_until.filter(|until| *until > now) {
                Some(locked_until) => AuthError::AccountLocked {
                    retry_after_secs: LockoutPolicy::remaining_secs(locked_until, now),
                },
                None => AuthError::InvalidCredentials,
            });
        }

        self.store.record_login_success(account.id, now).await?;

        let account = Account {
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: Some(now),
            updated_at: now,
            ..account
        };
        let tokens = self.issue_pair(&account, None, now).await?;

        info!(account_id = %account.id, "login succeeded");

        Ok(AuthOutcome { account, tokens })
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// In rotating mode the presented token is consumed atomically: of any
    /// set of concurrent calls with the same token, exactly one succeeds and
    /// the rest observe it as revoked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthOutcome> {
        let claims = self.codec.verify_refresh(refresh_token)?;
        let token_id = claims.token_id().ok_or(AuthError::InvalidToken)?;
        let account_id = claims.account_id().ok_or(AuthError::InvalidToken)?;
        let family = claims.family_id().ok_or(AuthError::InvalidToken)?;
        let now = self.clock.now();

        // A token with no ledger row fails safe as revoked.
        match self.store.refresh_token_state(token_id).await? {
            RefreshTokenState::Active => {}
            RefreshTokenState::Revoked | RefreshTokenState::Missing => {
                warn!(%token_id, "refresh attempt with revoked or unknown token");
                return Err(AuthError::TokenRevoked);
            }
        }

        let account = self
            .store
            .find_account_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !account.is_active {
            return Err(AuthError::AccountInactive);
        }

        let tokens = match self.rotation {
            RefreshRotation::Rotating => {
                match self.store.consume_refresh_token(token_id, now).await? {
                    RefreshConsumption::Consumed(record) => {
                        self.issue_pair(&account, Some(record.family), now).await?
                    }
                    RefreshConsumption::AlreadyRevoked | RefreshConsumption::Missing => {
                        // Lost the race against a concurrent refresh.
                        warn!(%token_id, family = %family, "refresh token consumed concurrently");
                        return Err(AuthError::TokenRevoked);
                    }
                }
            }
            RefreshRotation::Static => {
                let access_token =
                    self.codec
                        .issue_access(account.id, &account.email, account.role)?;
                TokenPair {
                    access_token,
                    refresh_token: refresh_token.to_string(),
                    token_type: "Bearer".to_string(),
                    expires_in: self.codec.access_ttl_secs(),
                }
            }
        };

        info!(account_id = %account.id, "token refreshed");

        Ok(AuthOutcome { account, tokens })
    }

    /// Revoke a refresh token at logout.
    ///
    /// Idempotent: a second logout with the same token succeeds. The
    /// revocation row carries the token's own expiry so it is prunable.
    pub async fn logout(
        &self,
        token_id: Uuid,
        account_id: Uuid,
        expires_at_epoch_secs: i64,
    ) -> Result<()> {
        let expires_at = Utc
            .timestamp_opt(expires_at_epoch_secs, 0)
            .single()
            .ok_or_else(|| AuthError::Validation(vec!["invalid expiry timestamp".to_string()]))?;

        let now = self.clock.now();
        self.store
            .revoke_refresh_token(token_id, account_id, expires_at, now)
            .await?;

        info!(%account_id, %token_id, "refresh token revoked on logout");
        Ok(())
    }

    /// Start the password-reset flow.
    ///
    /// Anti-enumeration: an unknown or inactive account receives a
    /// success-shaped response whose token was never persisted and can never
    /// validate. The caller cannot tell the cases apart.
    pub async fn request_password_reset(&self, email: &str) -> Result<PasswordResetRequested> {
        let normalized = validators::normalize_email(email);
        if !validators::is_valid_email(&normalized) {
            return Err(AuthError::Validation(vec![
                "email address is not valid".to_string(),
            ]));
        }

        let now = self.clock.now();
        let raw_token = generate_reset_secret();
        let token_hash = hash_reset_token(&raw_token);
        let expires_at = now + self.reset_token_ttl;

        match self.store.find_account_by_email(&normalized).await? {
            Some(account) if account.is_active => {
                self.store
                    .insert_reset_token(account.id, &token_hash, expires_at, now)
                    .await?;

                // Delivery is best-effort; a notifier failure never fails
                // the request itself.
                if let Err(err) = self
                    .notifier
                    .send_reset(&account.email, &raw_token, expires_at)
                    .await
                {
                    warn!(
                        account_id = %account.id,
                        error = %err,
                        "reset notification delivery failed"
                    );
                }

                info!(
                    account_id = %account.id,
                    email = %mask_email(&account.email),
                    "password reset token issued"
                );
            }
            _ => {
                info!(
                    email = %mask_email(&normalized),
                    "password reset requested for unknown or inactive account"
                );
            }
        }

        Ok(PasswordResetRequested {
            token: raw_token,
            expires_at,
        })
    }

    /// Check a reset token and return the account it belongs to.
    ///
    /// A consumed token fails before an expired one: `used_at` wins.
    pub async fn validate_reset_token(&self, token: &str) -> Result<Uuid> {
        let token_hash = hash_reset_token(token);
        let record = self
            .store
            .find_reset_token(&token_hash)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if record.is_used() {
            return Err(AuthError::TokenAlreadyUsed);
        }
        if record.is_expired_at(self.clock.now()) {
            return Err(AuthError::TokenExpired);
        }

        Ok(record.account_id)
    }

    /// Complete the password-reset flow.
    ///
    /// The digest update, counter reset, token consumption, and refresh
    /// revocation happen in one store transaction; a concurrent confirmation
    /// that lost the race observes `TOKEN_ALREADY_USED` and changes nothing.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> Result<()> {
        let mut errors = Vec::new();
        if new_password != new_password_confirm {
            errors.push("password confirmation does not match".to_string());
        }
        errors.extend(PasswordPolicy::validate(new_password).errors);
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let account_id = self.validate_reset_token(token).await?;
        let password_hash = crate::security::hash_password(new_password)?;
        let now = self.clock.now();

        let applied = self
            .store
            .apply_password_reset(
                account_id,
                &hash_reset_token(token),
                &password_hash,
                true,
                now,
            )
            .await?;

        match applied {
            PasswordResetApplied::Applied => {
                info!(%account_id, "password reset confirmed, sessions revoked");
                Ok(())
            }
            PasswordResetApplied::AlreadyUsed => Err(AuthError::TokenAlreadyUsed),
        }
    }

    /// Change the password of an authenticated account.
    ///
    /// Requires the current password; outstanding refresh tokens are revoked
    /// so every other session must re-authenticate.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> Result<()> {
        let account = self
            .store
            .find_account_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !account.is_active {
            return Err(AuthError::AccountInactive);
        }

        if !crate::security::verify_password(current_password, &account.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        if new_password != new_password_confirm {
            return Err(AuthError::Validation(vec![
                "password confirmation does not match".to_string(),
            ]));
        }
        let check = PasswordPolicy::validate(new_password);
        if !check.is_valid {
            return Err(AuthError::WeakPassword(check.errors));
        }

        let now = self.clock.now();
        let password_hash = crate::security::hash_password(new_password)?;
        self.store
            .update_password(account.id, &password_hash, now)
            .await?;
        let revoked = self
            .store
            .revoke_account_refresh_tokens(account.id, now)
            .await?;

        info!(
            account_id = %account.id,
            revoked_tokens = revoked,
            "password changed"
        );
        Ok(())
    }

    /// Verify an access token and return the identity + role claim consumed
    /// by downstream authorization.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        Ok(self.codec.verify_access(token)?)
    }

    /// Issue an access/refresh pair and record the refresh ledger row.
    ///
    /// `family` is `None` for a fresh grant (login/register) and carries the
    /// existing family through a rotation.
    async fn issue_pair(
        &self,
        account: &Account,
        family: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<TokenPair> {
        let token_id = Uuid::new_v4();
        let family = family.unwrap_or_else(Uuid::new_v4);

        let access_token = self
            .codec
            .issue_access(account.id, &account.email, account.role)?;
        let refresh_token =
            self.codec
                .issue_refresh(account.id, &account.email, token_id, family)?;

        self.store
            .insert_refresh_token(NewRefreshToken {
                token_id,
                account_id: account.id,
                family,
                expires_at: now + Duration::seconds(self.codec.refresh_ttl_secs()),
                created_at: now,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.access_ttl_secs(),
        })
    }
}

/// Cryptographically random alphanumeric reset secret
fn generate_reset_secret() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest of a reset secret; only the digest is ever stored
fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Mask an email address for logging
fn mask_email(email: &str) -> String {
    if let Some(at_pos) = email.find('@') {
        let local = &email[..at_pos];
        let domain = &email[at_pos..];
        if local.len() <= 2 {
            format!("**{}", domain)
        } else {
            format!("{}***{}", &local[..1], domain)
        }
    } else {
        "***@***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_secret_shape() {
        let secret = generate_reset_secret();
        assert_eq!(secret.len(), RESET_TOKEN_LEN);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(secret, generate_reset_secret());
    }

    #[test]
    fn test_hash_reset_token_is_deterministic() {
        let hash1 = hash_reset_token("some-token");
        let hash2 = hash_reset_token("some-token");
        assert_eq!(hash1, hash2);
        // SHA-256 hex
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, hash_reset_token("other-token"));
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("ada@example.com"), "a***@example.com");
        assert_eq!(mask_email("ab@example.com"), "**@example.com");
        assert_eq!(mask_email("not-an-email"), "***@***");
    }
}
