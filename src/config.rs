//! Configuration for the credential and session lifecycle core.
//!
//! Loads settings from environment variables (with a `.env` file in local
//! development) and validates them at startup. All secrets and policy knobs
//! are injected through [`AuthConfig`]; nothing in this crate reads
//! process-wide state after construction.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// How refresh tokens behave on a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshRotation {
    /// Revoke the presented token and mint a replacement in the same family.
    #[default]
    Rotating,
    /// Return the presented token unchanged alongside the new access token.
    Static,
}

impl RefreshRotation {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "rotating" => Ok(RefreshRotation::Rotating),
            "static" => Ok(RefreshRotation::Static),
            other => bail!("invalid AUTH_REFRESH_ROTATION: {other}"),
        }
    }
}

/// Settings for token issuance, lockout policy, and the reset flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret for signing access tokens (HS256).
    pub access_token_secret: String,
    /// Secret for signing refresh tokens. Must differ from the access secret
    /// so one token class can never be replayed as the other.
    pub refresh_token_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub issuer: String,
    pub audience: String,
    /// Consecutive failed logins at which the account locks.
    pub max_failed_logins: i32,
    pub lockout_duration_secs: i64,
    pub reset_token_ttl_secs: i64,
    pub refresh_rotation: RefreshRotation,
}

impl AuthConfig {
    /// Load configuration from the environment.
    ///
    /// Secrets are required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
        }

        let config = Self {
            access_token_secret: env::var("AUTH_ACCESS_TOKEN_SECRET")
                .context("AUTH_ACCESS_TOKEN_SECRET must be set")?,
            refresh_token_secret: env::var("AUTH_REFRESH_TOKEN_SECRET")
                .context("AUTH_REFRESH_TOKEN_SECRET must be set")?,
            access_token_ttl_secs: env_i64("AUTH_ACCESS_TOKEN_TTL_SECS", 900)?,
            refresh_token_ttl_secs: env_i64("AUTH_REFRESH_TOKEN_TTL_SECS", 7 * 24 * 3600)?,
            issuer: env::var("AUTH_TOKEN_ISSUER").unwrap_or_else(|_| "hr-platform".to_string()),
            audience: env::var("AUTH_TOKEN_AUDIENCE")
                .unwrap_or_else(|_| "hr-platform-api".to_string()),
            max_failed_logins: env_i64("AUTH_MAX_FAILED_LOGINS", 5)? as i32,
            lockout_duration_secs: env_i64("AUTH_LOCKOUT_DURATION_SECS", 30 * 60)?,
            reset_token_ttl_secs: env_i64("AUTH_RESET_TOKEN_TTL_SECS", 3600)?,
            refresh_rotation: match env::var("AUTH_REFRESH_ROTATION") {
                Ok(value) => RefreshRotation::parse(&value)?,
                Err(_) => RefreshRotation::default(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot operate safely.
    ///
    /// Misconfiguration is a startup failure, never a runtime panic.
    pub fn validate(&self) -> Result<()> {
        if self.access_token_secret.is_empty() || self.refresh_token_secret.is_empty() {
            bail!("token secrets must be non-empty");
        }
        if self.access_token_secret == self.refresh_token_secret {
            bail!("access and refresh token secrets must differ");
        }
        if self.access_token_ttl_secs <= 0 || self.refresh_token_ttl_secs <= 0 {
            bail!("token TTLs must be positive");
        }
        if self.max_failed_logins <= 0 {
            bail!("AUTH_MAX_FAILED_LOGINS must be positive");
        }
        if self.lockout_duration_secs <= 0 {
            bail!("AUTH_LOCKOUT_DURATION_SECS must be positive");
        }
        if self.reset_token_ttl_secs <= 0 {
            bail!("AUTH_RESET_TOKEN_TTL_SECS must be positive");
        }
        if self.issuer.is_empty() || self.audience.is_empty() {
            bail!("issuer and audience must be non-empty");
        }
        Ok(())
    }
}

fn env_i64(name: &str, default: i64) -> Result<i64> {
    match env::var(name) {
        Ok(value) => value
            .parse::<i64>()
            .with_context(|| format!("invalid {name}")),
        Err(_) => Ok(default),
    }
}
