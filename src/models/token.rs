use chrono::{DateTime, Utc};
/// Refresh-token ledger row and the issued token pair
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Ledger entry for one issued refresh token.
///
/// The row is keyed by the token's `jti`; `family` ties rotated successors to
/// the original grant so replay of a stolen ancestor is detectable. A set
/// `revoked_at` makes the token permanently unusable even while its signature
/// and expiry are still valid. Rows are prunable once `expires_at` passes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshTokenRecord {
    pub token_id: Uuid,
    pub account_id: Uuid,
    pub family: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Token pair returned by register, login, and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}
