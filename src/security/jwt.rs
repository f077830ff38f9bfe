/// Bearer-token codec for the access/refresh pair.
///
/// Access and refresh tokens are signed with *distinct* secrets so one class
/// can never be replayed as the other, the algorithm is pinned to HS256, and
/// issuer/audience are bound on both ends. Keys live in the codec instance;
/// there is no process-wide key state. Expiry is evaluated against the
/// injected clock (`jsonwebtoken`'s own expiry check is disabled) so TTL
/// behavior is deterministic under test.
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::models::AccountRole;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

/// Expected failure classes of token verification.
///
/// These are returned, never thrown; the service maps them into the public
/// error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("wrong token type")]
    WrongType,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Claims of a short-lived access token: the authenticated identity and role
/// consumed by downstream authorization. Not individually revocable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub role: AccountRole,
    pub token_type: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl AccessClaims {
    pub fn account_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Claims of a refresh token. `jti` keys the ledger row; `family` ties
/// rotated successors to the original grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub email: String,
    pub token_type: String,
    pub jti: String,
    pub family: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl RefreshClaims {
    pub fn account_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn token_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.jti).ok()
    }

    pub fn family_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.family).ok()
    }
}

pub struct TokenCodec {
    access_encoding_key: EncodingKey,
    access_decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        // Expiry is checked below against the injected clock instead.
        validation.validate_exp = false;

        Self {
            access_encoding_key: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding_key: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding_key: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding_key: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_secs: config.refresh_token_ttl_secs,
            clock,
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    /// Issue a signed access token asserting `(account_id, email, role)`.
    ///
    /// Carries a fresh `jti` for audit correlation; trusted until natural
    /// expiry.
    pub fn issue_access(
        &self,
        account_id: Uuid,
        email: &str,
        role: AccountRole,
    ) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = AccessClaims {
            sub: account_id.to_string(),
            email: email.to_string(),
            role,
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.access_ttl_secs)).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.access_encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Issue a signed refresh token whose `jti` is the ledger key.
    pub fn issue_refresh(
        &self,
        account_id: Uuid,
        email: &str,
        token_id: Uuid,
        family: Uuid,
    ) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = RefreshClaims {
            sub: account_id.to_string(),
            email: email.to_string(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            jti: token_id.to_string(),
            family: family.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.refresh_ttl_secs)).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(
            &Header::new(JWT_ALGORITHM),
            &claims,
            &self.refresh_encoding_key,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, &self.access_decoding_key, TOKEN_TYPE_ACCESS)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, &self.refresh_decoding_key, TOKEN_TYPE_REFRESH)
    }

    /// Shared verification path: signature, algorithm, issuer, audience via
    /// `jsonwebtoken`; declared type, expiry, and field presence here.
    fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        key: &DecodingKey,
        expected_type: &str,
    ) -> Result<T, TokenError> {
        let data = decode::<serde_json::Value>(token, key, &self.validation)
            .map_err(map_decode_error)?;
        let claims = data.claims;

        match claims.get("token_type").and_then(|v| v.as_str()) {
            Some(declared) if declared == expected_type => {}
            Some(_) => return Err(TokenError::WrongType),
            None => return Err(TokenError::Malformed),
        }

        let exp = claims
            .get("exp")
            .and_then(|v| v.as_i64())
            .ok_or(TokenError::Malformed)?;
        if exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }

        serde_json::from_value(claims).map_err(|_| TokenError::Malformed)
    }

    /// Decode without verifying anything.
    ///
    /// For non-authoritative diagnostics only; never use the result for an
    /// access decision.
    pub fn decode_unsafe(token: &str) -> Option<serde_json::Value> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<serde_json::Value>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }
}

impl From<TokenError> for crate::error::AuthError {
    fn from(err: TokenError) -> Self {
        use crate::error::AuthError;

        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Malformed | TokenError::InvalidSignature | TokenError::WrongType => {
                AuthError::InvalidToken
            }
            TokenError::Signing(msg) => AuthError::Internal(format!("token signing failed: {msg}")),
        }
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        // Unreachable while validate_exp is off; kept so a future change in
        // validation settings cannot silently weaken the mapping.
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    }
}
