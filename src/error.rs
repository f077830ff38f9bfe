use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

/// Error type for every credential and session lifecycle operation.
///
/// Storage and codec failures are normalized into this enum at the service
/// boundary; raw driver errors never cross it. `INVALID_CREDENTIALS` is
/// deliberately identical for "no such account" and "wrong password".
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("email already exists")]
    EmailAlreadyExists,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account locked, retry after {retry_after_secs} seconds")]
    AccountLocked { retry_after_secs: i64 },

    #[error("account is inactive")]
    AccountInactive,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("token revoked")]
    TokenRevoked,

    #[error("token already used")]
    TokenAlreadyUsed,

    #[error("user not found")]
    UserNotFound,

    #[error("password too weak: {}", .0.join("; "))]
    WeakPassword(Vec<String>),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable error-kind contract consumed by the HTTP layer.
///
/// The HTTP caller maps each kind to a status code; the strings returned by
/// [`ErrorKind::as_str`] are part of that contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    EmailAlreadyExists,
    InvalidCredentials,
    AccountLocked,
    AccountInactive,
    InvalidToken,
    TokenExpired,
    TokenRevoked,
    TokenAlreadyUsed,
    UserNotFound,
    WeakPassword,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            ErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorKind::AccountLocked => "ACCOUNT_LOCKED",
            ErrorKind::AccountInactive => "ACCOUNT_INACTIVE",
            ErrorKind::InvalidToken => "INVALID_TOKEN",
            ErrorKind::TokenExpired => "TOKEN_EXPIRED",
            ErrorKind::TokenRevoked => "TOKEN_REVOKED",
            ErrorKind::TokenAlreadyUsed => "TOKEN_ALREADY_USED",
            ErrorKind::UserNotFound => "USER_NOT_FOUND",
            ErrorKind::WeakPassword => "WEAK_PASSWORD",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::EmailAlreadyExists => ErrorKind::EmailAlreadyExists,
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::AccountLocked { .. } => ErrorKind::AccountLocked,
            AuthError::AccountInactive => ErrorKind::AccountInactive,
            AuthError::InvalidToken => ErrorKind::InvalidToken,
            AuthError::TokenExpired => ErrorKind::TokenExpired,
            AuthError::TokenRevoked => ErrorKind::TokenRevoked,
            AuthError::TokenAlreadyUsed => ErrorKind::TokenAlreadyUsed,
            AuthError::UserNotFound => ErrorKind::UserNotFound,
            AuthError::WeakPassword(_) => ErrorKind::WeakPassword,
            AuthError::Database(_) | AuthError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Client-safe message for the wire. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_) | AuthError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "database error");
        AuthError::Database(err.to_string())
    }
}
