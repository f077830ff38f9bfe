/// Security module for the credential lifecycle core
/// Provides password hashing, the password policy, token encode/verify, and
/// the lockout policy.
pub mod jwt;
pub mod lockout;
pub mod password;

pub use jwt::{AccessClaims, RefreshClaims, TokenCodec, TokenError};
pub use lockout::LockoutPolicy;
pub use password::{hash_password, verify_password, PasswordCheck, PasswordPolicy};
