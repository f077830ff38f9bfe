/// Password hashing and strength policy using Argon2id and zxcvbn
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use zxcvbn::zxcvbn;

use crate::error::{AuthError, Result};

const MIN_PASSWORD_LEN: usize = 8;
const MIN_STRENGTH_SCORE: u8 = 3;

/// Result of a password-policy check.
///
/// `errors` lists every violation, not just the first; `score` is the zxcvbn
/// entropy score on the 0-4 scale.
#[derive(Debug, Clone)]
pub struct PasswordCheck {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub score: u8,
}

/// Stateless strength and format validator.
///
/// Applied identically during registration, password change, and
/// password-reset confirmation. Hashing is intentionally separate: callers
/// run the policy first, then hash.
pub struct PasswordPolicy;

impl PasswordPolicy {
    pub fn validate(password: &str) -> PasswordCheck {
        let mut errors = Vec::new();

        if password.len() < MIN_PASSWORD_LEN {
            errors.push(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push("password must contain at least one uppercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push("password must contain at least one lowercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("password must contain at least one digit".to_string());
        }
        if !password.chars().any(|c| !c.is_alphanumeric()) {
            errors.push("password must contain at least one special character".to_string());
        }

        // Entropy check; zxcvbn rejects empty input, which the length rule
        // already reports.
        let score = match zxcvbn(password, &[]) {
            Ok(entropy) => entropy.score(),
            Err(_) => 0,
        };
        if score < MIN_STRENGTH_SCORE {
            errors.push("password is too predictable, use a stronger password".to_string());
        }

        PasswordCheck {
            is_valid: errors.is_empty(),
            errors,
            score,
        }
    }
}

/// Hash a password using Argon2id with a random per-password salt.
///
/// Returns the PHC-formatted hash string for storage. Strength is the
/// caller's concern via [`PasswordPolicy`].
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against its stored PHC hash.
///
/// Returns `false` on mismatch; a corrupt stored digest is an internal
/// error, not a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AuthError::Internal(format!("invalid password hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Internal(format!(
            "password verification failed: {e}"
        ))),
    }
}
