/// Password hashing, verification and strength policy using Argon2id
use crate::error::{CredentialError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use zxcvbn::zxcvbn;

/// Hash a password using Argon2id
///
/// Returns a PHC-formatted string with a random per-password salt. Strength
/// is checked separately by a [`PasswordPolicy`].
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its PHC hash (constant-time comparison)
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| CredentialError::Internal(format!("Invalid password hash format: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CredentialError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

/// Pluggable acceptance check for new passwords.
pub trait PasswordPolicy: Send + Sync {
    /// `Err(reason)` when the password is rejected.
    fn validate(&self, password: &str) -> std::result::Result<(), String>;
}

/// Composition rules, optionally backed by a zxcvbn entropy floor
///
/// ## Requirements
///
/// - Minimum length (default 8 characters)
/// - At least one uppercase letter
/// - At least one lowercase letter
/// - At least one digit
/// - At least one special character
/// - zxcvbn score >= `min_entropy_score`, when set
#[derive(Debug, Clone)]
pub struct CompositionPolicy {
    pub min_length: usize,
    pub min_entropy_score: Option<u8>,
}

impl Default for CompositionPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            min_entropy_score: None,
        }
    }
}

impl CompositionPolicy {
    pub fn with_min_entropy_score(mut self, score: u8) -> Self {
        self.min_entropy_score = Some(score);
        self
    }
}

impl PasswordPolicy for CompositionPolicy {
    fn validate(&self, password: &str) -> std::result::Result<(), String> {
        if password.chars().count() < self.min_length {
            return Err(format!(
                "Password must be at least {} characters",
                self.min_length
            ));
        }

        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err("Password must contain at least one uppercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err("Password must contain at least one lowercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err("Password must contain at least one digit".to_string());
        }
        if !password.chars().any(|c| !c.is_alphanumeric()) {
            return Err("Password must contain at least one special character".to_string());
        }

        if let Some(min_score) = self.min_entropy_score {
            let entropy = zxcvbn(password, &[])
                .map_err(|e| format!("Password entropy calculation failed: {}", e))?;
            if entropy.score() < min_score {
                return Err(
                    "Password is too weak. Please use a stronger password with higher entropy."
                        .to_string(),
                );
            }
        }

        Ok(())
    }
}
