//! Signed credential tokens for the credential service
//!
//! Every token is an HS256 JWT carrying `sub`, `iat`, `exp`, a random `jti`
//! and a `token_type` discriminator. The discriminator is checked on every
//! decode, so a password-reset token can never be presented as a refresh
//! token (or any other cross-kind replay).
//!
//! ## Usage
//!
//! ```rust
//! use crypto_core::jwt::{AccessClaims, TokenClaims, TokenCodec};
//!
//! let codec = TokenCodec::from_secret(b"a-long-random-secret").unwrap();
//! let token = codec.mint::<AccessClaims>("user-1", chrono::Duration::minutes(15)).unwrap();
//! let claims = codec.verify::<AccessClaims>(&token).unwrap();
//! assert_eq!(claims.subject(), "user-1");
//! ```
use crate::clock::{Clock, SharedClock, SystemClock};
use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Pinned signing algorithm; tokens with any other `alg` are rejected.
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is malformed")]
    Malformed,

    #[error("expected a {expected} token, found a {found} token")]
    KindMismatch { expected: TokenKind, found: TokenKind },

    #[error("token has expired")]
    Expired,

    #[error("failed to sign token: {0}")]
    SigningFailure(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::InvalidSignature
            }
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Token kind discriminator, serialized into the `token_type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed claims for one token kind.
pub trait TokenClaims: Serialize + DeserializeOwned {
    const KIND: TokenKind;

    fn issue(subject: &str, issued_at: i64, expires_at: i64) -> Self;
    fn kind(&self) -> TokenKind;
    fn subject(&self) -> &str;
    fn issued_at(&self) -> i64;
    fn expires_at(&self) -> i64;
    fn token_id(&self) -> &str;
}

macro_rules! token_claims {
    ($(#[$meta:meta])* $name:ident => $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            /// Account identifier
            pub sub: String,
            /// Issued at (Unix seconds)
            pub iat: i64,
            /// Expiration time (Unix seconds)
            pub exp: i64,
            /// Unique token id
            pub jti: String,
            pub token_type: TokenKind,
        }

        impl TokenClaims for $name {
            const KIND: TokenKind = $kind;

            fn issue(subject: &str, issued_at: i64, expires_at: i64) -> Self {
                Self {
                    sub: subject.to_string(),
                    iat: issued_at,
                    exp: expires_at,
                    jti: Uuid::new_v4().to_string(),
                    token_type: $kind,
                }
            }

            fn kind(&self) -> TokenKind {
                self.token_type
            }

            fn subject(&self) -> &str {
                &self.sub
            }

            fn issued_at(&self) -> i64 {
                self.iat
            }

            fn expires_at(&self) -> i64 {
                self.exp
            }

            fn token_id(&self) -> &str {
                &self.jti
            }
        }
    };
}

token_claims!(
    /// Short-lived proof of identity. Never persisted.
    AccessClaims => TokenKind::Access
);
token_claims!(
    /// Rotating refresh credential; one live value per account.
    RefreshClaims => TokenKind::Refresh
);
token_claims!(
    /// Single-use password reset credential.
    PasswordResetClaims => TokenKind::PasswordReset
);

// ============================================================================
// Codec
// ============================================================================

/// Mints and verifies credential tokens with a fixed secret and clock.
///
/// Keys are derived once at construction and never change afterwards.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: SharedClock,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &JWT_ALGORITHM)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from an HMAC secret.
    ///
    /// ## Errors
    ///
    /// `SigningFailure` if the secret is empty.
    pub fn new(secret: &[u8], clock: SharedClock) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::SigningFailure(
                "signing secret must not be empty".to_string(),
            ));
        }

        // Expiry is checked against the injected clock, not by jsonwebtoken,
        // so refresh can still read claims of an expired token.
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            clock,
        })
    }

    /// Build a codec that uses the wall clock.
    pub fn from_secret(secret: &[u8]) -> Result<Self, TokenError> {
        Self::new(secret, Arc::new(SystemClock))
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Mint a token of kind `C::KIND` for `subject`, valid for `ttl`.
    pub fn mint<C: TokenClaims>(&self, subject: &str, ttl: Duration) -> Result<String, TokenError> {
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            tracing::error!(kind = %C::KIND, ttl_secs = ttl.num_seconds(), "Token lifetime out of range");
            TokenError::SigningFailure("token lifetime out of range".to_string())
        })?;
        let claims = C::issue(subject, now.timestamp(), expires_at.timestamp());

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(kind = %C::KIND, error = %e, "Failed to sign token");
            TokenError::SigningFailure(e.to_string())
        })
    }

    /// Check signature, structure and kind without looking at expiry.
    ///
    /// Used where an expired token is an expected input (refresh rotation).
    pub fn decode<C: TokenClaims>(&self, token: &str) -> Result<C, TokenError> {
        let data = decode::<C>(token, &self.decoding_key, &self.validation)?;

        let found = data.claims.kind();
        if found != C::KIND {
            return Err(TokenError::KindMismatch {
                expected: C::KIND,
                found,
            });
        }

        Ok(data.claims)
    }

    /// Full verification: `decode` plus expiry against the codec clock.
    pub fn verify<C: TokenClaims>(&self, token: &str) -> Result<C, TokenError> {
        let claims = self.decode::<C>(token)?;
        if self.is_expired(&claims) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// A token is expired from the second named by its `exp` claim onwards.
    pub fn is_expired<C: TokenClaims>(&self, claims: &C) -> bool {
        self.clock.now().timestamp() >= claims.expires_at()
    }
}

// ============================================================================
// Tests
// ============================================================================
