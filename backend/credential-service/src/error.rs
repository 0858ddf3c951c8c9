use crate::store::StoreError;
use crypto_core::TokenError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CredentialError>;

/// Coarse error classes used to pick a response for a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or unvalidated request input
    InvalidInput,
    /// Bad credentials, unverified email, invalid/expired/reused token
    Unauthorized,
    /// Token still valid or already used
    Conflict,
    /// UserDirectory, Notifier or CredentialStore failed or timed out
    DependencyFailure,
    /// Signing key or serialization fault; a configuration defect
    SigningFailure,
}

/// Protocol flow an error was raised in. Status mapping differs per flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Login,
    Logout,
    Refresh,
    InitiatePasswordReset,
    CompletePasswordReset,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Username or password incorrect")]
    InvalidCredentials,

    #[error("Email not verified")]
    EmailNotVerified,

    /// Carries the failure count for logs only; renders like `InvalidCredentials`
    /// so a locked account cannot be told apart from a missing one.
    #[error("Username or password incorrect")]
    AccountLocked(u64),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token still valid for sufficient time, try again later")]
    TokenStillValid,

    #[error("Token has been used")]
    TokenAlreadyUsed,

    #[error("No user found with that email")]
    NoSuchAccount,

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("{0} call timed out")]
    Timeout(&'static str),

    #[error("User directory error: {0}")]
    Directory(String),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("Credential store error: {0}")]
    Store(String),

    #[error("Token signing error: {0}")]
    Signing(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl CredentialError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CredentialError::InvalidInput(_) | CredentialError::InvalidPassword(_) => {
                ErrorClass::InvalidInput
            }
            CredentialError::InvalidCredentials
            | CredentialError::EmailNotVerified
            | CredentialError::AccountLocked(_)
            | CredentialError::InvalidToken
            | CredentialError::NoSuchAccount => ErrorClass::Unauthorized,
            CredentialError::TokenStillValid | CredentialError::TokenAlreadyUsed => {
                ErrorClass::Conflict
            }
            CredentialError::Timeout(_)
            | CredentialError::Directory(_)
            | CredentialError::Notifier(_)
            | CredentialError::Store(_)
            | CredentialError::Internal(_) => ErrorClass::DependencyFailure,
            CredentialError::Signing(_) => ErrorClass::SigningFailure,
        }
    }

    /// HTTP-equivalent status for this error raised in `flow`.
    pub fn status_code(&self, flow: Flow) -> u16 {
        match (self.class(), flow) {
            (ErrorClass::DependencyFailure | ErrorClass::SigningFailure, _) => 500,
            (ErrorClass::InvalidInput, _) => 400,
            // Every client-side refresh failure is a 400
            (_, Flow::Refresh) => 400,
            (_, Flow::CompletePasswordReset) => match self {
                CredentialError::TokenAlreadyUsed => 401,
                _ => 400,
            },
            (ErrorClass::Unauthorized, _) => 401,
            (ErrorClass::Conflict, _) => 400,
        }
    }

    /// Message safe to return to a caller. Dependency detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::DependencyFailure | ErrorClass::SigningFailure => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

// Conversions from component error types
impl From<TokenError> for CredentialError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::SigningFailure(msg) => {
                tracing::error!("Token signing error: {}", msg);
                CredentialError::Signing(msg)
            }
            other => {
                tracing::debug!(reason = %other, "Token rejected");
                CredentialError::InvalidToken
            }
        }
    }
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Credential store error: {}", err);
        CredentialError::Store(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CredentialError {
    fn from(err: validator::ValidationErrors) -> Self {
        CredentialError::InvalidInput(err.to_string())
    }
}
