/// Request and response bodies for the credential flows
///
/// Transport-agnostic: whatever carries these (HTTP, gRPC gateway, CLI) is
/// expected to call `validate()` before handing them to `SessionService`.
use crate::error::{CredentialError, Flow};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 256))]
    pub username: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

/// Body of the reset-complete call. The token arrives as a route parameter.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompletePasswordResetRequest {
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_error(err: &CredentialError, flow: Flow) -> Self {
        Self {
            status: err.status_code(flow),
            message: err.public_message(),
        }
    }
}
