use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account facts the credential core needs from the user directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_verified: bool,
}

impl Account {
    /// Key used for this account in every credential store namespace.
    pub fn store_key(&self) -> String {
        self.id.to_string()
    }
}
