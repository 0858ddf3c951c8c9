//! User directory collaborator
//!
//! The credential core never owns account records; it reads account facts
//! and writes new password hashes through this trait.

use crate::models::Account;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("account not found")]
    NotFound,

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Account, DirectoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Account, DirectoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Account, DirectoryError>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DirectoryError>;
}

/// DashMap-backed directory for tests and single-process embedding.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    accounts: DashMap<Uuid, Account>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) {
        self.accounts.insert(account.id, account);
    }

    fn find_by<F>(&self, pred: F) -> Result<Account, DirectoryError>
    where
        F: Fn(&Account) -> bool,
    {
        self.accounts
            .iter()
            .find(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
            .ok_or(DirectoryError::NotFound)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Account, DirectoryError> {
        self.find_by(|a| a.username == username)
    }

    async fn find_by_email(&self, email: &str) -> Result<Account, DirectoryError> {
        self.find_by(|a| a.email.eq_ignore_ascii_case(email))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Account, DirectoryError> {
        self.accounts
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(DirectoryError::NotFound)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DirectoryError> {
        let mut account = self.accounts.get_mut(&id).ok_or(DirectoryError::NotFound)?;
        account.password_hash = password_hash.to_string();
        Ok(())
    }
}
