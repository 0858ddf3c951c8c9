//! Credential store: per-account token whitelists and lockout counters
//!
//! Three independent namespaces, each holding at most one slot per account:
//!
//! - `RefreshToken`: the single live refresh token (whitelist)
//! - `PasswordReset`: the single unconsumed reset token (whitelist)
//! - `FailedLogin`: failed login counter (lockout blacklist), no TTL
//!
//! Every operation on one `(namespace, account)` pair is atomic. Expired
//! entries are indistinguishable from entries that were never written.
use async_trait::async_trait;
use chrono::Duration;
use std::fmt;

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryCredentialStore;
pub use self::redis::RedisCredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    RefreshToken,
    PasswordReset,
    FailedLogin,
}

impl Namespace {
    /// Stable key segment for this namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::RefreshToken => "refresh",
            Namespace::PasswordReset => "reset",
            Namespace::FailedLogin => "failed_login",
        }
    }

    pub fn is_counter(&self) -> bool {
        matches!(self, Namespace::FailedLogin)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    #[error("operation not supported on the {0} namespace")]
    WrongNamespace(Namespace),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Overwrite the slot for `key`, (re)starting its TTL.
    async fn set(&self, namespace: Namespace, key: &str, value: &str, ttl: Duration)
        -> StoreResult<()>;

    /// Current value, or `None` if never set, deleted or expired.
    async fn get(&self, namespace: Namespace, key: &str) -> StoreResult<Option<String>>;

    /// Remove the slot. Returns whether a live entry existed.
    async fn delete(&self, namespace: Namespace, key: &str) -> StoreResult<bool>;

    /// Atomically add one to a counter and return the new count.
    async fn increment_counter(&self, namespace: Namespace, key: &str) -> StoreResult<u64>;

    /// Current counter value (0 when absent).
    async fn counter(&self, namespace: Namespace, key: &str) -> StoreResult<u64>;

    /// Clear a counter back to zero.
    async fn reset_counter(&self, namespace: Namespace, key: &str) -> StoreResult<()>;
}

pub(crate) fn ensure_token_namespace(namespace: Namespace) -> StoreResult<()> {
    if namespace.is_counter() {
        return Err(StoreError::WrongNamespace(namespace));
    }
    Ok(())
}

pub(crate) fn ensure_counter_namespace(namespace: Namespace) -> StoreResult<()> {
    if !namespace.is_counter() {
        return Err(StoreError::WrongNamespace(namespace));
    }
    Ok(())
}
