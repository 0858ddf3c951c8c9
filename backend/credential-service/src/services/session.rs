//! Session service: the credential protocol flows
//!
//! Per account the lifecycle is `LoggedOut -> Authenticated -> (Refreshed)* -> LoggedOut`,
//! with password reset as a side channel that also clears the lockout counter.
//! All shared state lives in the [`CredentialStore`] and the [`UserDirectory`];
//! the service itself holds only immutable configuration and collaborator handles.
//!
//! Concurrency: every store call is atomic on its `(namespace, account)` pair.
//! Read-then-write sequences across two store calls (login overwrite, refresh
//! rotation) are not transactional; concurrent writers resolve last-write-wins.

use crate::config::SessionConfig;
use crate::directory::{DirectoryError, UserDirectory};
use crate::error::{CredentialError, Result};
use crate::models::{Account, TokenPair};
use crate::security::{hash_password, verify_password, PasswordPolicy};
use crate::services::notifier::Notifier;
use crate::store::{CredentialStore, Namespace};
use crypto_core::{AccessClaims, PasswordResetClaims, RefreshClaims, TokenClaims, TokenCodec};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const PASSWORD_RESET_SUBJECT: &str = "Password reset";

pub struct SessionService {
    config: SessionConfig,
    codec: TokenCodec,
    store: Arc<dyn CredentialStore>,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    policy: Arc<dyn PasswordPolicy>,
}

impl SessionService {
    pub fn new(
        config: SessionConfig,
        codec: TokenCodec,
        store: Arc<dyn CredentialStore>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        policy: Arc<dyn PasswordPolicy>,
    ) -> Self {
        Self {
            config,
            codec,
            store,
            directory,
            notifier,
            policy,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Authenticate with username and password and open a session.
    ///
    /// Missing user and wrong password produce the same
    /// [`CredentialError::InvalidCredentials`]. Any previously issued refresh
    /// token for the account is replaced.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let Some(account) = self
            .lookup(self.directory.find_by_username(username))
            .await?
        else {
            debug!("Login attempt for unknown username");
            return Err(CredentialError::InvalidCredentials);
        };
        let key = account.store_key();

        if self.config.max_failed_logins > 0 {
            let failures = self.store.counter(Namespace::FailedLogin, &key).await?;
            if failures >= self.config.max_failed_logins {
                warn!(user_id = %account.id, failures, "Login rejected: account locked");
                return Err(CredentialError::AccountLocked(failures));
            }
        }

        if !verify_password(password, &account.password_hash)? {
            self.note_failed_login(&account).await;
            return Err(CredentialError::InvalidCredentials);
        }

        if !account.email_verified {
            debug!(user_id = %account.id, "Login rejected: email not verified");
            return Err(CredentialError::EmailNotVerified);
        }

        let pair = self.issue_pair(&account).await?;
        info!(user_id = %account.id, "User logged in");
        Ok(pair)
    }

    /// Close the account's session by dropping its refresh token.
    ///
    /// Idempotent. A store failure is logged and swallowed: logout never fails.
    pub async fn logout(&self, account_id: Uuid) -> Result<()> {
        match self
            .store
            .delete(Namespace::RefreshToken, &account_id.to_string())
            .await
        {
            Ok(true) => info!(user_id = %account_id, "User logged out"),
            Ok(false) => debug!(user_id = %account_id, "Logout without an active refresh token"),
            Err(e) => error!(user_id = %account_id, error = %e, "Failed to drop refresh token on logout"),
        }
        Ok(())
    }

    /// Exchange a refresh token for a new access and refresh token.
    ///
    /// Rotation is only accepted inside the renewal window (by default: once
    /// the token has expired) and only for the exact token currently
    /// whitelisted for the subject. The presented token is unusable afterwards.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims: RefreshClaims = self.codec.decode(refresh_token)?;
        let account_id = parse_subject(&claims)?;

        let now = self.codec.clock().now().timestamp();
        let renewable_from = claims.expires_at() - self.config.refresh_renewal_window.num_seconds();
        if now < renewable_from {
            debug!(user_id = %account_id, "Refresh rejected: token still valid");
            return Err(CredentialError::TokenStillValid);
        }

        let stored = self
            .store
            .get(Namespace::RefreshToken, claims.subject())
            .await?;
        match stored {
            Some(current) if current == refresh_token => {}
            Some(_) => {
                warn!(user_id = %account_id, "Refresh rejected: superseded refresh token presented");
                return Err(CredentialError::InvalidToken);
            }
            None => {
                debug!(user_id = %account_id, "Refresh rejected: no active refresh token");
                return Err(CredentialError::InvalidToken);
            }
        }

        let Some(account) = self.lookup(self.directory.find_by_id(account_id)).await? else {
            warn!(user_id = %account_id, "Refresh rejected: account no longer exists");
            return Err(CredentialError::InvalidToken);
        };

        let pair = self.issue_pair(&account).await?;
        info!(user_id = %account.id, "Refresh token rotated");
        Ok(pair)
    }

    /// Mint a single-use reset token and deliver it to the account's email.
    ///
    /// A delivery failure aborts the flow; the stored token is left to expire.
    pub async fn initiate_password_reset(&self, email: &str) -> Result<()> {
        let Some(account) = self.lookup(self.directory.find_by_email(email)).await? else {
            debug!("Password reset requested for unknown email");
            return Err(CredentialError::NoSuchAccount);
        };

        if !account.email_verified {
            debug!(user_id = %account.id, "Password reset rejected: email not verified");
            return Err(CredentialError::EmailNotVerified);
        }

        let key = account.store_key();
        let token = self
            .codec
            .mint::<PasswordResetClaims>(&key, self.config.reset_ttl)?;
        self.store
            .set(Namespace::PasswordReset, &key, &token, self.config.reset_ttl)
            .await?;

        let body = format!(
            "{}, you have requested a password reset: {}/reset-password/{}",
            account.username,
            self.config.app_url.trim_end_matches('/'),
            token
        );
        self.within("notifier", self.notifier.send(&account, PASSWORD_RESET_SUBJECT, &body))
            .await??;

        info!(user_id = %account.id, "Password reset initiated");
        Ok(())
    }

    /// Consume a reset token and set a new password.
    ///
    /// The token is only consumed after the new hash is persisted. Clearing
    /// the reset slot and the lockout counter afterwards is best-effort.
    pub async fn complete_password_reset(&self, reset_token: &str, new_password: &str) -> Result<()> {
        let claims: PasswordResetClaims = self.codec.decode(reset_token)?;
        let account_id = parse_subject(&claims)?;
        let key = claims.subject();

        // Expired reset tokens read the same as consumed ones
        let stored = self.store.get(Namespace::PasswordReset, key).await?;
        if stored.as_deref() != Some(reset_token) || self.codec.is_expired(&claims) {
            debug!(user_id = %account_id, "Password reset rejected: token consumed, expired or superseded");
            return Err(CredentialError::TokenAlreadyUsed);
        }

        self.policy
            .validate(new_password)
            .map_err(CredentialError::InvalidPassword)?;
        let password_hash = hash_password(new_password)?;

        match self
            .within(
                "user directory",
                self.directory.update_password(account_id, &password_hash),
            )
            .await?
        {
            Ok(()) => {}
            Err(DirectoryError::NotFound) => {
                warn!(user_id = %account_id, "Password reset for an account that no longer exists");
                return Err(CredentialError::InvalidToken);
            }
            Err(DirectoryError::Unavailable(msg)) => {
                error!(user_id = %account_id, "User directory error: {}", msg);
                return Err(CredentialError::Directory(msg));
            }
        }

        if let Err(e) = self.store.delete(Namespace::PasswordReset, key).await {
            error!(user_id = %account_id, error = %e, "Failed to consume reset token after password update");
        }
        if let Err(e) = self.store.reset_counter(Namespace::FailedLogin, key).await {
            error!(user_id = %account_id, error = %e, "Failed to clear failed login counter after password reset");
        }

        info!(user_id = %account_id, "Password reset completed");
        Ok(())
    }

    /// Count one failed login against the account. Returns the new total.
    pub async fn record_failed_login(&self, account_id: Uuid) -> Result<u64> {
        let count = self
            .store
            .increment_counter(Namespace::FailedLogin, &account_id.to_string())
            .await?;
        if self.config.max_failed_logins > 0 && count >= self.config.max_failed_logins {
            warn!(user_id = %account_id, failures = count, "Account locked after repeated failed logins");
        }
        Ok(count)
    }

    /// Resolve an access token to its claims.
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims> {
        Ok(self.codec.verify::<AccessClaims>(access_token)?)
    }

    async fn issue_pair(&self, account: &Account) -> Result<TokenPair> {
        let key = account.store_key();
        let access_token = self
            .codec
            .mint::<AccessClaims>(&key, self.config.access_ttl)?;
        let refresh_token = self
            .codec
            .mint::<RefreshClaims>(&key, self.config.refresh_ttl)?;

        self.store
            .set(
                Namespace::RefreshToken,
                &key,
                &refresh_token,
                self.config.refresh_store_ttl(),
            )
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in_minutes: self.config.access_ttl.num_minutes(),
        })
    }

    async fn note_failed_login(&self, account: &Account) {
        match self.record_failed_login(account.id).await {
            Ok(count) => debug!(user_id = %account.id, failures = count, "Login rejected: wrong password"),
            Err(e) => error!(user_id = %account.id, error = %e, "Failed to record failed login"),
        }
    }

    async fn lookup<F>(&self, fut: F) -> Result<Option<Account>>
    where
        F: Future<Output = std::result::Result<Account, DirectoryError>>,
    {
        match self.within("user directory", fut).await? {
            Ok(account) => Ok(Some(account)),
            Err(DirectoryError::NotFound) => Ok(None),
            Err(DirectoryError::Unavailable(msg)) => {
                error!("User directory error: {}", msg);
                Err(CredentialError::Directory(msg))
            }
        }
    }

    async fn within<T, F>(&self, collaborator: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.config.collaborator_timeout, fut)
            .await
            .map_err(|_| {
                warn!(
                    collaborator,
                    timeout_ms = self.config.collaborator_timeout.as_millis() as u64,
                    "Collaborator call timed out"
                );
                CredentialError::Timeout(collaborator)
            })
    }
}

fn parse_subject<C: TokenClaims>(claims: &C) -> Result<Uuid> {
    Uuid::parse_str(claims.subject()).map_err(|_| {
        debug!(kind = %C::KIND, "Token subject is not an account id");
        CredentialError::InvalidToken
    })
}
