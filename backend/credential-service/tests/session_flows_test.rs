/// Integration tests for the credential protocol flows
///
/// Test Coverage:
/// - Login: whitelist write, generic failures, unverified email, lockout
/// - Refresh: still-valid rejection, rotation, superseded and forged tokens, grace expiry
/// - Logout: idempotence and revocation
/// - Password reset: single use, expiry, supersession, policy, counter reset
/// - Collaborator failures and deadlines
mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::{account, config, Harness, ALICE_PASSWORD};
use credential_service::directory::{DirectoryError, UserDirectory};
use credential_service::error::{CredentialError, ErrorClass, Flow, Result};
use credential_service::models::Account;
use credential_service::services::Notifier;
use credential_service::store::{CredentialStore, Namespace, StoreError, StoreResult};
use credential_service::SessionService;
use crypto_core::{PasswordResetClaims, RefreshClaims, TokenCodec};
use mockall::mock;
use std::sync::Arc;
use uuid::Uuid;

mock! {
    pub Notifier {}

    #[async_trait::async_trait]
    impl Notifier for Notifier {
        async fn send(&self, account: &Account, subject: &str, body: &str) -> Result<()>;
    }
}

mock! {
    pub Directory {}

    #[async_trait::async_trait]
    impl UserDirectory for Directory {
        async fn find_by_username(&self, username: &str) -> std::result::Result<Account, DirectoryError>;
        async fn find_by_email(&self, email: &str) -> std::result::Result<Account, DirectoryError>;
        async fn find_by_id(&self, id: Uuid) -> std::result::Result<Account, DirectoryError>;
        async fn update_password(&self, id: Uuid, password_hash: &str) -> std::result::Result<(), DirectoryError>;
    }
}

/// Notifier whose calls never complete.
struct HangingNotifier;

#[async_trait]
impl Notifier for HangingNotifier {
    async fn send(&self, _: &Account, _: &str, _: &str) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Directory whose lookups never complete.
struct HangingDirectory;

#[async_trait]
impl UserDirectory for HangingDirectory {
    async fn find_by_username(&self, _: &str) -> std::result::Result<Account, DirectoryError> {
        std::future::pending().await
    }

    async fn find_by_email(&self, _: &str) -> std::result::Result<Account, DirectoryError> {
        std::future::pending().await
    }

    async fn find_by_id(&self, _: Uuid) -> std::result::Result<Account, DirectoryError> {
        std::future::pending().await
    }

    async fn update_password(&self, _: Uuid, _: &str) -> std::result::Result<(), DirectoryError> {
        std::future::pending().await
    }
}

/// Store that is always down.
struct UnavailableStore;

#[async_trait]
impl CredentialStore for UnavailableStore {
    async fn set(&self, _: Namespace, _: &str, _: &str, _: Duration) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _: Namespace, _: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _: Namespace, _: &str) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn increment_counter(&self, _: Namespace, _: &str) -> StoreResult<u64> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn counter(&self, _: Namespace, _: &str) -> StoreResult<u64> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn reset_counter(&self, _: Namespace, _: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Store whose cleanup calls fail while reads and writes go through.
struct CleanupFailingStore {
    inner: Arc<dyn CredentialStore>,
}

#[async_trait]
impl CredentialStore for CleanupFailingStore {
    async fn set(&self, ns: Namespace, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.inner.set(ns, key, value, ttl).await
    }

    async fn get(&self, ns: Namespace, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(ns, key).await
    }

    async fn delete(&self, _: Namespace, _: &str) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection reset".into()))
    }

    async fn increment_counter(&self, ns: Namespace, key: &str) -> StoreResult<u64> {
        self.inner.increment_counter(ns, key).await
    }

    async fn counter(&self, ns: Namespace, key: &str) -> StoreResult<u64> {
        self.inner.counter(ns, key).await
    }

    async fn reset_counter(&self, _: Namespace, _: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection reset".into()))
    }
}

async fn stored_refresh(h: &Harness) -> Option<String> {
    h.store
        .get(Namespace::RefreshToken, &h.alice.id.to_string())
        .await
        .unwrap()
}

// ============================================
// Login
// ============================================

#[tokio::test]
async fn test_login_whitelists_exactly_the_returned_refresh_token() {
    let h = Harness::new();
    let service = h.service();

    let pair = service.login("alice", ALICE_PASSWORD).await.unwrap();

    assert_eq!(stored_refresh(&h).await, Some(pair.refresh_token.clone()));
    assert_eq!(pair.expires_in_minutes, 15);
    assert_ne!(pair.access_token, pair.refresh_token);
}

#[tokio::test]
async fn test_second_login_replaces_refresh_token() {
    let h = Harness::new();
    let service = h.service();

    let first = service.login("alice", ALICE_PASSWORD).await.unwrap();
    let second = service.login("alice", ALICE_PASSWORD).await.unwrap();
    assert_eq!(stored_refresh(&h).await, Some(second.refresh_token.clone()));

    h.clock.advance(Duration::minutes(61));
    assert!(matches!(
        service.refresh(&first.refresh_token).await,
        Err(CredentialError::InvalidToken)
    ));
    assert!(service.refresh(&second.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let h = Harness::new();
    let service = h.service();

    let unknown = service.login("mallory", ALICE_PASSWORD).await.unwrap_err();
    let wrong = service.login("alice", "WrongPass1!").await.unwrap_err();

    assert!(matches!(unknown, CredentialError::InvalidCredentials));
    assert!(matches!(wrong, CredentialError::InvalidCredentials));
    assert_eq!(unknown.public_message(), wrong.public_message());
    assert_eq!(wrong.status_code(Flow::Login), 401);
    assert_eq!(stored_refresh(&h).await, None);
}

#[tokio::test]
async fn test_login_rejects_unverified_email() {
    let h = Harness::new();
    h.directory
        .insert(account("bob", "bob@example.com", "BobPass1!", false));
    let service = h.service();

    let err = service.login("bob", "BobPass1!").await.unwrap_err();
    assert!(matches!(err, CredentialError::EmailNotVerified));
    assert_eq!(err.status_code(Flow::Login), 401);
}

#[tokio::test]
async fn test_lockout_after_repeated_failures() {
    let h = Harness::new();
    let mut cfg = config();
    cfg.max_failed_logins = 2;
    let service = h.service_with(cfg);

    for _ in 0..2 {
        assert!(matches!(
            service.login("alice", "WrongPass1!").await,
            Err(CredentialError::InvalidCredentials)
        ));
    }

    // correct password no longer helps
    let err = service.login("alice", ALICE_PASSWORD).await.unwrap_err();
    assert!(matches!(err, CredentialError::AccountLocked(2)));
    assert_eq!(err.status_code(Flow::Login), 401);

    // only a password reset unlocks
    service.initiate_password_reset("alice@example.com").await.unwrap();
    let token = h.notifier.last_reset_token();
    service.complete_password_reset(&token, "NewPass1!").await.unwrap();
    assert!(service.login("alice", "NewPass1!").await.is_ok());
}

#[tokio::test]
async fn test_locked_account_looks_like_missing_user() {
    let h = Harness::new();
    let mut cfg = config();
    cfg.max_failed_logins = 2;
    let service = h.service_with(cfg);

    for _ in 0..3 {
        let _ = service.login("alice", "WrongPass1!").await;
        let _ = service.login("ghost", "WrongPass1!").await;
    }

    let locked = service.login("alice", ALICE_PASSWORD).await.unwrap_err();
    let missing = service.login("ghost", ALICE_PASSWORD).await.unwrap_err();

    assert!(matches!(locked, CredentialError::AccountLocked(_)));
    assert!(matches!(missing, CredentialError::InvalidCredentials));
    assert_eq!(locked.public_message(), missing.public_message());
    assert_eq!(locked.to_string(), missing.to_string());
    assert_eq!(
        locked.status_code(Flow::Login),
        missing.status_code(Flow::Login)
    );
}

#[tokio::test]
async fn test_concurrent_logins_last_write_wins() {
    let h = Harness::new();
    let service = h.service();

    let (a, b) = tokio::join!(
        service.login("alice", ALICE_PASSWORD),
        service.login("alice", ALICE_PASSWORD)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let stored = stored_refresh(&h).await.unwrap();
    assert!(stored == a.refresh_token || stored == b.refresh_token);
}

// ============================================
// Refresh
// ============================================

#[tokio::test]
async fn test_refresh_scenario_still_valid_then_rotates() {
    let h = Harness::new();
    let service = h.service();
    let pair = service.login("alice", ALICE_PASSWORD).await.unwrap();

    let err = service.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, CredentialError::TokenStillValid));
    assert_eq!(err.status_code(Flow::Refresh), 400);

    h.clock.advance(Duration::minutes(61));
    let rotated = service.refresh(&pair.refresh_token).await.unwrap();
    assert_ne!(rotated.refresh_token, pair.refresh_token);
    assert_eq!(stored_refresh(&h).await, Some(rotated.refresh_token.clone()));

    // the old token is dead, the new one is only usable once it expires
    assert!(matches!(
        service.refresh(&pair.refresh_token).await,
        Err(CredentialError::InvalidToken)
    ));
    assert!(matches!(
        service.refresh(&rotated.refresh_token).await,
        Err(CredentialError::TokenStillValid)
    ));
    h.clock.advance(Duration::minutes(61));
    assert!(service.refresh(&rotated.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_refresh_after_grace_window_fails() {
    let h = Harness::new();
    let service = h.service();
    let pair = service.login("alice", ALICE_PASSWORD).await.unwrap();

    // 60 minute lifetime plus 60 minute grace
    h.clock.advance(Duration::minutes(121));

    let err = service.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, CredentialError::InvalidToken));
    assert_eq!(err.status_code(Flow::Refresh), 400);
}

#[tokio::test]
async fn test_refresh_inside_renewal_window() {
    let h = Harness::new();
    let mut cfg = config();
    cfg.refresh_renewal_window = Duration::minutes(10);
    let service = h.service_with(cfg);
    let pair = service.login("alice", ALICE_PASSWORD).await.unwrap();

    h.clock.advance(Duration::minutes(49));
    assert!(matches!(
        service.refresh(&pair.refresh_token).await,
        Err(CredentialError::TokenStillValid)
    ));

    h.clock.advance(Duration::minutes(1));
    assert!(service.refresh(&pair.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_refresh_rejects_forged_token() {
    let h = Harness::new();
    let service = h.service();
    service.login("alice", ALICE_PASSWORD).await.unwrap();

    let forger = TokenCodec::new(b"attacker-secret", Arc::new(h.clock.clone())).unwrap();
    let forged = forger
        .mint::<RefreshClaims>(&h.alice.id.to_string(), Duration::minutes(60))
        .unwrap();
    h.clock.advance(Duration::minutes(61));

    assert!(matches!(
        service.refresh(&forged).await,
        Err(CredentialError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_refresh_rejects_signature_valid_unstored_token() {
    let h = Harness::new();
    let service = h.service();
    service.login("alice", ALICE_PASSWORD).await.unwrap();

    // correctly signed but never whitelisted
    let stray = h
        .codec()
        .mint::<RefreshClaims>(&h.alice.id.to_string(), Duration::minutes(60))
        .unwrap();
    h.clock.advance(Duration::minutes(61));

    assert!(matches!(
        service.refresh(&stray).await,
        Err(CredentialError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_refresh_rejects_other_token_kinds() {
    let h = Harness::new();
    let service = h.service();
    let pair = service.login("alice", ALICE_PASSWORD).await.unwrap();
    let reset = h
        .codec()
        .mint::<PasswordResetClaims>(&h.alice.id.to_string(), Duration::minutes(1))
        .unwrap();
    h.clock.advance(Duration::minutes(61));

    assert!(matches!(
        service.refresh(&pair.access_token).await,
        Err(CredentialError::InvalidToken)
    ));
    assert!(matches!(
        service.refresh(&reset).await,
        Err(CredentialError::InvalidToken)
    ));
    assert!(matches!(
        service.refresh("garbage").await,
        Err(CredentialError::InvalidToken)
    ));
}

// ============================================
// Logout
// ============================================

#[tokio::test]
async fn test_logout_is_idempotent_and_revokes() {
    let h = Harness::new();
    let service = h.service();
    let pair = service.login("alice", ALICE_PASSWORD).await.unwrap();

    let account_id = Uuid::parse_str(
        crypto_core::TokenClaims::subject(&service.authenticate(&pair.access_token).unwrap()),
    )
    .unwrap();
    assert_eq!(account_id, h.alice.id);

    service.logout(account_id).await.unwrap();
    service.logout(account_id).await.unwrap();
    assert_eq!(stored_refresh(&h).await, None);

    h.clock.advance(Duration::minutes(61));
    assert!(matches!(
        service.refresh(&pair.refresh_token).await,
        Err(CredentialError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_logout_swallows_store_failure() {
    let h = Harness::new();
    let service = SessionService::new(
        config(),
        h.codec(),
        Arc::new(UnavailableStore),
        h.directory.clone(),
        h.notifier.clone(),
        Arc::new(credential_service::security::CompositionPolicy::default()),
    );

    assert!(service.logout(h.alice.id).await.is_ok());

    let err = service.login("alice", ALICE_PASSWORD).await.unwrap_err();
    assert!(matches!(err, CredentialError::Store(_)));
    assert_eq!(err.status_code(Flow::Login), 500);
    assert_eq!(err.public_message(), "Internal server error");
}

// ============================================
// Password reset
// ============================================

#[tokio::test]
async fn test_password_reset_scenario() {
    let h = Harness::new();
    let service = h.service();

    service.initiate_password_reset("alice@example.com").await.unwrap();
    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    let (recipient, subject, body) = &messages[0];
    assert_eq!(*recipient, h.alice.id);
    assert_eq!(subject, "Password reset");
    assert!(body.starts_with(
        "alice, you have requested a password reset: https://app.example.com/reset-password/"
    ));

    let token = h.notifier.last_reset_token();
    service.complete_password_reset(&token, "NewPass1!").await.unwrap();

    assert!(service.login("alice", "NewPass1!").await.is_ok());
    assert!(matches!(
        service.login("alice", ALICE_PASSWORD).await,
        Err(CredentialError::InvalidCredentials)
    ));

    let err = service
        .complete_password_reset(&token, "OtherPass2@")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::TokenAlreadyUsed));
    assert_eq!(err.status_code(Flow::CompletePasswordReset), 401);
}

#[tokio::test]
async fn test_reset_for_unknown_email_discloses() {
    let h = Harness::new();
    let service = h.service();

    let err = service
        .initiate_password_reset("nobody@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::NoSuchAccount));
    assert_eq!(err.status_code(Flow::InitiatePasswordReset), 401);
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_reset_requires_verified_email() {
    let h = Harness::new();
    h.directory
        .insert(account("bob", "bob@example.com", "BobPass1!", false));
    let service = h.service();

    assert!(matches!(
        service.initiate_password_reset("bob@example.com").await,
        Err(CredentialError::EmailNotVerified)
    ));
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_reset_rejects_weak_password_without_consuming_token() {
    let h = Harness::new();
    let service = h.service();
    service.initiate_password_reset("alice@example.com").await.unwrap();
    let token = h.notifier.last_reset_token();

    let err = service
        .complete_password_reset(&token, "short")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::InvalidPassword(_)));
    assert_eq!(err.status_code(Flow::CompletePasswordReset), 400);

    service.complete_password_reset(&token, "NewPass1!").await.unwrap();
}

#[tokio::test]
async fn test_expired_reset_token_reads_as_used() {
    let h = Harness::new();
    let service = h.service();
    service.initiate_password_reset("alice@example.com").await.unwrap();
    let token = h.notifier.last_reset_token();

    h.clock.advance(Duration::minutes(31));

    assert!(matches!(
        service.complete_password_reset(&token, "NewPass1!").await,
        Err(CredentialError::TokenAlreadyUsed)
    ));
}

#[tokio::test]
async fn test_new_reset_request_supersedes_previous() {
    let h = Harness::new();
    let service = h.service();

    service.initiate_password_reset("alice@example.com").await.unwrap();
    let first = h.notifier.last_reset_token();
    service.initiate_password_reset("alice@example.com").await.unwrap();
    let second = h.notifier.last_reset_token();
    assert_ne!(first, second);

    assert!(matches!(
        service.complete_password_reset(&first, "NewPass1!").await,
        Err(CredentialError::TokenAlreadyUsed)
    ));
    service.complete_password_reset(&second, "NewPass1!").await.unwrap();
}

#[tokio::test]
async fn test_reset_rejects_wrong_kind_and_garbage() {
    let h = Harness::new();
    let service = h.service();
    let pair = service.login("alice", ALICE_PASSWORD).await.unwrap();

    let err = service
        .complete_password_reset(&pair.refresh_token, "NewPass1!")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::InvalidToken));
    assert_eq!(err.status_code(Flow::CompletePasswordReset), 400);

    assert!(matches!(
        service.complete_password_reset("not.a.token", "NewPass1!").await,
        Err(CredentialError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_reset_clears_failed_login_counter() {
    let h = Harness::new();
    let service = h.service();
    for _ in 0..3 {
        service.record_failed_login(h.alice.id).await.unwrap();
    }

    service.initiate_password_reset("alice@example.com").await.unwrap();
    let token = h.notifier.last_reset_token();
    service.complete_password_reset(&token, "NewPass1!").await.unwrap();

    let key = h.alice.id.to_string();
    assert_eq!(h.store.counter(Namespace::FailedLogin, &key).await.unwrap(), 0);
    assert_eq!(h.store.get(Namespace::PasswordReset, &key).await.unwrap(), None);
}

#[tokio::test]
async fn test_reset_succeeds_when_cleanup_fails() {
    let h = Harness::new();
    let store = Arc::new(CleanupFailingStore {
        inner: h.store.clone(),
    });
    let service = SessionService::new(
        config(),
        h.codec(),
        store,
        h.directory.clone(),
        h.notifier.clone(),
        Arc::new(credential_service::security::CompositionPolicy::default()),
    );
    service.record_failed_login(h.alice.id).await.unwrap();

    service.initiate_password_reset("alice@example.com").await.unwrap();
    let token = h.notifier.last_reset_token();
    service
        .complete_password_reset(&token, "NewPass1!")
        .await
        .unwrap();

    // password change stands even though neither slot could be cleared
    assert!(service.login("alice", "NewPass1!").await.is_ok());
    let key = h.alice.id.to_string();
    assert_eq!(h.store.counter(Namespace::FailedLogin, &key).await.unwrap(), 1);
    assert_eq!(
        h.store.get(Namespace::PasswordReset, &key).await.unwrap(),
        Some(token)
    );
}

// ============================================
// Collaborator failures
// ============================================

#[tokio::test]
async fn test_notifier_failure_aborts_initiate() {
    let h = Harness::new();
    let mut notifier = MockNotifier::new();
    notifier
        .expect_send()
        .withf(|account, subject, body| {
            account.username == "alice"
                && subject.to_string() == "Password reset"
                && body.contains("/reset-password/")
        })
        .times(1)
        .returning(|_, _, _| Err(CredentialError::Notifier("smtp relay refused".into())));
    let service = h.service_with_notifier(config(), Arc::new(notifier));

    let err = service
        .initiate_password_reset("alice@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::Notifier(_)));
    assert_eq!(err.status_code(Flow::InitiatePasswordReset), 500);
    assert_eq!(err.public_message(), "Internal server error");

    // the minted token is left behind to expire on its own
    let leftover = h
        .store
        .get(Namespace::PasswordReset, &h.alice.id.to_string())
        .await
        .unwrap();
    assert!(leftover.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_notifier_deadline() {
    let h = Harness::new();
    let service = h.service_with_notifier(config(), Arc::new(HangingNotifier));

    let err = service
        .initiate_password_reset("alice@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::Timeout("notifier")));
    assert_eq!(err.class(), ErrorClass::DependencyFailure);
}

#[tokio::test(start_paused = true)]
async fn test_directory_deadline() {
    let h = Harness::new();
    let service = SessionService::new(
        config(),
        h.codec(),
        h.store.clone(),
        Arc::new(HangingDirectory),
        h.notifier.clone(),
        Arc::new(credential_service::security::CompositionPolicy::default()),
    );

    let err = service.login("alice", ALICE_PASSWORD).await.unwrap_err();
    assert!(matches!(err, CredentialError::Timeout("user directory")));
    assert_eq!(stored_refresh(&h).await, None);
}

#[tokio::test]
async fn test_directory_unavailable() {
    let h = Harness::new();
    let mut directory = MockDirectory::new();
    directory
        .expect_find_by_username()
        .returning(|_| Err(DirectoryError::Unavailable("pool timed out".into())));
    let service = SessionService::new(
        config(),
        h.codec(),
        h.store.clone(),
        Arc::new(directory),
        h.notifier.clone(),
        Arc::new(credential_service::security::CompositionPolicy::default()),
    );

    let err = service.login("alice", ALICE_PASSWORD).await.unwrap_err();
    assert!(matches!(err, CredentialError::Directory(_)));
    assert_eq!(err.status_code(Flow::Login), 500);
}

#[tokio::test]
async fn test_failed_password_write_keeps_reset_token() {
    let h = Harness::new();
    let alice = h.alice.clone();
    let mut directory = MockDirectory::new();
    directory
        .expect_find_by_email()
        .returning(move |_| Ok(alice.clone()));
    directory
        .expect_update_password()
        .times(1)
        .returning(|_, _| Err(DirectoryError::Unavailable("primary is read-only".into())));
    let service = SessionService::new(
        config(),
        h.codec(),
        h.store.clone(),
        Arc::new(directory),
        h.notifier.clone(),
        Arc::new(credential_service::security::CompositionPolicy::default()),
    );

    service.initiate_password_reset("alice@example.com").await.unwrap();
    let token = h.notifier.last_reset_token();

    let err = service
        .complete_password_reset(&token, "NewPass1!")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::Directory(_)));

    let stored = h
        .store
        .get(Namespace::PasswordReset, &h.alice.id.to_string())
        .await
        .unwrap();
    assert_eq!(stored, Some(token));
}
