//! Shared fixtures for credential-service integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use credential_service::config::SessionConfig;
use credential_service::directory::InMemoryUserDirectory;
use credential_service::error::Result;
use credential_service::models::Account;
use credential_service::security::{hash_password, CompositionPolicy};
use credential_service::services::Notifier;
use credential_service::store::{CredentialStore, InMemoryCredentialStore};
use credential_service::SessionService;
use crypto_core::{ManualClock, TokenCodec};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const SECRET: &[u8] = b"integration-test-secret";
pub const ALICE_PASSWORD: &str = "OldPass1!";

/// Notifier that keeps every message for inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Uuid, String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(Uuid, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Token from the most recent reset link.
    pub fn last_reset_token(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let (_, _, body) = sent.last().expect("no message sent");
        body.rsplit('/').next().unwrap().to_string()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, account: &Account, subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((account.id, subject.to_string(), body.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<InMemoryCredentialStore>,
    pub directory: Arc<InMemoryUserDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub alice: Account,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::starting_now();
        let store = Arc::new(InMemoryCredentialStore::new(Arc::new(clock.clone())));
        let directory = Arc::new(InMemoryUserDirectory::new());
        let alice = account("alice", "alice@example.com", ALICE_PASSWORD, true);
        directory.insert(alice.clone());

        Self {
            clock,
            store,
            directory,
            notifier: Arc::new(RecordingNotifier::default()),
            alice,
        }
    }

    pub fn codec(&self) -> TokenCodec {
        TokenCodec::new(SECRET, Arc::new(self.clock.clone())).unwrap()
    }

    pub fn service(&self) -> SessionService {
        self.service_with(config())
    }

    pub fn service_with(&self, config: SessionConfig) -> SessionService {
        self.service_with_notifier(config, self.notifier.clone())
    }

    pub fn service_with_notifier(
        &self,
        config: SessionConfig,
        notifier: Arc<dyn Notifier>,
    ) -> SessionService {
        SessionService::new(
            config,
            self.codec(),
            self.store.clone() as Arc<dyn CredentialStore>,
            self.directory.clone(),
            notifier,
            Arc::new(CompositionPolicy::default()),
        )
    }
}

/// 15 minute access, 60 minute refresh, 30 minute reset tokens.
pub fn config() -> SessionConfig {
    let mut config = SessionConfig::new(15, 60, 30).unwrap();
    config.app_url = "https://app.example.com".to_string();
    config.collaborator_timeout = std::time::Duration::from_secs(2);
    config
}

pub fn account(username: &str, email: &str, password: &str, email_verified: bool) -> Account {
    Account {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(password).unwrap(),
        email_verified,
    }
}
