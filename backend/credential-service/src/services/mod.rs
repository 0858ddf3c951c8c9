pub mod notifier;
pub mod session;

pub use notifier::{EmailNotifier, Notifier};
pub use session::{SessionService, PASSWORD_RESET_SUBJECT};

use crate::config::{SessionConfig, Settings};
use crate::directory::UserDirectory;
use crate::security::CompositionPolicy;
use crate::store::RedisCredentialStore;
use anyhow::{Context, Result};
use crypto_core::TokenCodec;
use redis_utils::RedisPool;
use std::sync::Arc;
use tracing::info;

/// Assemble a production `SessionService`: Redis credential store, SMTP
/// notifier and the default composition policy.
pub async fn build_session_service(
    settings: &Settings,
    directory: Arc<dyn UserDirectory>,
) -> Result<SessionService> {
    let config = SessionConfig::from_settings(settings).context("Invalid token configuration")?;
    let codec = TokenCodec::from_secret(settings.tokens.jwt_secret.as_bytes())
        .context("Failed to initialize token codec")?;

    let redis = RedisPool::connect(&settings.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let store = RedisCredentialStore::new(redis.manager()).with_command_timeout(
        std::time::Duration::from_secs(settings.redis.response_timeout),
    );

    let notifier = EmailNotifier::new(&settings.email).context("Failed to initialize email notifier")?;
    info!(
        smtp_enabled = notifier.is_enabled(),
        "Credential session service initialized"
    );

    Ok(SessionService::new(
        config,
        codec,
        Arc::new(store),
        directory,
        Arc::new(notifier),
        Arc::new(CompositionPolicy::default()),
    ))
}
