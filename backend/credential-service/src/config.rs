//! Configuration management for the credential service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! Settings are read once at startup and are immutable afterwards; every
//! component receives the values it needs at construction.
//!
//! # Example
//!
//! ```no_run
//! use credential_service::config::{SessionConfig, Settings};
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let session = SessionConfig::from_settings(&settings)?;
//!     println!("access tokens live {} minutes", session.access_ttl.num_minutes());
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub tokens: TokenSettings,
    pub lockout: LockoutSettings,
    pub redis: RedisSettings,
    pub email: EmailSettings,
    /// Deadline for a single UserDirectory or Notifier call
    pub collaborator_timeout_secs: u64,
}

impl Settings {
    /// Load settings from environment variables (and `.env` in debug builds)
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            tokens: TokenSettings::from_env()?,
            lockout: LockoutSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            email: EmailSettings::from_env()?,
            collaborator_timeout_secs: env::var("COLLABORATOR_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid COLLABORATOR_TIMEOUT_SECS")?,
        })
    }
}

/// Token signing and lifetime settings (all durations in minutes)
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_minutes: i64,
    pub reset_token_minutes: i64,
    /// How long before `exp` a refresh token may already be rotated (0 = only once expired)
    pub refresh_renewal_window_minutes: i64,
    /// How long an expired refresh token stays rotatable
    pub refresh_grace_minutes: i64,
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_minutes", &self.access_token_minutes)
            .field("refresh_token_minutes", &self.refresh_token_minutes)
            .field("reset_token_minutes", &self.reset_token_minutes)
            .field(
                "refresh_renewal_window_minutes",
                &self.refresh_renewal_window_minutes,
            )
            .field("refresh_grace_minutes", &self.refresh_grace_minutes)
            .finish()
    }
}

impl TokenSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            access_token_minutes: required_minutes("ACCESS_TOKEN_MINUTES")?,
            refresh_token_minutes: required_minutes("REFRESH_TOKEN_MINUTES")?,
            reset_token_minutes: required_minutes("RESET_TOKEN_MINUTES")?,
            refresh_renewal_window_minutes: env::var("REFRESH_RENEWAL_WINDOW_MINUTES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("Invalid REFRESH_RENEWAL_WINDOW_MINUTES")?,
            refresh_grace_minutes: env::var("REFRESH_GRACE_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid REFRESH_GRACE_MINUTES")?,
        })
    }
}

fn required_minutes(var: &str) -> Result<i64> {
    env::var(var)
        .with_context(|| format!("{var} must be set"))?
        .parse()
        .with_context(|| format!("Invalid {var}"))
}

/// Brute-force lockout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutSettings {
    /// Failed logins after which the account refuses further attempts
    pub max_failed_logins: u64,
}

impl LockoutSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            max_failed_logins: env::var("MAX_FAILED_LOGINS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid MAX_FAILED_LOGINS")?,
        })
    }
}

/// Redis credential store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
    pub response_timeout: u64,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
            response_timeout: env::var("REDIS_RESPONSE_TIMEOUT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("Invalid REDIS_RESPONSE_TIMEOUT")?,
        })
    }
}

/// Email delivery settings
#[derive(Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub use_starttls: bool,
    /// Base URL used to build password reset links
    pub app_url: String,
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "<redacted>"))
            .field("smtp_from", &self.smtp_from)
            .field("use_starttls", &self.use_starttls)
            .field("app_url", &self.app_url)
            .finish()
    }
}

impl EmailSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
            smtp_port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "1025".to_string())
                .parse()
                .context("Invalid SMTP_PORT")?,
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM").unwrap_or_else(|_| "noreply@localhost".to_string()),
            use_starttls: env::var("SMTP_USE_STARTTLS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
        })
    }
}

/// Upper bound for any configured lifetime or window (100 years).
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365 * 100;

/// Validated lifetimes and limits handed to `SessionService`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub reset_ttl: Duration,
    pub refresh_renewal_window: Duration,
    pub refresh_grace: Duration,
    pub max_failed_logins: u64,
    pub collaborator_timeout: std::time::Duration,
    pub app_url: String,
}

impl SessionConfig {
    /// Build a config from the three required token lifetimes (minutes).
    ///
    /// Optional knobs start at their defaults: no early renewal, one hour of
    /// refresh grace, lockout after 5 failures, 10 second collaborator deadline.
    pub fn new(access_minutes: i64, refresh_minutes: i64, reset_minutes: i64) -> Result<Self> {
        for (name, minutes) in [
            ("access token", access_minutes),
            ("refresh token", refresh_minutes),
            ("reset token", reset_minutes),
        ] {
            if minutes <= 0 {
                bail!("{name} duration must be a positive number of minutes, got {minutes}");
            }
            if minutes > MAX_TTL_MINUTES {
                bail!("{name} duration must not exceed {MAX_TTL_MINUTES} minutes, got {minutes}");
            }
        }

        Ok(Self {
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::minutes(refresh_minutes),
            reset_ttl: Duration::minutes(reset_minutes),
            refresh_renewal_window: Duration::zero(),
            refresh_grace: Duration::minutes(60),
            max_failed_logins: 5,
            collaborator_timeout: std::time::Duration::from_secs(10),
            app_url: "http://localhost:8080".to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let tokens = &settings.tokens;
        let mut config = Self::new(
            tokens.access_token_minutes,
            tokens.refresh_token_minutes,
            tokens.reset_token_minutes,
        )?;

        if tokens.refresh_renewal_window_minutes < 0 || tokens.refresh_grace_minutes < 0 {
            bail!("refresh renewal window and grace must not be negative");
        }
        if tokens.refresh_grace_minutes > MAX_TTL_MINUTES {
            bail!("refresh grace must not exceed {MAX_TTL_MINUTES} minutes");
        }
        if tokens.refresh_renewal_window_minutes > tokens.refresh_token_minutes {
            bail!("refresh renewal window cannot exceed the refresh token lifetime");
        }

        config.refresh_renewal_window = Duration::minutes(tokens.refresh_renewal_window_minutes);
        config.refresh_grace = Duration::minutes(tokens.refresh_grace_minutes);
        config.max_failed_logins = settings.lockout.max_failed_logins;
        config.collaborator_timeout =
            std::time::Duration::from_secs(settings.collaborator_timeout_secs);
        config.app_url = settings.email.app_url.clone();
        Ok(config)
    }

    /// Whitelist TTL for a refresh token: its lifetime plus the grace window.
    pub fn refresh_store_ttl(&self) -> Duration {
        self.refresh_ttl + self.refresh_grace
    }
}
