//! Credential lifecycle core
//!
//! Mints, rotates, validates and revokes access, refresh and password-reset
//! tokens, and enforces a per-account failed-login lockout.
//!
//! - [`store`]: TTL-aware credential store (in-memory and Redis)
//! - [`services::SessionService`]: login, logout, refresh and password reset flows
//! - [`directory`] and [`services::Notifier`]: external collaborator seams
//!
//! Token encoding lives in the `crypto-core` library.

pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod security;
pub mod services;
pub mod store;
pub mod telemetry;

pub use error::{CredentialError, ErrorClass, Flow, Result};
pub use services::{build_session_service, SessionService};
