//! Structured logging setup

use tracing_subscriber::EnvFilter;

/// Install a JSON `tracing` subscriber filtered by `RUST_LOG`.
///
/// Defaults to `<service>=info,info`. Returns an error if a global
/// subscriber is already set.
pub fn init_tracing(service_name: &str) -> anyhow::Result<()> {
    let default_filter = format!("{}=info,info", service_name.replace('-', "_"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
