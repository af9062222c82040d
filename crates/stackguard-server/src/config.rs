//! YAML configuration loading.
//!
//! Loads [`ServiceConfig`] from a YAML file on disk, falling back to defaults
//! when no file is specified.

use std::path::{Path, PathBuf};

use stackguard_core::ServiceConfig;
use tracing::info;

/// Environment variable consulted when no `--config` flag is given.
pub const CONFIG_ENV: &str = "STACKGUARD_CONFIG";

/// Load a [`ServiceConfig`] from a YAML file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the YAML is invalid, or the
/// resulting configuration fails [`validate_config`].
pub fn load_config(path: &Path) -> anyhow::Result<ServiceConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
    let config: ServiceConfig = serde_yaml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {}", e))?;
    validate_config(&config)?;
    Ok(config)
}

/// Resolve the configuration to use.
///
/// Checks (in order):
/// 1. explicit path (the `--config` flag)
/// 2. `STACKGUARD_CONFIG` environment variable (`env_path`)
/// 3. built-in defaults
pub fn resolve_config(
    explicit: Option<PathBuf>,
    env_path: Option<PathBuf>,
) -> anyhow::Result<ServiceConfig> {
    match explicit.or(env_path) {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration from file");
            load_config(&path)
        }
        None => {
            info!("No config file specified, using defaults");
            Ok(ServiceConfig::default())
        }
    }
}

/// Reject settings that would only fail later at startup.
pub fn validate_config(config: &ServiceConfig) -> anyhow::Result<()> {
    if config.listen_addr.parse::<std::net::SocketAddr>().is_err() {
        anyhow::bail!("Invalid listen_addr '{}'", config.listen_addr);
    }
    if !matches!(config.logging.format.as_str(), "text" | "json") {
        anyhow::bail!(
            "Invalid logging.format '{}', expected 'text' or 'json'",
            config.logging.format
        );
    }
    if let Some(patterns) = &config.guardrail.patterns {
        if patterns.is_empty() {
            anyhow::bail!("guardrail.patterns must not be empty when set");
        }
    }
    Ok(())
}
