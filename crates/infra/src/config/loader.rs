//! Configuration loader
//!
//! Loads the integration settings from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `TAXBRIDGE_SETTINGS_NAME`: Name of the settings record
//! - `TAXBRIDGE_COMPANY`: Company the integration submits for
//! - `TAXBRIDGE_SERVER_URL`: Fiscal service API base URL
//! - `TAXBRIDGE_AUTH_SERVER_URL`: Auth server base URL
//! - `TAXBRIDGE_USERNAME` / `TAXBRIDGE_PASSWORD`: Password-grant identity
//! - `TAXBRIDGE_CLIENT_ID` / `TAXBRIDGE_CLIENT_SECRET`: Client credentials
//! - `TAXBRIDGE_WORKSTATION_ID`: Optional workstation header value
//! - `TAXBRIDGE_SANDBOX`: Whether this is a sandbox environment (true/false)

use std::path::{Path, PathBuf};

use taxbridge_domain::{IntegrationSettings, Result, TaxBridgeError};

/// Load settings with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `TaxBridgeError::Config` if configuration cannot be loaded
/// from either source.
pub fn load() -> Result<IntegrationSettings> {
    match load_from_env() {
        Ok(settings) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(settings)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load settings from environment variables
///
/// # Errors
/// Returns `TaxBridgeError::Config` if required variables are missing.
pub fn load_from_env() -> Result<IntegrationSettings> {
    let settings = IntegrationSettings {
        name: env_var("TAXBRIDGE_SETTINGS_NAME")?,
        company: env_var("TAXBRIDGE_COMPANY")?,
        server_url: env_var("TAXBRIDGE_SERVER_URL")?,
        auth_server_url: env_var("TAXBRIDGE_AUTH_SERVER_URL")?,
        username: env_var("TAXBRIDGE_USERNAME")?,
        password: env_var("TAXBRIDGE_PASSWORD")?,
        client_id: env_var("TAXBRIDGE_CLIENT_ID")?,
        client_secret: env_var("TAXBRIDGE_CLIENT_SECRET")?,
        workstation_id: std::env::var("TAXBRIDGE_WORKSTATION_ID").ok(),
        sandbox: env_bool("TAXBRIDGE_SANDBOX", true),
        ..Default::default()
    };
    Ok(settings)
}

/// Load settings from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `TaxBridgeError::Config` if the file cannot be found or
/// parsed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<IntegrationSettings> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TaxBridgeError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TaxBridgeError::Config("no config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TaxBridgeError::Config(format!("failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<IntegrationSettings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TaxBridgeError::Config(format!("invalid TOML config: {e}"))),
        _ => serde_json::from_str(contents)
            .map_err(|e| TaxBridgeError::Config(format!("invalid JSON config: {e}"))),
    }
}

fn probe_config_paths() -> Option<PathBuf> {
    let candidates = [
        "taxbridge.toml",
        "taxbridge.json",
        "config.toml",
        "config.json",
    ];

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| TaxBridgeError::Config(format!("missing environment variable {name}")))
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}
