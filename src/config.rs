//! Configuration management for the ledger client
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::{ClientError, ClientResult};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable pointing at the configuration file
pub const CONFIG_ENV_VAR: &str = "LEDGER_CLIENT_CONFIG";

/// Default environment variable holding the hex private key
pub const DEFAULT_PRIVATE_KEY_ENV: &str = "LEDGER_PRIVATE_KEY";

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern is valid");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// First URL is primary, the rest are read failovers
    pub urls: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GasConfig {
    /// Percentage added on top of the estimated gas limit
    #[serde(default)]
    pub limit_buffer_percent: u64,
    /// Percentage added on top of the suggested gas price
    #[serde(default)]
    pub price_buffer_percent: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default)]
    pub max_interval_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_private_key_env() -> String {
    DEFAULT_PRIVATE_KEY_ENV.to_string()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_max_attempts() -> u32 {
    31
}

fn default_backoff_factor() -> f64 {
    1.0
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff_factor: default_backoff_factor(),
            max_interval_ms: None,
            timeout_secs: None,
        }
    }
}

impl Settings {
    /// Load settings from the file named by `LEDGER_CLIENT_CONFIG`
    pub fn load() -> ClientResult<Self> {
        let config_path = env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&config_str)
    }

    /// Parse settings from a TOML string
    pub fn from_toml(input: &str) -> ClientResult<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings = toml::from_str(&config_str)
            .map_err(|e| ClientError::Config(format!("Failed to parse configuration: {}", e)))?;

        settings.validate()?;

        Ok(settings)
    }

    /// Settings for a single endpoint with every other value defaulted
    pub fn for_endpoint(endpoint: &str) -> Self {
        Self {
            rpc: RpcConfig {
                urls: vec![endpoint.to_string()],
                request_timeout_secs: default_request_timeout_secs(),
            },
            wallet: WalletConfig::default(),
            gas: GasConfig::default(),
            confirmation: ConfirmationConfig::default(),
        }
    }

    /// Validate configuration
    fn validate(&self) -> ClientResult<()> {
        if self.rpc.urls.is_empty() {
            return Err(ClientError::Config("No RPC URLs configured".to_string()));
        }
        if self.rpc.urls.iter().any(|u| u.trim().is_empty()) {
            return Err(ClientError::Config("RPC URL must not be empty".to_string()));
        }
        if self.confirmation.max_attempts == 0 {
            return Err(ClientError::Config(
                "confirmation.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.confirmation.poll_interval_ms == 0 {
            return Err(ClientError::Config(
                "confirmation.poll_interval_ms must be positive".to_string(),
            ));
        }
        if !(self.confirmation.backoff_factor >= 1.0) {
            return Err(ClientError::Config(
                "confirmation.backoff_factor must be >= 1.0".to_string(),
            ));
        }
        if self.wallet.private_key_env.is_empty() {
            tracing::warn!("wallet.private_key_env is empty - signing will be unavailable");
        }

        Ok(())
    }

    /// Primary RPC endpoint
    pub fn endpoint(&self) -> &str {
        &self.rpc.urls[0]
    }

    /// Read the hex private key from the configured environment variable
    pub fn private_key(&self) -> ClientResult<String> {
        env::var(&self.wallet.private_key_env).map_err(|_| {
            ClientError::Config(format!(
                "No wallet configured. Set {} to a hex private key",
                self.wallet.private_key_env
            ))
        })
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
