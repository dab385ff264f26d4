//! Environment configuration for the API server and the oracle worker.
//!
//! Both binaries call `dotenvy::dotenv()` first and then build their config
//! from the process environment. The `from_lookup` constructors take any
//! key lookup so configs can be built from a plain map in tests.

use std::time::Duration;
use thiserror::Error;

pub mod contracts;

pub use contracts::ContractsConfig;

pub type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_STALE_PROCESSING_SECS: u64 = 900;
/// 0.01 ETH
pub const DEFAULT_MIN_BALANCE_WEI: u128 = 10_000_000_000_000_000;
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn optional(lookup: &Lookup<'_>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(lookup: &Lookup<'_>, key: &'static str) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or(ConfigError::Missing(key))
}

fn parsed<T>(lookup: &Lookup<'_>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string())),
        None => Ok(default),
    }
}

fn secret(lookup: &Lookup<'_>, key: &'static str) -> Result<String, ConfigError> {
    let value = required(lookup, key)?;
    if value.len() < MIN_SECRET_LEN {
        return Err(ConfigError::invalid(
            key,
            format!("must be at least {MIN_SECRET_LEN} characters"),
        ));
    }
    Ok(value)
}

/// Record store API settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub oracle_api_key: String,
    pub cors_origins: Vec<String>,
    pub stale_processing_after: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self, ConfigError> {
        let cors_origins = optional(lookup, "FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let stale_secs = parsed(lookup, "STALE_PROCESSING_SECS", DEFAULT_STALE_PROCESSING_SECS)?;
        if stale_secs == 0 {
            return Err(ConfigError::invalid("STALE_PROCESSING_SECS", "must be greater than 0"));
        }

        Ok(Self {
            host: optional(lookup, "HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parsed(lookup, "PORT", DEFAULT_PORT)?,
            database_url: optional(lookup, "DATABASE_URL")
                .unwrap_or_else(|| "sqlite://veripass.db".to_string()),
            jwt_secret: secret(lookup, "JWT_SECRET")?,
            oracle_api_key: secret(lookup, "ORACLE_API_KEY")?,
            cors_origins,
            stale_processing_after: Duration::from_secs(stale_secs),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Oracle worker settings
#[derive(Clone)]
pub struct OracleConfig {
    pub rpc_url: String,
    pub private_key: String,
    pub poll_interval: Duration,
    pub backend_url: String,
    pub oracle_api_key: String,
    pub min_balance_wei: u128,
    pub receipt_poll_interval: Duration,
    pub contracts: ContractsConfig,
}

impl std::fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConfig")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("poll_interval", &self.poll_interval)
            .field("backend_url", &self.backend_url)
            .field("min_balance_wei", &self.min_balance_wei)
            .field("receipt_poll_interval", &self.receipt_poll_interval)
            .field("contracts", &self.contracts)
            .finish_non_exhaustive()
    }
}

impl OracleConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self, ConfigError> {
        let rpc_url = optional(lookup, "LEDGER_RPC_URL")
            .or_else(|| optional(lookup, "SEPOLIA_RPC_URL"))
            .ok_or(ConfigError::Missing("LEDGER_RPC_URL"))?;

        let private_key = required(lookup, "ORACLE_PRIVATE_KEY")?;
        let key_hex = private_key.strip_prefix("0x").unwrap_or_default();
        if key_hex.len() != 64 || !key_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ConfigError::invalid(
                "ORACLE_PRIVATE_KEY",
                "expected 0x followed by 64 hex characters",
            ));
        }

        let poll_ms = parsed(lookup, "POLL_INTERVAL", DEFAULT_POLL_INTERVAL_MS)?;
        if poll_ms == 0 {
            return Err(ConfigError::invalid("POLL_INTERVAL", "must be greater than 0"));
        }
        let receipt_ms = parsed(
            lookup,
            "RECEIPT_POLL_INTERVAL_MS",
            DEFAULT_RECEIPT_POLL_INTERVAL_MS,
        )?;
        if receipt_ms == 0 {
            return Err(ConfigError::invalid("RECEIPT_POLL_INTERVAL_MS", "must be greater than 0"));
        }

        let backend_url = match optional(lookup, "BACKEND_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let port: u16 = parsed(lookup, "PORT", DEFAULT_PORT)?;
                format!("http://localhost:{port}")
            }
        };

        Ok(Self {
            rpc_url,
            private_key,
            poll_interval: Duration::from_millis(poll_ms),
            backend_url,
            oracle_api_key: secret(lookup, "ORACLE_API_KEY")?,
            min_balance_wei: parsed(lookup, "MIN_BALANCE_WEI", DEFAULT_MIN_BALANCE_WEI)?,
            receipt_poll_interval: Duration::from_millis(receipt_ms),
            contracts: ContractsConfig::from_lookup(lookup)?,
        })
    }
}
