use super::{ConfigError, Lookup};
use crate::models::is_address;

/// AssetPassport NFT deployed on Sepolia
pub const DEFAULT_ASSET_PASSPORT_ADDRESS: &str = "0xE515A68227b1471C61c6b012eB0d450c08392d36";
/// EventRegistry deployed on Sepolia
pub const DEFAULT_EVENT_REGISTRY_ADDRESS: &str = "0x2d389a0fc6A3d86eF3C94FaCf2F252EDfB3265e9";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractsConfig {
    pub asset_passport_address: String,
    pub event_registry_address: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            asset_passport_address: DEFAULT_ASSET_PASSPORT_ADDRESS.to_string(),
            event_registry_address: DEFAULT_EVENT_REGISTRY_ADDRESS.to_string(),
        }
    }
}

impl ContractsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&super::env_lookup)
    }

    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            asset_passport_address: address(
                lookup,
                "ASSET_PASSPORT_ADDRESS",
                DEFAULT_ASSET_PASSPORT_ADDRESS,
            )?,
            event_registry_address: address(
                lookup,
                "EVENT_REGISTRY_ADDRESS",
                DEFAULT_EVENT_REGISTRY_ADDRESS,
            )?,
        })
    }
}

fn address(lookup: &Lookup<'_>, key: &'static str, default: &str) -> Result<String, ConfigError> {
    let value = match lookup(key) {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => return Ok(default.to_string()),
    };
    if !is_address(&value) {
        return Err(ConfigError::invalid(key, "expected 0x followed by 40 hex characters"));
    }
    Ok(value)
}
