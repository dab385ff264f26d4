//! The slice of Solidity ABI encoding the EventRegistry calls need

use serde::Deserialize;
use tracing::warn;

use super::LedgerError;
use crate::hash::keccak256;

pub const IS_TRUSTED_ORACLE: &str = "isTrustedOracle(address)";
pub const RECORD_VERIFIED_EVENT: &str = "recordVerifiedEvent(uint256,bytes32,bytes)";
pub const EVENT_RECORDED: &str = "EventRecorded(uint256,uint256,uint8,address,bytes32)";

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

pub fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn address_word(address: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

pub fn encode_is_trusted_oracle(oracle: &[u8; 20]) -> Vec<u8> {
    let mut data = selector(IS_TRUSTED_ORACLE).to_vec();
    data.extend_from_slice(&address_word(oracle));
    data
}

/// `recordVerifiedEvent(uint256 assetId, bytes32 dataHash, bytes signature)`
pub fn encode_record_verified_event(asset_id: u64, data_hash: &[u8; 32], signature: &[u8]) -> Vec<u8> {
    let mut data = selector(RECORD_VERIFIED_EVENT).to_vec();
    data.extend_from_slice(&uint_word(asset_id as u128));
    data.extend_from_slice(data_hash);
    // head is three words, so the dynamic tail starts at 0x60
    data.extend_from_slice(&uint_word(3 * 32));
    data.extend_from_slice(&uint_word(signature.len() as u128));
    data.extend_from_slice(signature);
    let padding = (32 - signature.len() % 32) % 32;
    data.extend(std::iter::repeat(0u8).take(padding));
    data
}

/// Decode a single `bool` return value.
pub fn decode_bool(output: &[u8]) -> Result<bool, LedgerError> {
    if output.len() < 32 {
        return Err(LedgerError::Decode(format!(
            "expected a 32-byte bool, got {} bytes",
            output.len()
        )));
    }
    let word = &output[..32];
    if word[..31].iter().any(|b| *b != 0) || word[31] > 1 {
        return Err(LedgerError::Decode("malformed bool return value".to_string()));
    }
    Ok(word[31] == 1)
}

/// A 32-byte word holding a uint that must fit in u64.
pub fn word_to_u64(word: &[u8; 32]) -> Result<u64, LedgerError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode("uint256 value exceeds u64".to_string()));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(tail))
}

pub fn parse_word(hex_word: &str) -> Result<[u8; 32], LedgerError> {
    crate::hash::parse_digest(hex_word).map_err(|e| LedgerError::Decode(e.to_string()))
}

/// A log entry as returned inside `eth_getTransactionReceipt`
#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// Result of looking for the registry's `EventRecorded` log in a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLookup {
    Found { asset_id: u64, event_id: u64 },
    NotFound,
}

/// First decodable `EventRecorded` log emitted by `registry`. Logs that
/// match the topic but cannot be decoded are skipped.
pub fn find_event_recorded(logs: &[Log], registry: &str) -> EventLookup {
    let topic0 = crate::hash::to_hex_prefixed(&event_topic(EVENT_RECORDED));

    for log in logs {
        if !log.address.eq_ignore_ascii_case(registry) {
            continue;
        }
        match log.topics.first() {
            Some(topic) if topic.eq_ignore_ascii_case(&topic0) => {}
            _ => continue,
        }
        match decode_event_ids(log) {
            Ok((asset_id, event_id)) => return EventLookup::Found { asset_id, event_id },
            Err(e) => warn!(error = %e, "skipping undecodable EventRecorded log"),
        }
    }

    EventLookup::NotFound
}

fn decode_event_ids(log: &Log) -> Result<(u64, u64), LedgerError> {
    if log.topics.len() < 3 {
        return Err(LedgerError::Decode(
            "EventRecorded log is missing indexed topics".to_string(),
        ));
    }
    let asset_id = word_to_u64(&parse_word(&log.topics[1])?)?;
    let event_id = word_to_u64(&parse_word(&log.topics[2])?)?;
    Ok((asset_id, event_id))
}
