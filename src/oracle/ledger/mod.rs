//! Ledger access for the oracle: trusted-oracle check, balance, and
//! submission of verified events to the EventRegistry contract.

pub mod abi;
pub mod tx;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use self::abi::{EventLookup, Log};
use self::tx::LegacyTransaction;
use crate::hash::{keccak256, to_hex_prefixed};
use crate::oracle::wallet::{parse_address, OracleWallet, WalletError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ledger RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transaction reverted: {tx_hash}")]
    Reverted { tx_hash: String },

    #[error("Transaction {tx_hash} was broadcast but not confirmed: {source}")]
    Unconfirmed {
        tx_hash: String,
        source: Box<LedgerError>,
    },

    #[error("failed to decode ledger response: {0}")]
    Decode(String),

    #[error("failed to sign transaction: {0}")]
    Signing(#[from] WalletError),
}

impl LedgerError {
    /// Hash of a transaction that reached the node, either reverted or
    /// of unknown fate
    pub fn broadcast_tx_hash(&self) -> Option<&str> {
        match self {
            LedgerError::Reverted { tx_hash } | LedgerError::Unconfirmed { tx_hash, .. } => {
                Some(tx_hash)
            }
            _ => None,
        }
    }
}

/// A verified event that landed on-chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedEvent {
    pub tx_hash: String,
    /// 0 when the receipt carried no `EventRecorded` log
    pub event_id: u64,
    pub block_number: u64,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn is_trusted_oracle(&self, address: &str) -> Result<bool, LedgerError>;

    /// Balance in wei
    async fn balance(&self, address: &str) -> Result<u128, LedgerError>;

    /// Send `recordVerifiedEvent` and wait for it to be mined.
    async fn submit_verified_event(
        &self,
        asset_id: u64,
        data_hash: &[u8; 32],
        signature: &[u8; 65],
    ) -> Result<SubmittedEvent, LedgerError>;
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    transaction_hash: Option<String>,
    status: Option<String>,
    block_number: Option<String>,
    #[serde(default)]
    logs: Vec<Log>,
}

/// JSON-RPC 2.0 client for an EVM node, signing with the oracle wallet.
pub struct EvmLedgerClient {
    http: Client,
    rpc_url: String,
    registry: [u8; 20],
    registry_hex: String,
    wallet: Arc<OracleWallet>,
    receipt_poll_interval: Duration,
    chain_id: OnceCell<u64>,
    next_id: AtomicU64,
}

impl EvmLedgerClient {
    pub fn new(
        http: Client,
        rpc_url: impl Into<String>,
        event_registry_address: &str,
        wallet: Arc<OracleWallet>,
        receipt_poll_interval: Duration,
    ) -> Result<Self, LedgerError> {
        let registry = parse_address(event_registry_address).ok_or_else(|| {
            LedgerError::Decode(format!(
                "invalid EventRegistry address {event_registry_address}"
            ))
        })?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
            registry,
            registry_hex: to_hex_prefixed(&registry),
            wallet,
            receipt_poll_interval,
            chain_id: OnceCell::new(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut response = self
            .http
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            let error: RpcErrorObject = serde_json::from_value(error.clone())
                .map_err(|e| LedgerError::Decode(format!("{method} error object: {e}")))?;
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    async fn rpc_quantity(&self, method: &str, params: Value) -> Result<u128, LedgerError> {
        let result = self.rpc_call(method, params).await?;
        parse_quantity(&result)
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        let chain_id = self
            .chain_id
            .get_or_try_init(|| async {
                let id = self.rpc_quantity("eth_chainId", json!([])).await?;
                u64::try_from(id).map_err(|_| LedgerError::Decode("chain id overflows u64".into()))
            })
            .await?;
        Ok(*chain_id)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Receipt, LedgerError> {
        loop {
            match self
                .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(Value::Null) => {}
                Ok(value) => {
                    return serde_json::from_value(value).map_err(|e| LedgerError::Unconfirmed {
                        tx_hash: tx_hash.to_string(),
                        source: Box::new(LedgerError::Decode(format!("receipt: {e}"))),
                    });
                }
                // the transaction is already broadcast; keep waiting for it
                Err(e) => {
                    warn!(tx_hash, error = %e, "receipt poll failed; retrying");
                }
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerClient for EvmLedgerClient {
    async fn is_trusted_oracle(&self, address: &str) -> Result<bool, LedgerError> {
        let oracle = parse_address(address)
            .ok_or_else(|| LedgerError::Decode(format!("invalid address {address}")))?;
        let call_data = to_hex_prefixed(&abi::encode_is_trusted_oracle(&oracle));

        let result = self
            .rpc_call(
                "eth_call",
                json!([{ "to": self.registry_hex, "data": call_data }, "latest"]),
            )
            .await?;
        let output = decode_hex_data(&result)?;
        abi::decode_bool(&output)
    }

    async fn balance(&self, address: &str) -> Result<u128, LedgerError> {
        self.rpc_quantity("eth_getBalance", json!([address, "latest"]))
            .await
    }

    async fn submit_verified_event(
        &self,
        asset_id: u64,
        data_hash: &[u8; 32],
        signature: &[u8; 65],
    ) -> Result<SubmittedEvent, LedgerError> {
        let from = to_hex_prefixed(&self.wallet.address());
        let data = abi::encode_record_verified_event(asset_id, data_hash, signature);
        let data_hex = to_hex_prefixed(&data);

        let chain_id = self.chain_id().await?;
        let nonce = self
            .rpc_quantity("eth_getTransactionCount", json!([from, "pending"]))
            .await?;
        let gas_price = self.rpc_quantity("eth_gasPrice", json!([])).await?;
        let estimated_gas = self
            .rpc_quantity(
                "eth_estimateGas",
                json!([{ "from": from, "to": self.registry_hex, "data": data_hex }]),
            )
            .await?;
        let gas_limit = estimated_gas.saturating_mul(120) / 100;

        let transaction = LegacyTransaction {
            nonce: u64::try_from(nonce).map_err(|_| LedgerError::Decode("nonce overflows u64".into()))?,
            gas_price,
            gas_limit: u64::try_from(gas_limit)
                .map_err(|_| LedgerError::Decode("gas limit overflows u64".into()))?,
            to: self.registry,
            value: 0,
            data,
            chain_id,
        };
        let raw = transaction.sign(&self.wallet)?;
        let local_hash = to_hex_prefixed(&keccak256(&raw));

        // a node rejection means nothing was broadcast; a lost response may
        // still have reached the mempool
        let sent = match self
            .rpc_call("eth_sendRawTransaction", json!([to_hex_prefixed(&raw)]))
            .await
        {
            Ok(sent) => sent,
            Err(e @ LedgerError::Rpc { .. }) => return Err(e),
            Err(e) => {
                warn!(tx_hash = %local_hash, asset_id, error = %e, "raw transaction send unconfirmed");
                return Err(LedgerError::Unconfirmed {
                    tx_hash: local_hash,
                    source: Box::new(e),
                });
            }
        };
        let tx_hash = sent.as_str().map(str::to_lowercase).unwrap_or(local_hash);
        info!(tx_hash = %tx_hash, asset_id, nonce = transaction.nonce, "verified event submitted");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        let tx_hash = receipt
            .transaction_hash
            .map(|hash| hash.to_lowercase())
            .unwrap_or(tx_hash);

        if matches!(receipt.status.as_deref().map(parse_hex_u128), Some(Ok(0))) {
            warn!(tx_hash = %tx_hash, asset_id, "verified event transaction reverted");
            return Err(LedgerError::Reverted { tx_hash });
        }

        let block_number = receipt
            .block_number
            .as_deref()
            .and_then(|raw| parse_hex_u128(raw).ok())
            .and_then(|number| u64::try_from(number).ok())
            .unwrap_or_default();

        let event_id = match abi::find_event_recorded(&receipt.logs, &self.registry_hex) {
            EventLookup::Found { event_id, .. } => event_id,
            EventLookup::NotFound => {
                warn!(tx_hash = %tx_hash, "no EventRecorded log in receipt; using event id 0");
                0
            }
        };
        debug!(tx_hash = %tx_hash, event_id, block_number, "verified event mined");

        Ok(SubmittedEvent {
            tx_hash,
            event_id,
            block_number,
        })
    }
}

/// Parse a JSON-RPC hex quantity (`"0x1a"`).
pub fn parse_quantity(value: &Value) -> Result<u128, LedgerError> {
    let raw = value
        .as_str()
        .ok_or_else(|| LedgerError::Decode(format!("expected hex quantity, got {value}")))?;
    parse_hex_u128(raw)
}

fn parse_hex_u128(raw: &str) -> Result<u128, LedgerError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::Decode(format!("quantity {raw} lacks 0x prefix")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Decode(format!("quantity {raw}: {e}")))
}

fn decode_hex_data(value: &Value) -> Result<Vec<u8>, LedgerError> {
    let raw = value
        .as_str()
        .ok_or_else(|| LedgerError::Decode(format!("expected hex data, got {value}")))?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| LedgerError::Decode(format!("hex data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_parse_from_hex() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity(&json!("0x2386f26fc10000")).unwrap(), 10_000_000_000_000_000);
        assert!(parse_quantity(&json!("12")).is_err());
        assert!(parse_quantity(&json!(12)).is_err());
    }

    #[test]
    fn broadcast_errors_expose_the_hash() {
        let error = LedgerError::Reverted {
            tx_hash: "0xabc".to_string(),
        };
        assert_eq!(error.broadcast_tx_hash(), Some("0xabc"));
        assert!(error.to_string().contains("0xabc"));

        let unconfirmed = LedgerError::Unconfirmed {
            tx_hash: "0xdef".to_string(),
            source: Box::new(LedgerError::Decode("receipt".into())),
        };
        assert_eq!(unconfirmed.broadcast_tx_hash(), Some("0xdef"));
        assert!(unconfirmed.to_string().contains("not confirmed"));
        assert_eq!(
            LedgerError::Decode("x".into()).broadcast_tx_hash(),
            None
        );
    }
}
