mod common;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use common::*;
use veripass_server::config::contracts::DEFAULT_EVENT_REGISTRY_ADDRESS;
use veripass_server::hash::{keccak256, to_hex_prefixed};
use veripass_server::oracle::ledger::abi::{
    encode_record_verified_event, event_topic, selector, uint_word, EVENT_RECORDED,
    IS_TRUSTED_ORACLE,
};
use veripass_server::oracle::{EvmLedgerClient, LedgerClient, LedgerError, OracleWallet};

const SENT_TX: &str = "0xABCDEF0000000000000000000000000000000000000000000000000000000001";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Mined,
    Reverted,
    EstimateFails,
    SendUnavailable,
    ReceiptErrors,
}

struct FakeNode {
    mode: Mode,
    calls: Mutex<Vec<String>>,
    raw_transactions: Mutex<Vec<String>>,
    receipt_polls: Mutex<u32>,
}

impl FakeNode {
    fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| called.as_str() == method)
            .count()
    }
}

fn word_hex(value: u128) -> String {
    to_hex_prefixed(&uint_word(value))
}

async fn rpc(State(node): State<Arc<FakeNode>>, Json(call): Json<Value>) -> Response {
    let id = call["id"].clone();
    let method = call["method"].as_str().unwrap_or_default().to_string();
    node.calls.lock().unwrap().push(method.clone());

    let result = match method.as_str() {
        "eth_chainId" => json!("0xaa36a7"),
        "eth_call" => {
            let data = call["params"][0]["data"].as_str().unwrap_or_default();
            let expected = to_hex_prefixed(&selector(IS_TRUSTED_ORACLE));
            let trusted = data.starts_with(&expected)
                && data.ends_with(&ORACLE_ADDRESS[2..].to_lowercase());
            json!(word_hex(trusted as u128))
        }
        "eth_getBalance" => json!("0x2386f26fc10000"),
        "eth_getTransactionCount" => json!("0x5"),
        "eth_gasPrice" => json!("0x3b9aca00"),
        "eth_estimateGas" if node.mode == Mode::EstimateFails => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32000, "message": "execution reverted: untrusted oracle" }
            }))
            .into_response();
        }
        "eth_estimateGas" => json!("0x186a0"),
        "eth_sendRawTransaction" => {
            let raw = call["params"][0].as_str().unwrap_or_default().to_string();
            node.raw_transactions.lock().unwrap().push(raw);
            if node.mode == Mode::SendUnavailable {
                return (StatusCode::SERVICE_UNAVAILABLE, "upstream unavailable").into_response();
            }
            json!(SENT_TX)
        }
        "eth_getTransactionReceipt" => {
            let mut polls = node.receipt_polls.lock().unwrap();
            *polls += 1;
            if *polls % 2 == 1 && node.mode == Mode::ReceiptErrors {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32000, "message": "header not found" }
                }))
                .into_response();
            } else if *polls % 2 == 1 {
                Value::Null
            } else {
                let status = if node.mode == Mode::Reverted { "0x0" } else { "0x1" };
                json!({
                    "transactionHash": SENT_TX,
                    "status": status,
                    "blockNumber": "0x10",
                    "logs": [{
                        "address": DEFAULT_EVENT_REGISTRY_ADDRESS.to_lowercase(),
                        "topics": [
                            to_hex_prefixed(&event_topic(EVENT_RECORDED)),
                            word_hex(12),
                            word_hex(7),
                        ],
                        "data": "0x"
                    }]
                })
            }
        }
        _ => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "method not found" }
            }))
            .into_response();
        }
    };

    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
}

async fn start_node(mode: Mode) -> (Arc<FakeNode>, SocketAddr) {
    let node = Arc::new(FakeNode {
        mode,
        calls: Mutex::new(Vec::new()),
        raw_transactions: Mutex::new(Vec::new()),
        receipt_polls: Mutex::new(0),
    });
    let app = Router::new().route("/", post(rpc)).with_state(node.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (node, addr)
}

fn client(addr: SocketAddr) -> EvmLedgerClient {
    let wallet = Arc::new(OracleWallet::from_hex(ORACLE_PRIVATE_KEY).unwrap());
    EvmLedgerClient::new(
        reqwest::Client::new(),
        format!("http://{addr}"),
        DEFAULT_EVENT_REGISTRY_ADDRESS,
        wallet,
        Duration::from_millis(5),
    )
    .unwrap()
}

#[tokio::test]
async fn reads_registration_and_balance() {
    let (_node, addr) = start_node(Mode::Mined).await;
    let ledger = client(addr);

    assert!(ledger.is_trusted_oracle(ORACLE_ADDRESS).await.unwrap());
    assert!(!ledger
        .is_trusted_oracle("0x0000000000000000000000000000000000000001")
        .await
        .unwrap());
    assert_eq!(ledger.balance(ORACLE_ADDRESS).await.unwrap(), 10_000_000_000_000_000);
}

#[tokio::test]
async fn submits_and_decodes_the_recorded_event() {
    let (node, addr) = start_node(Mode::Mined).await;
    let ledger = client(addr);
    let data_hash = [0x33u8; 32];
    let signature = [0x44u8; 65];

    let submitted = ledger
        .submit_verified_event(12, &data_hash, &signature)
        .await
        .unwrap();
    assert_eq!(submitted.tx_hash, SENT_TX.to_lowercase());
    assert_eq!(submitted.event_id, 7);
    assert_eq!(submitted.block_number, 16);

    let raw = node.raw_transactions.lock().unwrap()[0].clone();
    let calldata = hex::encode(encode_record_verified_event(12, &data_hash, &signature));
    assert!(raw.starts_with("0x"));
    assert!(raw.contains(&calldata));

    ledger
        .submit_verified_event(12, &data_hash, &signature)
        .await
        .unwrap();
    assert_eq!(node.count("eth_chainId"), 1);
    assert_eq!(node.count("eth_sendRawTransaction"), 2);
    assert!(node.count("eth_getTransactionReceipt") >= 4);
}

#[tokio::test]
async fn reverted_receipts_carry_the_transaction_hash() {
    let (_node, addr) = start_node(Mode::Reverted).await;
    let ledger = client(addr);

    let error = ledger
        .submit_verified_event(12, &[0x33; 32], &[0x44; 65])
        .await
        .unwrap_err();
    assert_eq!(error.broadcast_tx_hash(), Some(SENT_TX.to_lowercase().as_str()));
    assert!(error.to_string().starts_with("Transaction reverted"));
}

#[tokio::test]
async fn rpc_errors_stop_before_sending() {
    let (node, addr) = start_node(Mode::EstimateFails).await;
    let ledger = client(addr);

    let error = ledger
        .submit_verified_event(12, &[0x33; 32], &[0x44; 65])
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        LedgerError::Rpc { code: -32000, ref message } if message.contains("untrusted oracle")
    ));
    assert_eq!(node.count("eth_sendRawTransaction"), 0);
}

#[tokio::test]
async fn lost_send_responses_keep_the_local_hash() {
    let (node, addr) = start_node(Mode::SendUnavailable).await;
    let ledger = client(addr);

    let error = ledger
        .submit_verified_event(12, &[0x33; 32], &[0x44; 65])
        .await
        .unwrap_err();
    let raw = node.raw_transactions.lock().unwrap()[0].clone();
    let local_hash = to_hex_prefixed(&keccak256(&hex::decode(&raw[2..]).unwrap()));

    assert!(matches!(error, LedgerError::Unconfirmed { .. }));
    assert_eq!(error.broadcast_tx_hash(), Some(local_hash.as_str()));
    assert_eq!(node.count("eth_getTransactionReceipt"), 0);
}

#[tokio::test]
async fn receipt_rpc_errors_are_polled_through() {
    let (node, addr) = start_node(Mode::ReceiptErrors).await;
    let ledger = client(addr);

    let submitted = ledger
        .submit_verified_event(12, &[0x33; 32], &[0x44; 65])
        .await
        .unwrap();
    assert_eq!(submitted.tx_hash, SENT_TX.to_lowercase());
    assert_eq!(submitted.event_id, 7);
    assert_eq!(node.count("eth_getTransactionReceipt"), 2);
}

#[test]
fn rejects_an_invalid_registry_address() {
    let wallet = Arc::new(OracleWallet::from_hex(ORACLE_PRIVATE_KEY).unwrap());
    let result = EvmLedgerClient::new(
        reqwest::Client::new(),
        "http://127.0.0.1:8545",
        "0x1234",
        wallet,
        Duration::from_millis(5),
    );
    assert!(matches!(result, Err(LedgerError::Decode(_))));
}
