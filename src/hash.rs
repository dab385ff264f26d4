//! Canonical hashing of JSON-like data.
//!
//! Digests produced here are compared against digests computed by the
//! frontend and committed on-chain, so the encoding has to match
//! `JSON.stringify` over recursively key-sorted input byte for byte.

use serde::Serialize;
use serde_json::{Number, Value};
use sha3::{Digest, Keccak256};
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("failed to serialize value for hashing: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid digest `{0}`: expected 0x followed by 64 hex characters")]
    InvalidDigest(String),
}

/// keccak-256 of raw bytes.
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    Keccak256::digest(bytes).into()
}

pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Hash any serializable value with the canonical encoding.
pub fn calculate_hash<T: Serialize + ?Sized>(data: &T) -> Result<String, HashError> {
    let value = serde_json::to_value(data)?;
    Ok(hash_value(&value))
}

/// Hash an already-built JSON value.
pub fn hash_value(value: &Value) -> String {
    let canonical = canonical_json(value);
    to_hex_prefixed(&keccak256(canonical.as_bytes()))
}

/// Recompute the digest of `data` and compare it with `expected`, ignoring
/// hex case. Serialization failures count as a mismatch.
pub fn verify_hash<T: Serialize + ?Sized>(data: &T, expected: &str) -> bool {
    match calculate_hash(data) {
        Ok(calculated) => calculated.eq_ignore_ascii_case(expected.trim()),
        Err(_) => false,
    }
}

/// True for `0x` followed by exactly 64 hex digits.
pub fn is_digest(candidate: &str) -> bool {
    candidate.len() == 66
        && candidate.starts_with("0x")
        && candidate[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn parse_digest(candidate: &str) -> Result<[u8; 32], HashError> {
    if !is_digest(candidate) {
        return Err(HashError::InvalidDigest(candidate.to_string()));
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(&candidate[2..], &mut out)
        .map_err(|_| HashError::InvalidDigest(candidate.to_string()))?;
    Ok(out)
}

/// Compact JSON with every object's keys sorted.
///
/// Keys are ordered by UTF-16 code units, which is how JavaScript's
/// `Array.prototype.sort` orders them.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => write_number(number, out),
        Value::String(text) => write_string(text, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn write_number(number: &Number, out: &mut String) {
    if let Some(int) = number.as_i64() {
        let _ = write!(out, "{int}");
        return;
    }
    if let Some(uint) = number.as_u64() {
        let _ = write!(out, "{uint}");
        return;
    }

    let float = number.as_f64().unwrap_or(0.0);
    if float == 0.0 {
        // JSON.stringify(-0) is "0"
        out.push('0');
        return;
    }

    let magnitude = float.abs();
    if (1e-6..1e21).contains(&magnitude) {
        // Display never uses an exponent and prints the shortest
        // round-trip digits, which is what JavaScript does in this range.
        let _ = write!(out, "{float}");
    } else {
        let formatted = format!("{float:e}");
        match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                let _ = write!(out, "{mantissa}e+{exponent}");
            }
            _ => out.push_str(&formatted),
        }
    }
}

fn write_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
