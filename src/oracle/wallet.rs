//! The oracle's secp256k1 key: address derivation, EIP-191 digest signing
//! and raw prehash signing for transactions.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use thiserror::Error;

use crate::hash::keccak256;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid oracle private key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// A signature over a 32-byte prehash with its recovery id (0 or 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

pub struct OracleWallet {
    signing_key: SigningKey,
    address: [u8; 20],
}

impl std::fmt::Debug for OracleWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleWallet")
            .field("address", &self.checksum_address())
            .finish_non_exhaustive()
    }
}

impl OracleWallet {
    /// Parse a `0x`-prefixed (or bare) 64 hex character private key.
    pub fn from_hex(private_key: &str) -> Result<Self, WalletError> {
        let trimmed = private_key.trim();
        let key_hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(key_hex).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(WalletError::InvalidKey("expected 32 bytes".to_string()));
        }
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let address = address_of(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            address,
        })
    }

    pub fn address(&self) -> [u8; 20] {
        self.address
    }

    /// EIP-55 mixed-case address
    pub fn checksum_address(&self) -> String {
        to_checksum_address(&self.address)
    }

    /// Sign a raw 32-byte hash.
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<RecoverableSignature, WalletError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| WalletError::Signing(e.to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        })
    }

    /// EIP-191 personal-sign of a 32-byte digest: `r || s || v` with
    /// v in {27, 28}.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 65], WalletError> {
        let signature = self.sign_prehash(&personal_message_hash(digest))?;
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&signature.r);
        out[32..64].copy_from_slice(&signature.s);
        out[64] = 27 + signature.recovery_id;
        Ok(out)
    }
}

/// `keccak256("\x19Ethereum Signed Message:\n32" || digest)`
pub fn personal_message_hash(digest: &[u8; 32]) -> [u8; 32] {
    let mut message = Vec::with_capacity(28 + 32);
    message.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
    message.extend_from_slice(digest);
    keccak256(&message)
}

pub fn address_of(verifying_key: &VerifyingKey) -> [u8; 20] {
    let point = verifying_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Recover the signer address of a prehash signature.
pub fn recover_prehash_signer(
    prehash: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<[u8; 20], WalletError> {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&signature.r);
    bytes[32..].copy_from_slice(&signature.s);
    let parsed =
        Signature::from_slice(&bytes).map_err(|e| WalletError::InvalidSignature(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(signature.recovery_id)
        .ok_or_else(|| WalletError::InvalidSignature("recovery id out of range".to_string()))?;
    let key = VerifyingKey::recover_from_prehash(prehash, &parsed, recovery_id)
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&key))
}

/// Recover the signer of an EIP-191 signature produced by `sign_digest`.
pub fn recover_digest_signer(
    digest: &[u8; 32],
    signature: &[u8; 65],
) -> Result<[u8; 20], WalletError> {
    let v = signature[64];
    if v != 27 && v != 28 {
        return Err(WalletError::InvalidSignature(format!("unexpected v {v}")));
    }
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&signature[..32]);
    s.copy_from_slice(&signature[32..64]);
    recover_prehash_signer(
        &personal_message_hash(digest),
        &RecoverableSignature {
            r,
            s,
            recovery_id: v - 27,
        },
    )
}

pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (index, ch) in lower.chars().enumerate() {
        let nibble = (hash[index / 2] >> (if index % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Parse a `0x` + 40 hex address in any case.
pub fn parse_address(candidate: &str) -> Option<[u8; 20]> {
    if !crate::models::is_address(candidate) {
        return None;
    }
    let mut out = [0u8; 20];
    hex::decode_to_slice(&candidate[2..], &mut out).ok()?;
    Some(out)
}
