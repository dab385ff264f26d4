//! Authentication for the record store API.
//!
//! Two credentials are accepted:
//! - wallet users present an HS256 bearer token issued by the login flow
//! - the oracle worker presents the shared `X-Oracle-Key` secret

mod jwt;

pub use jwt::{generate_access_token, verify_token, Claims};

/// Who is making a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Lowercased wallet address from a bearer token
    Wallet(String),
    Oracle,
}

impl Caller {
    pub fn wallet(address: &str) -> Self {
        Caller::Wallet(address.to_lowercase())
    }
}
