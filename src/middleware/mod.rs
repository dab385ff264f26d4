//! Request extractors for the two API credentials.
//!
//! Handlers take one of these as an argument instead of reading headers:
//! - `AuthenticatedUser` requires a valid bearer token
//! - `OracleKey` requires the `X-Oracle-Key` secret
//! - `AuthenticatedCaller` accepts either

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::app_state::AuthConfig;
use crate::auth::{verify_token, Caller};
use crate::error::AppError;

pub const ORACLE_KEY_HEADER: &str = "x-oracle-key";

/// Wallet user from a bearer token; holds the lowercased address
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

/// Marker for requests carrying the oracle credential
#[derive(Debug, Clone, Copy)]
pub struct OracleKey;

#[derive(Debug, Clone)]
pub struct AuthenticatedCaller(pub Caller);

fn keys_match(presented: &[u8], expected: &[u8]) -> bool {
    presented.len() == expected.len()
        && presented
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn oracle_key_present(parts: &Parts, auth: &AuthConfig) -> Option<bool> {
    parts
        .headers
        .get(ORACLE_KEY_HEADER)
        .map(|value| keys_match(value.as_bytes(), auth.oracle_api_key.as_bytes()))
}

async fn bearer_user(parts: &mut Parts, auth: &AuthConfig) -> Result<String, AppError> {
    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|_| AppError::unauthorized("Access token required"))?;

    let claims = verify_token(bearer.token(), &auth.jwt_secret)?;
    Ok(claims.sub)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthConfig::from_ref(state);
        bearer_user(parts, &auth).await.map(AuthenticatedUser)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OracleKey
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthConfig::from_ref(state);
        match oracle_key_present(parts, &auth) {
            Some(true) => Ok(OracleKey),
            _ => Err(AppError::unauthorized("Invalid oracle credentials")),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedCaller
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    /// An oracle key header, when present, must be valid; otherwise a
    /// bearer token is required.
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthConfig::from_ref(state);
        match oracle_key_present(parts, &auth) {
            Some(true) => Ok(AuthenticatedCaller(Caller::Oracle)),
            Some(false) => Err(AppError::unauthorized("Invalid oracle credentials")),
            None => bearer_user(parts, &auth)
                .await
                .map(|address| AuthenticatedCaller(Caller::wallet(&address))),
        }
    }
}
