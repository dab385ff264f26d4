//! Data models for the VeriPass record store and oracle

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::ValidationError;

pub mod asset;
pub mod evidence;
pub mod service_record;
pub mod verification;

pub use asset::*;
pub use evidence::*;
pub use service_record::*;
pub use verification::*;

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Result of an idempotent create: either a new row or the one that
/// already satisfied the request.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert<T> {
    Created(T),
    Existing(T),
}

impl<T> Upsert<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Upsert::Created(value) | Upsert::Existing(value) => value,
        }
    }

    pub fn get(&self) -> &T {
        match self {
            Upsert::Created(value) | Upsert::Existing(value) => value,
        }
    }
}

/// Pagination parameters
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PaginationParams {
    /// (limit, offset) with page >= 1 and limit clamped to 1..=100.
    pub fn limit_offset(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(20).clamp(1, 100);
        (limit, (page - 1) * limit)
    }
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

/// Calendar date in `YYYY-MM-DD` form.
pub(crate) fn validate_date(value: &str) -> Result<(), ValidationError> {
    if value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        Ok(())
    } else {
        Err(validation_error("date", "must be a valid YYYY-MM-DD date"))
    }
}

pub(crate) fn validate_digest(value: &str) -> Result<(), ValidationError> {
    if crate::hash::is_digest(value) {
        Ok(())
    } else {
        Err(validation_error("digest", "must be 0x followed by 64 hex characters"))
    }
}

pub(crate) fn validate_urls(urls: &[String]) -> Result<(), ValidationError> {
    if urls.iter().all(|url| is_http_url(url)) {
        Ok(())
    } else {
        Err(validation_error("url", "must be http(s) URLs"))
    }
}

pub(crate) fn is_http_url(candidate: &str) -> bool {
    let rest = candidate
        .strip_prefix("https://")
        .or_else(|| candidate.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.contains(char::is_whitespace))
}

/// `0x` followed by 40 hex digits.
pub fn is_address(candidate: &str) -> bool {
    candidate.len() == 42
        && candidate.starts_with("0x")
        && candidate[2..].bytes().all(|b| b.is_ascii_hexdigit())
}
