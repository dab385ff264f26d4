//! The worker's only path to the record store: the HTTP API, authenticated
//! with the oracle key.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::middleware::ORACLE_KEY_HEADER;
use crate::models::{
    ApiResponse, CreatedEvidence, EvidencePayload, ServiceRecord, UpdateVerificationRequest,
    VerificationRequest,
};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("record store unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rejected: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("record store error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("unexpected record store response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Worth retrying: the store was unreachable or failed internally.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport(_) => true,
            GatewayError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                GatewayError::Validation(message)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized(message),
            StatusCode::NOT_FOUND => GatewayError::NotFound(message),
            StatusCode::CONFLICT => GatewayError::Conflict(message),
            other => GatewayError::Server {
                status: other.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn fetch_pending_requests(&self) -> Result<Vec<VerificationRequest>, GatewayError>;

    async fn fetch_service_records(&self, asset_id: i64) -> Result<Vec<ServiceRecord>, GatewayError>;

    async fn update_request(
        &self,
        request_id: &str,
        update: &UpdateVerificationRequest,
    ) -> Result<(), GatewayError>;

    async fn create_evidence(&self, payload: &EvidencePayload) -> Result<CreatedEvidence, GatewayError>;
}

/// `BackendGateway` over the record store's REST API
#[derive(Clone)]
pub struct HttpGateway {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, GatewayError> {
        let response = request.header(ORACLE_KEY_HEADER, &self.api_key).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope = serde_json::from_str::<ApiResponse<T>>(&body);

        if !status.is_success() {
            let message = match envelope {
                Ok(ApiResponse {
                    error: Some(message),
                    ..
                }) => message,
                _ => serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                    .ok()
                    .and_then(|envelope| envelope.error)
                    .unwrap_or_else(|| body.trim().to_string()),
            };
            return Err(GatewayError::from_status(status, message));
        }

        match envelope {
            Ok(ApiResponse {
                success: true,
                data: Some(data),
                ..
            }) => Ok(data),
            Ok(ApiResponse { error, .. }) => Err(GatewayError::Decode(
                error.unwrap_or_else(|| "response carried no data".to_string()),
            )),
            Err(e) => Err(GatewayError::Decode(e.to_string())),
        }
    }

    async fn send_json<B, T>(&self, request: reqwest::RequestBuilder, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send(request.json(body)).await
    }
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn fetch_pending_requests(&self) -> Result<Vec<VerificationRequest>, GatewayError> {
        self.send(self.http.get(self.url("/api/verification-requests/pending")))
            .await
    }

    async fn fetch_service_records(&self, asset_id: i64) -> Result<Vec<ServiceRecord>, GatewayError> {
        self.send(self.http.get(self.url(&format!("/api/service-records/{asset_id}"))))
            .await
    }

    async fn update_request(
        &self,
        request_id: &str,
        update: &UpdateVerificationRequest,
    ) -> Result<(), GatewayError> {
        let url = self.url(&format!("/api/verification-requests/{request_id}"));
        let _updated: VerificationRequest = self.send_json(self.http.patch(url), update).await?;
        Ok(())
    }

    async fn create_evidence(&self, payload: &EvidencePayload) -> Result<CreatedEvidence, GatewayError> {
        self.send_json(self.http.post(self.url("/api/evidence")), payload)
            .await
    }
}
