//! HTTP client for the authority API

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use tvm_core::{Claims, ServiceId};

use crate::bridge::{PublicKeySource, TicketSource, TicketValidator};
use crate::error::{BridgeError, Result};
use crate::types::{
    ErrorBody, IssueRequest, IssuedTicket, ServiceKey, ValidateRequest, ValidateResponse,
};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for a remote authority
#[derive(Debug, Clone)]
pub struct TvmClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl TvmClient {
    /// Create a client for the authority at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(base_url, http_client))
    }

    /// Use a preconfigured `reqwest::Client`
    pub fn with_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into a `BridgeError`
    async fn read<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let bytes = response.bytes().await?;
        match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(body) => {
                debug!(status = %status, code = %body.code, "Authority rejected request");
                Err(BridgeError::from_api(&body.code, body.error))
            }
            Err(_) if status.is_server_error() => Err(BridgeError::Unavailable(format!(
                "authority returned {}",
                status
            ))),
            Err(_) => Err(BridgeError::HttpError(format!(
                "authority returned {}",
                status
            ))),
        }
    }

    /// Issue a ticket for `source` to call `target`
    pub async fn issue(&self, source: ServiceId, target: ServiceId) -> Result<IssuedTicket> {
        let response = self
            .http_client
            .post(self.url("/v1/tickets/issue"))
            .json(&IssueRequest {
                source_id: source,
                target_id: target,
            })
            .send()
            .await?;

        let issued: IssuedTicket = Self::read(response).await.map_err(|e| {
            warn!(source_id = %source, target_id = %target, error = %e, "Ticket issue failed");
            e
        })?;
        debug!(source_id = %source, target_id = %target, expires_at = issued.expires_at, "Obtained ticket");
        Ok(issued)
    }

    /// Validate a ticket remotely; sees revocation immediately
    pub async fn validate(&self, encoded: &str) -> Result<Claims> {
        let response = self
            .http_client
            .post(self.url("/v1/tickets/validate"))
            .json(&ValidateRequest { ticket: encoded })
            .send()
            .await?;

        let body: ValidateResponse = Self::read(response).await?;
        Ok(body.claims)
    }

    /// Fetch a service's current public key
    pub async fn public_key(&self, service: ServiceId) -> Result<ServiceKey> {
        let response = self
            .http_client
            .get(self.url(&format!("/v1/services/{}/public-key", service)))
            .send()
            .await?;

        Self::read(response).await
    }
}

#[async_trait]
impl TicketSource for TvmClient {
    async fn issue(&self, source: ServiceId, target: ServiceId) -> Result<IssuedTicket> {
        TvmClient::issue(self, source, target).await
    }
}

#[async_trait]
impl TicketValidator for TvmClient {
    async fn validate(&self, encoded: &str) -> Result<Claims> {
        TvmClient::validate(self, encoded).await
    }
}

#[async_trait]
impl PublicKeySource for TvmClient {
    async fn public_key(&self, service: ServiceId) -> Result<ServiceKey> {
        TvmClient::public_key(self, service).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = TvmClient::with_client("http://tvm.internal:8080/", reqwest::Client::new());
        assert_eq!(client.base_url(), "http://tvm.internal:8080");
        assert_eq!(
            client.url("/v1/tickets/issue"),
            "http://tvm.internal:8080/v1/tickets/issue"
        );
    }
}
