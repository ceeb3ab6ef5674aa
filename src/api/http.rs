//! HTTP implementation of [`AnalysisApi`] using reqwest.

use super::{
    AnalysisApi, AuditStarted, AuditStatus, ContractCreated, FetchContractRequest,
    StartAuditRequest, StatusBody,
};
use crate::config::ApiConfig;
use crate::contract::{ContractAddress, Network, SourceBundle};
use crate::error::ApiError;
use crate::models::{AnalysisResult, AuditId, ContractId, ExportFormat};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Analysis backend reached over HTTP.
pub struct HttpAnalysisApi {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    client: Client,
}

impl HttpAnalysisApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("contract-sentry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: normalize_base_url(&config.base_url),
            token: config.token.clone().filter(|t| !t.is_empty()),
            timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach auth, send, and turn non-2xx replies into [`ApiError::Backend`].
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Backend {
            status: status.as_u16(),
            reason: backend_reason(status, &body),
        })
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, ApiError> {
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.timeout)
            } else {
                ApiError::Malformed(e.to_string())
            }
        })
    }

    fn map_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else if e.is_connect() {
            ApiError::Connect(self.base_url.clone())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl AnalysisApi for HttpAnalysisApi {
    async fn fetch_contract(
        &self,
        address: &ContractAddress,
        network: Network,
    ) -> Result<ContractId, ApiError> {
        let body = FetchContractRequest {
            address: address.to_string(),
            network: network.identifier().to_string(),
        };
        debug!("POST /contracts/fetch {}", address);

        let response = self
            .send(self.client.post(self.url("/contracts/fetch")).json(&body))
            .await?;
        let created: ContractCreated = self.decode(response).await?;

        created
            .contract_id
            .ok_or_else(|| ApiError::Malformed("response missing `contract_id`".into()))
    }

    async fn upload_contract(
        &self,
        source: &SourceBundle,
        network: Network,
    ) -> Result<ContractId, ApiError> {
        let part = Part::bytes(source.contents.clone()).file_name(source.file_name.clone());
        let form = Form::new()
            .part("file", part)
            .text("network", network.identifier());
        debug!(
            "POST /contracts/upload {} ({} bytes)",
            source.file_name,
            source.contents.len()
        );

        let response = self
            .send(self.client.post(self.url("/contracts/upload")).multipart(form))
            .await?;
        let created: ContractCreated = self.decode(response).await?;

        created
            .contract_id
            .ok_or_else(|| ApiError::Malformed("response missing `contract_id`".into()))
    }

    async fn start_audit(&self, request: &StartAuditRequest) -> Result<AuditId, ApiError> {
        debug!(
            "POST /audits/start contract={} analyzers={:?}",
            request.contract_id, request.analyzers
        );

        let response = self
            .send(self.client.post(self.url("/audits/start")).json(request))
            .await?;
        let started: AuditStarted = self.decode(response).await?;

        started
            .audit_id
            .ok_or_else(|| ApiError::Malformed("response missing `audit_id`".into()))
    }

    async fn audit_status(&self, audit_id: AuditId) -> Result<AuditStatus, ApiError> {
        let response = self
            .send(self.client.get(self.url(&format!("/audits/{}", audit_id))))
            .await?;
        let body: StatusBody = self.decode(response).await?;
        AuditStatus::from_body(body)
    }

    async fn audit_results(&self, audit_id: AuditId) -> Result<AnalysisResult, ApiError> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/audits/{}/results", audit_id))),
            )
            .await?;
        self.decode(response).await
    }

    async fn cancel_audit(&self, audit_id: AuditId) -> Result<(), ApiError> {
        self.send(
            self.client
                .post(self.url(&format!("/audits/{}/cancel", audit_id))),
        )
        .await?;
        Ok(())
    }

    async fn list_reports(
        &self,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<AnalysisResult>, ApiError> {
        let response = self
            .send(
                self.client
                    .get(self.url("/reports"))
                    .query(&[("skip", skip), ("limit", limit)]),
            )
            .await?;
        self.decode(response).await
    }

    async fn export_reports(
        &self,
        format: ExportFormat,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/reports/export/{}", format.as_str())))
                    .query(&[("skip", skip), ("limit", limit)]),
            )
            .await?;

        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;
        Ok(bytes.to_vec())
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Human-readable reason for a non-2xx reply. Prefers the server's
/// `detail` field and falls back to a message per status code.
fn backend_reason(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from));

    if let Some(detail) = detail {
        return detail;
    }

    match status.as_u16() {
        400 => "Bad request: please check your input".to_string(),
        401 => "Session expired, please sign in again".to_string(),
        403 => "You do not have permission to perform this action".to_string(),
        404 => "Resource not found".to_string(),
        429 => "Too many requests, please try again later".to_string(),
        500..=599 => "Server error, please try again later".to_string(),
        _ => format!(
            "Unexpected response ({})",
            status.canonical_reason().unwrap_or("unknown")
        ),
    }
}
