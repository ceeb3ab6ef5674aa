//! Client side of the remote analysis backend.
//!
//! [`AnalysisApi`] is the seam the job client depends on; [`HttpAnalysisApi`]
//! is the production implementation over HTTP.

pub mod http;

pub use http::HttpAnalysisApi;

use crate::contract::{AnalyzerSet, ContractAddress, Network, Priority, SourceBundle};
use crate::error::ApiError;
use crate::models::{AnalysisResult, AuditId, ContractId, ExportFormat};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

/// Endpoints exposed by the analysis backend.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// `POST /contracts/fetch`
    async fn fetch_contract(
        &self,
        address: &ContractAddress,
        network: Network,
    ) -> Result<ContractId, ApiError>;

    /// `POST /contracts/upload` (multipart)
    async fn upload_contract(
        &self,
        source: &SourceBundle,
        network: Network,
    ) -> Result<ContractId, ApiError>;

    /// `POST /audits/start`
    async fn start_audit(&self, request: &StartAuditRequest) -> Result<AuditId, ApiError>;

    /// `GET /audits/{id}`
    async fn audit_status(&self, audit_id: AuditId) -> Result<AuditStatus, ApiError>;

    /// `GET /audits/{id}/results`
    async fn audit_results(&self, audit_id: AuditId) -> Result<AnalysisResult, ApiError>;

    /// `POST /audits/{id}/cancel`
    async fn cancel_audit(&self, audit_id: AuditId) -> Result<(), ApiError>;

    /// `GET /reports?skip&limit`
    async fn list_reports(&self, skip: usize, limit: usize)
        -> Result<Vec<AnalysisResult>, ApiError>;

    /// `GET /reports/export/{format}?skip&limit`
    async fn export_reports(
        &self,
        format: ExportFormat,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<u8>, ApiError>;
}

/// Body of `POST /contracts/fetch`.
#[derive(Debug, Clone, Serialize)]
pub struct FetchContractRequest {
    pub address: String,
    pub network: String,
}

/// Body of `POST /audits/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartAuditRequest {
    pub contract_id: ContractId,
    pub analyzers: Vec<String>,
    pub priority: String,
}

impl StartAuditRequest {
    pub fn new(contract_id: ContractId, analyzers: &AnalyzerSet, priority: Priority) -> Self {
        Self {
            contract_id,
            analyzers: analyzers.identifiers(),
            priority: priority.as_str().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContractCreated {
    pub contract_id: Option<ContractId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuditStarted {
    pub audit_id: Option<AuditId>,
}

/// Status value reported by `GET /audits/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Other(String),
}

impl From<&str> for BackendStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" | "queued" => BackendStatus::Pending,
            "running" | "in_progress" => BackendStatus::Running,
            "completed" => BackendStatus::Completed,
            "failed" => BackendStatus::Failed,
            other => BackendStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendStatus::Pending => f.write_str("pending"),
            BackendStatus::Running => f.write_str("running"),
            BackendStatus::Completed => f.write_str("completed"),
            BackendStatus::Failed => f.write_str("failed"),
            BackendStatus::Other(s) => f.write_str(s),
        }
    }
}

/// Raw status body; every field optional so that missing ones can be
/// reported as malformed instead of a decode panic.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatusBody {
    pub progress: Option<f64>,
    pub status: Option<String>,
    #[serde(default, alias = "detail")]
    pub error: Option<String>,
}

/// Validated job status.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditStatus {
    /// Reported progress, not yet clamped.
    pub progress: f64,
    pub status: BackendStatus,
    /// Failure reason, when the backend supplies one.
    pub error: Option<String>,
}

impl AuditStatus {
    #[cfg(test)]
    pub fn new(progress: f64, status: &str) -> Self {
        Self {
            progress,
            status: BackendStatus::from(status),
            error: None,
        }
    }

    pub(crate) fn from_body(body: StatusBody) -> Result<Self, ApiError> {
        let progress = body
            .progress
            .filter(|p| p.is_finite())
            .ok_or_else(|| ApiError::Malformed("status response missing `progress`".into()))?;
        let status = body
            .status
            .ok_or_else(|| ApiError::Malformed("status response missing `status`".into()))?;

        Ok(Self {
            progress,
            status: BackendStatus::from(status.as_str()),
            error: body.error,
        })
    }

    /// Progress clamped to `0..=100` and rounded down.
    pub fn clamped_progress(&self) -> u8 {
        self.progress.clamp(0.0, 100.0).floor() as u8
    }
}

/// Convert a 1-based page into a `skip` offset.
pub fn page_to_skip(page: usize, limit: usize) -> usize {
    page.saturating_sub(1).saturating_mul(limit)
}

/// Fetch results for several audits with at most `concurrency` requests in
/// flight. Outcomes come back in the order of `audit_ids`, each paired with
/// the audit it was requested for.
pub async fn fetch_results_in_order(
    api: &dyn AnalysisApi,
    audit_ids: &[AuditId],
    concurrency: usize,
) -> Vec<(AuditId, Result<AnalysisResult, ApiError>)> {
    let mut fetched: Vec<_> = stream::iter(audit_ids.iter().copied().enumerate())
        .map(|(position, audit_id)| async move {
            let outcome = api.audit_results(audit_id).await.map(|mut result| {
                result.audit_id.get_or_insert(audit_id);
                result
            });
            (position, audit_id, outcome)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    fetched.sort_by_key(|(position, _, _)| *position);
    fetched
        .into_iter()
        .map(|(_, audit_id, outcome)| (audit_id, outcome))
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory backend for job client tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    /// One scripted reply from the status endpoint.
    pub enum StatusReply {
        Ok(AuditStatus),
        Err(ApiError),
        /// Resolve only after the given (virtual) delay.
        Delayed(Duration, AuditStatus),
        /// Never resolve.
        Hang,
    }

    #[derive(Default)]
    pub struct Calls {
        pub fetch_contract: usize,
        pub upload_contract: usize,
        pub start_audit: usize,
        pub audit_status: usize,
        pub audit_results: usize,
        pub cancel_audit: usize,
        pub list_reports: usize,
    }

    pub struct ScriptedApi {
        pub contract_id: ContractId,
        pub audit_id: Mutex<AuditId>,
        pub fetch_error: Option<ApiError>,
        pub start_error: Option<ApiError>,
        pub cancel_error: Option<ApiError>,
        pub results: Result<AnalysisResult, ApiError>,
        /// Delay applied to `audit_results` for one audit.
        pub results_delay: Option<(AuditId, Duration)>,
        status: Mutex<VecDeque<StatusReply>>,
        pub calls: Mutex<Calls>,
        pub last_start: Mutex<Option<StartAuditRequest>>,
    }

    impl ScriptedApi {
        pub fn new(replies: Vec<StatusReply>) -> Self {
            Self {
                contract_id: 5,
                audit_id: Mutex::new(42),
                fetch_error: None,
                start_error: None,
                cancel_error: None,
                results: Ok(crate::models::fixtures::result(
                    42,
                    "Token",
                    Default::default(),
                )),
                results_delay: None,
                status: Mutex::new(replies.into_iter().collect()),
                calls: Mutex::new(Calls::default()),
                last_start: Mutex::new(None),
            }
        }

        pub fn push_status(&self, reply: StatusReply) {
            self.status
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(reply);
        }

        pub fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    pub fn ok(progress: f64, status: &str) -> StatusReply {
        StatusReply::Ok(AuditStatus::new(progress, status))
    }

    pub fn transport_err() -> StatusReply {
        StatusReply::Err(ApiError::Transport("connection reset by peer".to_string()))
    }

    #[async_trait]
    impl AnalysisApi for ScriptedApi {
        async fn fetch_contract(
            &self,
            _address: &ContractAddress,
            _network: Network,
        ) -> Result<ContractId, ApiError> {
            self.calls().fetch_contract += 1;
            match &self.fetch_error {
                Some(e) => Err(e.clone()),
                None => Ok(self.contract_id),
            }
        }

        async fn upload_contract(
            &self,
            _source: &SourceBundle,
            _network: Network,
        ) -> Result<ContractId, ApiError> {
            self.calls().upload_contract += 1;
            Ok(self.contract_id)
        }

        async fn start_audit(&self, request: &StartAuditRequest) -> Result<AuditId, ApiError> {
            self.calls().start_audit += 1;
            *self.last_start.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(request.clone());
            match &self.start_error {
                Some(e) => Err(e.clone()),
                None => Ok(*self.audit_id.lock().unwrap_or_else(PoisonError::into_inner)),
            }
        }

        async fn audit_status(&self, _audit_id: AuditId) -> Result<AuditStatus, ApiError> {
            self.calls().audit_status += 1;
            let reply = self
                .status
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match reply {
                Some(StatusReply::Ok(status)) => Ok(status),
                Some(StatusReply::Err(e)) => Err(e),
                Some(StatusReply::Delayed(delay, status)) => {
                    tokio::time::sleep(delay).await;
                    Ok(status)
                }
                Some(StatusReply::Hang) => std::future::pending().await,
                // An exhausted script keeps reporting a running job.
                None => Ok(AuditStatus::new(0.0, "running")),
            }
        }

        async fn audit_results(&self, audit_id: AuditId) -> Result<AnalysisResult, ApiError> {
            self.calls().audit_results += 1;
            if let Some((slow, delay)) = self.results_delay {
                if slow == audit_id {
                    tokio::time::sleep(delay).await;
                }
            }
            self.results.clone()
        }

        async fn cancel_audit(&self, _audit_id: AuditId) -> Result<(), ApiError> {
            self.calls().cancel_audit += 1;
            match &self.cancel_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        async fn list_reports(
            &self,
            _skip: usize,
            _limit: usize,
        ) -> Result<Vec<AnalysisResult>, ApiError> {
            self.calls().list_reports += 1;
            Ok(self.results.clone().into_iter().collect())
        }

        async fn export_reports(
            &self,
            _format: ExportFormat,
            _skip: usize,
            _limit: usize,
        ) -> Result<Vec<u8>, ApiError> {
            Ok(b"id,contract\n".to_vec())
        }
    }
}
