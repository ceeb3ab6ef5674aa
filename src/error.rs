//! Error taxonomy for the analysis client.
//!
//! Local validation failures, backend/transport failures and job
//! lifecycle misuse are kept as separate enums so callers can tell a
//! retryable network hiccup from a request that will never succeed.

use crate::job::JobState;
use crate::models::AuditId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Input rejected before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Contract address is required")]
    EmptyAddress,
    #[error(
        "Invalid contract address `{0}`: must start with 0x followed by 40 hex characters"
    )]
    InvalidAddress(String),
    #[error("Select at least one analyzer")]
    NoAnalyzers,
    #[error("Unknown analyzer `{0}`")]
    UnknownAnalyzer(String),
    #[error("Unknown network `{0}`")]
    UnknownNetwork(String),
    #[error("Source file `{0}` is empty")]
    EmptySource(String),
}

/// Failure talking to the analysis backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("cannot connect to analysis backend at {0}")]
    Connect(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("backend returned {status}: {reason}")]
    Backend { status: u16, reason: String },
}

impl ApiError {
    /// Everything except a structured backend rejection counts as a
    /// transport failure. Malformed bodies are grouped here too.
    pub fn is_transport(&self) -> bool {
        !matches!(self, ApiError::Backend { .. })
    }
}

/// Which half of the two-step submission failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStep {
    FetchContract,
    UploadContract,
    StartAudit,
}

impl fmt::Display for SubmissionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStep::FetchContract => write!(f, "fetch contract"),
            SubmissionStep::UploadContract => write!(f, "upload contract"),
            SubmissionStep::StartAudit => write!(f, "start audit"),
        }
    }
}

/// Errors surfaced by [`crate::job::AnalysisJobClient`].
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("submission failed during {step}: {source}")]
    Submission {
        step: SubmissionStep,
        #[source]
        source: ApiError,
    },

    #[error("results for audit {job_id} are not ready (job is {state})")]
    NotReady { job_id: AuditId, state: JobState },

    #[error("{0}")]
    State(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(ApiError::Timeout(Duration::from_secs(10)).is_transport());
        assert!(ApiError::Connect("http://localhost:8000".to_string()).is_transport());
        assert!(ApiError::Malformed("missing progress".to_string()).is_transport());
        assert!(!ApiError::Backend {
            status: 404,
            reason: "Resource not found".to_string()
        }
        .is_transport());
    }

    #[test]
    fn test_submission_error_names_step() {
        let err = JobError::Submission {
            step: SubmissionStep::StartAudit,
            source: ApiError::Transport("connection reset".to_string()),
        };
        let text = err.to_string();
        assert!(text.contains("start audit"));
        assert!(text.contains("connection reset"));

        let err = JobError::Submission {
            step: SubmissionStep::FetchContract,
            source: ApiError::Timeout(Duration::from_secs(30)),
        };
        assert!(err.to_string().contains("fetch contract"));
    }

    #[test]
    fn test_not_ready_message() {
        let err = JobError::NotReady {
            job_id: 7,
            state: JobState::Polling,
        };
        assert_eq!(
            err.to_string(),
            "results for audit 7 are not ready (job is polling)"
        );
    }
}
