//! Job lifecycle states and the observable state sink.

use crate::contract::{AnalyzerSet, Network};
use crate::models::{AuditId, ContractId};
use serde::Serialize;
use std::fmt;
use tokio::sync::{broadcast, watch};

/// Lifecycle state of an analysis job.
///
/// `Idle -> Polling -> {Completed | Failed | Error | Cancelled}`. Terminal
/// states only leave via a fresh submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Idle,
    Polling,
    Completed,
    /// The backend reported the analysis as failed.
    Failed,
    /// Status checks kept failing until the retry budget ran out.
    Error,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Error | JobState::Cancelled
        )
    }

    /// Status line shown to the user.
    pub fn describe(&self) -> &'static str {
        match self {
            JobState::Idle => "No analysis running",
            JobState::Polling => "Analysis in progress",
            JobState::Completed => "Analysis completed",
            JobState::Failed => "Analysis failed on the backend",
            JobState::Error => "Lost contact with the analysis backend",
            JobState::Cancelled => "Analysis cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Polling => "polling",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Error => "error",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Stage message for a progress value.
pub fn stage_message(progress: u8) -> &'static str {
    match progress {
        0..=29 => "Running static analysis...",
        30..=59 => "Running symbolic execution...",
        60..=89 => "Checking chain-specific rules...",
        90..=99 => "Finalizing results...",
        _ => "Analysis complete",
    }
}

/// One analysis run, owned by the job client.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisJob {
    pub id: AuditId,
    pub contract_id: ContractId,
    /// Address or uploaded file name.
    pub contract: String,
    pub analyzers: AnalyzerSet,
    pub network: Network,
    pub state: JobState,
    /// Last observed progress, 0..=100.
    pub progress: u8,
    pub last_error: Option<String>,
}

/// What observers can read: `{progress, jobState, lastError}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub job_id: Option<AuditId>,
    pub progress: u8,
    pub state: JobState,
    pub last_error: Option<String>,
}

impl JobSnapshot {
    pub fn of(job: &AnalysisJob) -> Self {
        Self {
            job_id: Some(job.id),
            progress: job.progress,
            state: job.state,
            last_error: job.last_error.clone(),
        }
    }
}

/// Discrete lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Progress { job_id: AuditId, progress: u8 },
    Completed { job_id: AuditId },
    Failed { job_id: AuditId, reason: String },
    Errored { job_id: AuditId, reason: String },
    Cancelled { job_id: AuditId },
}

const EVENT_CAPACITY: usize = 64;

/// Publish side of the observable. Only the job client holds it.
pub(crate) struct StateSink {
    state: watch::Sender<JobSnapshot>,
    events: broadcast::Sender<JobEvent>,
}

impl StateSink {
    pub fn new() -> Self {
        let (state, _) = watch::channel(JobSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { state, events }
    }

    pub fn publish(&self, snapshot: JobSnapshot) {
        self.state.send_replace(snapshot);
    }

    pub fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn current(&self) -> JobSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Polling.is_terminal());
        for state in [
            JobState::Completed,
            JobState::Failed,
            JobState::Error,
            JobState::Cancelled,
        ] {
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn test_distinct_descriptions() {
        let failed = JobState::Failed.describe();
        let error = JobState::Error.describe();
        let cancelled = JobState::Cancelled.describe();
        assert_ne!(failed, error);
        assert_ne!(error, cancelled);
        assert_ne!(failed, cancelled);
    }

    #[test]
    fn test_stage_message() {
        assert_eq!(stage_message(0), "Running static analysis...");
        assert_eq!(stage_message(45), "Running symbolic execution...");
        assert_eq!(stage_message(89), "Checking chain-specific rules...");
        assert_eq!(stage_message(95), "Finalizing results...");
        assert_eq!(stage_message(100), "Analysis complete");
    }

    #[test]
    fn test_sink_publish_without_subscribers() {
        let sink = StateSink::new();
        sink.emit(JobEvent::Cancelled { job_id: 1 });
        sink.publish(JobSnapshot {
            job_id: Some(1),
            progress: 40,
            state: JobState::Polling,
            last_error: None,
        });
        assert_eq!(sink.current().progress, 40);
    }
}
