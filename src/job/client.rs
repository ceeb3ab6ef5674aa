//! The analysis job client.
//!
//! Drives one audit through submit -> start -> poll -> terminal state and
//! publishes every change to a watch channel (current snapshot) and a
//! broadcast channel (discrete events).

use super::retry::{Attempted, RetryPolicy};
use super::state::{AnalysisJob, JobEvent, JobSnapshot, JobState, StateSink};
use crate::api::{AnalysisApi, AuditStatus, BackendStatus, StartAuditRequest};
use crate::config::PollingConfig;
use crate::contract::{AnalyzerSet, ContractRef, Network, Priority};
use crate::error::{ApiError, JobError, SubmissionStep};
use crate::models::{AnalysisResult, AuditId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Interval between polling ticks when none is given.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

struct Inner {
    job: Option<AnalysisJob>,
    /// Bumped whenever the job is superseded or cancelled. A tick tagged
    /// with an older generation is dropped on arrival.
    generation: u64,
}

/// State shared between the client and its polling task.
struct Shared {
    inner: Mutex<Inner>,
    sink: StateSink,
}

impl Shared {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                job: None,
                generation: 0,
            }),
            sink: StateSink::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, job_id: AuditId, generation: u64) -> bool {
        let inner = self.lock();
        inner.generation == generation
            && inner
                .job
                .as_ref()
                .is_some_and(|job| job.id == job_id && job.state == JobState::Polling)
    }

    /// Fold one tick's outcome into the job. Returns `true` while polling
    /// should continue.
    fn apply_tick(
        &self,
        job_id: AuditId,
        generation: u64,
        outcome: Attempted<Result<AuditStatus, ApiError>>,
    ) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!("Discarding stale status for audit {}", job_id);
            return false;
        }

        let job = match inner.job.as_mut() {
            Some(job) if job.id == job_id && job.state == JobState::Polling => job,
            _ => return false,
        };

        match outcome.value {
            Ok(status) => self.observe(job, status),
            Err(error) => {
                let reason = format!(
                    "status check failed after {} attempt(s): {}",
                    outcome.attempts, error
                );
                warn!("Audit {}: {}", job_id, reason);
                job.state = JobState::Error;
                job.last_error = Some(reason.clone());
                self.sink.publish(JobSnapshot::of(job));
                self.sink.emit(JobEvent::Errored { job_id, reason });
                false
            }
        }
    }

    fn observe(&self, job: &mut AnalysisJob, status: AuditStatus) -> bool {
        // Progress never moves backwards while polling.
        job.progress = job.progress.max(status.clamped_progress());

        match status.status {
            BackendStatus::Failed => {
                let reason = status
                    .error
                    .unwrap_or_else(|| "analysis failed on the backend".to_string());
                warn!("Audit {} failed: {}", job.id, reason);
                job.state = JobState::Failed;
                job.last_error = Some(reason.clone());
                self.sink.publish(JobSnapshot::of(job));
                self.sink.emit(JobEvent::Failed {
                    job_id: job.id,
                    reason,
                });
                false
            }
            BackendStatus::Completed => {
                self.complete(job);
                false
            }
            _ if job.progress >= 100 => {
                self.complete(job);
                false
            }
            other => {
                debug!(
                    "Audit {} is {:?} at {}%",
                    job.id, other, job.progress
                );
                self.sink.publish(JobSnapshot::of(job));
                self.sink.emit(JobEvent::Progress {
                    job_id: job.id,
                    progress: job.progress,
                });
                true
            }
        }
    }

    fn complete(&self, job: &mut AnalysisJob) {
        info!("Audit {} completed", job.id);
        job.state = JobState::Completed;
        job.progress = 100;
        job.last_error = None;
        self.sink.publish(JobSnapshot::of(job));
        self.sink.emit(JobEvent::Completed { job_id: job.id });
    }
}

/// Owns the lifecycle of a single analysis job.
///
/// At most one polling task is alive per client; starting a new one or
/// cancelling always aborts the previous task first.
pub struct AnalysisJobClient {
    api: Arc<dyn AnalysisApi>,
    policy: RetryPolicy,
    interval: Duration,
    priority: Priority,
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisJobClient {
    pub fn new(api: Arc<dyn AnalysisApi>, policy: RetryPolicy) -> Self {
        Self {
            api,
            policy,
            interval: DEFAULT_POLL_INTERVAL,
            priority: Priority::default(),
            shared: Arc::new(Shared::new()),
            timer: Mutex::new(None),
        }
    }

    pub fn from_config(api: Arc<dyn AnalysisApi>, config: &PollingConfig) -> Self {
        Self::new(api, RetryPolicy::from(config))
            .with_interval(Duration::from_millis(config.interval_ms))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Current `{progress, state, last_error}` as seen by observers.
    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.sink.current()
    }

    /// Copy of the job record, if any.
    pub fn job(&self) -> Option<AnalysisJob> {
        self.shared.lock().job.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.shared.sink.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.sink.events()
    }

    /// Validate a raw address and submit it.
    #[cfg(test)]
    pub async fn submit_address(
        &self,
        raw: &str,
        network: Network,
        analyzers: &AnalyzerSet,
    ) -> Result<AuditId, JobError> {
        let contract = ContractRef::address(raw)?;
        self.submit_and_start(&contract, network, analyzers).await
    }

    /// Register the contract with the backend and start an audit.
    ///
    /// On success the new job replaces any previous one and enters
    /// `Polling` at 0%. On failure the previous job is left untouched.
    pub async fn submit_and_start(
        &self,
        contract: &ContractRef,
        network: Network,
        analyzers: &AnalyzerSet,
    ) -> Result<AuditId, JobError> {
        info!(
            "Submitting {} on {} with analyzers [{}]",
            contract.label(),
            network,
            analyzers
        );

        let contract_id = match contract {
            ContractRef::Address(address) => self
                .api
                .fetch_contract(address, network)
                .await
                .map_err(|source| JobError::Submission {
                    step: SubmissionStep::FetchContract,
                    source,
                })?,
            ContractRef::Source(bundle) => self
                .api
                .upload_contract(bundle, network)
                .await
                .map_err(|source| JobError::Submission {
                    step: SubmissionStep::UploadContract,
                    source,
                })?,
        };

        let request = StartAuditRequest::new(contract_id, analyzers, self.priority);
        let audit_id = self
            .api
            .start_audit(&request)
            .await
            .map_err(|source| JobError::Submission {
                step: SubmissionStep::StartAudit,
                source,
            })?;

        self.stop_timer();

        let job = AnalysisJob {
            id: audit_id,
            contract_id,
            contract: contract.label(),
            analyzers: analyzers.clone(),
            network,
            state: JobState::Polling,
            progress: 0,
            last_error: None,
        };

        {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            self.shared.sink.publish(JobSnapshot::of(&job));
            inner.job = Some(job);
        }

        info!("Audit {} started for contract {}", audit_id, contract_id);
        Ok(audit_id)
    }

    /// Start polling with the configured interval.
    pub fn start_polling_default(&self, job_id: AuditId) -> Result<(), JobError> {
        self.start_polling(job_id, self.interval)
    }

    /// Start (or restart) the polling task for `job_id`.
    pub fn start_polling(&self, job_id: AuditId, interval: Duration) -> Result<(), JobError> {
        let generation = {
            let inner = self.shared.lock();
            match &inner.job {
                Some(job) if job.id == job_id && job.state == JobState::Polling => {
                    inner.generation
                }
                Some(job) if job.id == job_id => {
                    return Err(JobError::State(format!(
                        "audit {} is {}; submit a new analysis to poll again",
                        job_id, job.state
                    )))
                }
                _ => {
                    return Err(JobError::State(format!(
                        "audit {} is not the active job",
                        job_id
                    )))
                }
            }
        };

        // tokio::time::interval panics on a zero period.
        let interval = interval.max(Duration::from_millis(1));
        let task = poll_loop(
            Arc::clone(&self.api),
            Arc::clone(&self.shared),
            self.policy,
            job_id,
            generation,
            interval,
        );

        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(task));

        debug!("Polling audit {} every {:?}", job_id, interval);
        Ok(())
    }

    /// Stop polling and mark the job cancelled.
    ///
    /// Returns `false` (and does nothing) when `job_id` is not an active
    /// job. Backend notification is best effort.
    pub async fn cancel(&self, job_id: AuditId) -> bool {
        let cancelled = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            match inner.job.as_mut() {
                Some(job) if job.id == job_id && job.state == JobState::Polling => {
                    inner.generation += 1;
                    job.state = JobState::Cancelled;
                    // The job keeps its frozen progress; observers are reset
                    // for the next job.
                    self.shared.sink.publish(JobSnapshot {
                        job_id: Some(job_id),
                        progress: 0,
                        state: JobState::Cancelled,
                        last_error: None,
                    });
                    self.shared.sink.emit(JobEvent::Cancelled { job_id });
                    true
                }
                _ => false,
            }
        };

        if !cancelled {
            debug!("Ignoring cancel for audit {}: no active job", job_id);
            return false;
        }

        self.stop_timer();
        info!("Audit {} cancelled", job_id);

        if let Err(e) = self.api.cancel_audit(job_id).await {
            warn!(
                "Could not notify backend about cancellation of audit {}: {}",
                job_id, e
            );
        }

        true
    }

    /// Fetch the result of a completed job. Never touches the network
    /// unless the job is `Completed`, and never retries.
    pub async fn fetch_results(&self, job_id: AuditId) -> Result<AnalysisResult, JobError> {
        let state = {
            let inner = self.shared.lock();
            match &inner.job {
                Some(job) if job.id == job_id => job.state,
                _ => JobState::Idle,
            }
        };

        if state != JobState::Completed {
            return Err(JobError::NotReady { job_id, state });
        }

        let mut result = self.api.audit_results(job_id).await?;
        result.audit_id.get_or_insert(job_id);
        info!(
            "Fetched results for audit {}: {} issue(s)",
            job_id,
            result.total_issues()
        );
        Ok(result)
    }

    /// Wait until the current job leaves `Polling`.
    pub async fn wait_for_terminal(&self) -> JobSnapshot {
        let mut rx = self.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.state != JobState::Polling {
                return snapshot;
            }
            if rx.changed().await.is_err() {
                return snapshot;
            }
        }
    }

    fn stop_timer(&self) {
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for AnalysisJobClient {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

async fn poll_loop(
    api: Arc<dyn AnalysisApi>,
    shared: Arc<Shared>,
    policy: RetryPolicy,
    job_id: AuditId,
    generation: u64,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let label = format!("status check for audit {}", job_id);
    let api: &dyn AnalysisApi = api.as_ref();

    loop {
        ticker.tick().await;
        if !shared.is_current(job_id, generation) {
            break;
        }

        let outcome = policy.run(&label, move || api.audit_status(job_id)).await;
        if !shared.apply_tick(job_id, generation, outcome) {
            break;
        }
    }

    debug!("Polling for audit {} stopped", job_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{ok, transport_err, ScriptedApi, StatusReply};
    use crate::contract::{Analyzer, SourceBundle};
    use tokio::time::{sleep, Instant};
    use tokio_test::{assert_err, assert_ok};

    const ADDRESS: &str = "0x1234567890123456789012345678901234567890";

    fn client_with(api: ScriptedApi) -> (AnalysisJobClient, Arc<ScriptedApi>) {
        let api = Arc::new(api);
        let client = AnalysisJobClient::new(api.clone(), RetryPolicy::default());
        (client, api)
    }

    fn drain(events: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    async fn submitted(api: ScriptedApi) -> (AnalysisJobClient, Arc<ScriptedApi>, AuditId) {
        let (client, api) = client_with(api);
        let job_id = client
            .submit_address(ADDRESS, Network::Fuji, &AnalyzerSet::default())
            .await
            .unwrap();
        (client, api, job_id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fuji_submission_completes_on_first_poll() {
        let (client, api) = client_with(ScriptedApi::new(vec![ok(100.0, "completed")]));
        let mut events = client.events();
        let analyzers = AnalyzerSet::new([Analyzer::StaticAnalysis]).unwrap();

        let job_id = client
            .submit_address(ADDRESS, Network::Fuji, &analyzers)
            .await
            .unwrap();
        assert_eq!(job_id, 42);

        let snapshot = client.snapshot();
        assert_eq!(snapshot.state, JobState::Polling);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(snapshot.job_id, Some(42));

        client.start_polling_default(job_id).unwrap();
        let terminal = client.wait_for_terminal().await;
        assert_eq!(terminal.state, JobState::Completed);
        assert_eq!(terminal.progress, 100);

        sleep(Duration::from_secs(30)).await;

        let completions = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, JobEvent::Completed { .. }))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(api.calls().audit_status, 1);

        let start = api.last_start.lock().unwrap().clone().unwrap();
        assert_eq!(start.analyzers, vec!["slither"]);
        assert_eq!(start.contract_id, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_until_completion() {
        let (client, _api, job_id) = submitted(ScriptedApi::new(vec![
            ok(10.0, "running"),
            ok(30.0, "running"),
            ok(25.0, "running"),
            ok(60.0, "running"),
            ok(100.0, "running"),
        ]))
        .await;
        let mut events = client.events();

        client.start_polling_default(job_id).unwrap();
        let terminal = client.wait_for_terminal().await;
        assert_eq!(terminal.state, JobState::Completed);

        let events = drain(&mut events);
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![10, 30, 30, 60]);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(events.last(), Some(&JobEvent::Completed { job_id }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_progress_is_clamped() {
        let (client, _api, job_id) = submitted(ScriptedApi::new(vec![
            ok(-20.0, "pending"),
            ok(250.0, "running"),
        ]))
        .await;

        client.start_polling_default(job_id).unwrap();
        let terminal = client.wait_for_terminal().await;
        assert_eq!(terminal.state, JobState::Completed);
        assert_eq!(terminal.progress, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let (client, api, job_id) = submitted(ScriptedApi::new(vec![
            transport_err(),
            transport_err(),
            ok(100.0, "completed"),
        ]))
        .await;
        let mut events = client.events();
        let started = Instant::now();

        client.start_polling_default(job_id).unwrap();
        let terminal = client.wait_for_terminal().await;

        assert_eq!(terminal.state, JobState::Completed);
        assert_eq!(api.calls().audit_status, 3);
        assert!(started.elapsed() >= Duration::from_millis(4000));
        assert!(!drain(&mut events)
            .iter()
            .any(|e| matches!(e, JobEvent::Errored { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_transition_to_error_and_stop() {
        let (client, api, job_id) = submitted(ScriptedApi::new(vec![
            transport_err(),
            transport_err(),
            transport_err(),
            ok(100.0, "completed"),
        ]))
        .await;

        client.start_polling_default(job_id).unwrap();
        let terminal = client.wait_for_terminal().await;

        assert_eq!(terminal.state, JobState::Error);
        assert!(terminal
            .last_error
            .as_deref()
            .unwrap()
            .contains("3 attempt(s)"));
        assert_eq!(api.calls().audit_status, 3);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(api.calls().audit_status, 3);
        assert_eq!(client.snapshot().state, JobState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_requests_time_out() {
        let (client, api, job_id) = submitted(ScriptedApi::new(vec![
            StatusReply::Hang,
            StatusReply::Hang,
            StatusReply::Hang,
        ]))
        .await;

        client.start_polling_default(job_id).unwrap();
        let terminal = client.wait_for_terminal().await;

        assert_eq!(terminal.state, JobState::Error);
        assert!(terminal.last_error.unwrap().contains("timed out"));
        assert_eq!(api.calls().audit_status, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_freezes_progress() {
        let mut failed = AuditStatus::new(40.0, "failed");
        failed.error = Some("solc crashed".to_string());
        let (client, _api, job_id) = submitted(ScriptedApi::new(vec![
            ok(20.0, "running"),
            StatusReply::Ok(failed),
        ]))
        .await;
        let mut events = client.events();

        client.start_polling_default(job_id).unwrap();
        let terminal = client.wait_for_terminal().await;

        assert_eq!(terminal.state, JobState::Failed);
        assert_eq!(terminal.progress, 40);
        assert_eq!(terminal.last_error.as_deref(), Some("solc crashed"));

        let failures = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, JobEvent::Failed { .. }))
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks_and_notifies_backend() {
        let (client, api, job_id) = submitted(ScriptedApi::new(vec![
            ok(10.0, "running"),
            ok(20.0, "running"),
        ]))
        .await;
        let mut events = client.events();

        client.start_polling_default(job_id).unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(client.snapshot().progress, 10);

        assert!(client.cancel(job_id).await);

        let snapshot = client.snapshot();
        assert_eq!(snapshot.state, JobState::Cancelled);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(client.job().unwrap().progress, 10);
        assert_eq!(api.calls().cancel_audit, 1);

        sleep(Duration::from_secs(20)).await;
        assert_eq!(api.calls().audit_status, 1);

        let events = drain(&mut events);
        assert_eq!(events.last(), Some(&JobEvent::Cancelled { job_id }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_response_after_cancel_is_ignored() {
        let (client, api, job_id) = submitted(ScriptedApi::new(vec![StatusReply::Delayed(
            Duration::from_secs(5),
            AuditStatus::new(100.0, "completed"),
        )]))
        .await;
        let mut events = client.events();

        client.start_polling_default(job_id).unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(api.calls().audit_status, 1);

        client.cancel(job_id).await;
        sleep(Duration::from_secs(10)).await;

        assert_eq!(client.snapshot().state, JobState::Cancelled);
        assert!(!drain(&mut events)
            .iter()
            .any(|e| matches!(e, JobEvent::Completed { .. } | JobEvent::Progress { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_discarded() {
        let (client, _api, job_id) = submitted(ScriptedApi::new(vec![])).await;
        let stale = client.shared.lock().generation;

        client.cancel(job_id).await;

        let applied = client.shared.apply_tick(
            job_id,
            stale,
            Attempted {
                value: Ok(AuditStatus::new(100.0, "completed")),
                attempts: 1,
            },
        );
        assert!(!applied);
        assert_eq!(client.snapshot().state, JobState::Cancelled);
        assert_eq!(client.job().unwrap().state, JobState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_noop_without_active_job() {
        let (client, api) = client_with(ScriptedApi::new(vec![]));
        assert!(!client.cancel(42).await);
        assert_eq!(api.calls().cancel_audit, 0);
        assert_eq!(client.snapshot().state, JobState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_twice_notifies_once() {
        let (client, api, job_id) = submitted(ScriptedApi::new(vec![])).await;
        client.start_polling_default(job_id).unwrap();

        assert!(client.cancel(job_id).await);
        assert!(!client.cancel(job_id).await);
        assert_eq!(api.calls().cancel_audit, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_notify_failure_still_cancels() {
        let mut api = ScriptedApi::new(vec![]);
        api.cancel_error = Some(ApiError::Connect("http://localhost:8000".to_string()));
        let (client, api, job_id) = submitted(api).await;

        assert!(client.cancel(job_id).await);
        assert_eq!(client.snapshot().state, JobState::Cancelled);
        assert_eq!(api.calls().cancel_audit, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_results_before_completion_is_not_ready() {
        let (client, api, job_id) = submitted(ScriptedApi::new(vec![])).await;

        let err = client.fetch_results(job_id).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::NotReady {
                state: JobState::Polling,
                ..
            }
        ));

        let err = client.fetch_results(999).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::NotReady {
                state: JobState::Idle,
                ..
            }
        ));
        assert_eq!(api.calls().audit_results, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_results_after_completion() {
        let (client, api, job_id) =
            submitted(ScriptedApi::new(vec![ok(100.0, "completed")])).await;
        client.start_polling_default(job_id).unwrap();
        client.wait_for_terminal().await;

        let result = assert_ok!(client.fetch_results(job_id).await);
        assert_eq!(result.id, 42);
        assert_eq!(result.audit_id, Some(job_id));
        assert_eq!(api.calls().audit_results, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_results_failure_is_not_retried() {
        let mut api = ScriptedApi::new(vec![ok(100.0, "completed")]);
        api.results = Err(ApiError::Transport("connection reset".to_string()));
        let (client, api, job_id) = submitted(api).await;
        client.start_polling_default(job_id).unwrap();
        client.wait_for_terminal().await;

        let err = assert_err!(client.fetch_results(job_id).await);
        assert!(matches!(err, JobError::Api(ApiError::Transport(_))));
        assert_eq!(api.calls().audit_results, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_address_never_reaches_network() {
        let (client, api) = client_with(ScriptedApi::new(vec![]));

        let err = client
            .submit_address("0x1234", Network::Mainnet, &AnalyzerSet::default())
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(api.calls().fetch_contract, 0);
        assert_eq!(api.calls().start_audit, 0);
        assert_eq!(client.snapshot().state, JobState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_errors_name_the_failed_step() {
        let mut api = ScriptedApi::new(vec![]);
        api.fetch_error = Some(ApiError::Backend {
            status: 404,
            reason: "Contract not found".to_string(),
        });
        let (client, api) = client_with(api);

        let err = client
            .submit_address(ADDRESS, Network::Mainnet, &AnalyzerSet::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::Submission {
                step: SubmissionStep::FetchContract,
                ..
            }
        ));
        assert_eq!(api.calls().start_audit, 0);

        let mut api = ScriptedApi::new(vec![]);
        api.start_error = Some(ApiError::Transport("broken pipe".to_string()));
        let (client, _api) = client_with(api);

        let err = client
            .submit_address(ADDRESS, Network::Mainnet, &AnalyzerSet::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::Submission {
                step: SubmissionStep::StartAudit,
                ..
            }
        ));
        assert_eq!(client.snapshot(), JobSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_upload_path() {
        let (client, api) = client_with(ScriptedApi::new(vec![]));
        let bundle = SourceBundle::new("Vault.sol", b"contract Vault {}".to_vec()).unwrap();

        let job_id = client
            .submit_and_start(
                &ContractRef::Source(bundle),
                Network::Local,
                &AnalyzerSet::default(),
            )
            .await
            .unwrap();

        assert_eq!(job_id, 42);
        assert_eq!(api.calls().upload_contract, 1);
        assert_eq!(api.calls().fetch_contract, 0);
        assert_eq!(client.job().unwrap().contract, "Vault.sol");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_single_timer() {
        let (client, api, job_id) = submitted(ScriptedApi::new(vec![])).await;

        assert_ok!(client.start_polling_default(job_id));
        assert_ok!(client.start_polling_default(job_id));
        sleep(Duration::from_millis(5000)).await;

        // Ticks at 0s, 2s and 4s from one timer.
        assert_eq!(api.calls().audit_status, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_polling_rejects_unknown_or_finished_jobs() {
        let (client, _api, job_id) =
            submitted(ScriptedApi::new(vec![ok(100.0, "completed")])).await;

        assert!(matches!(
            client.start_polling_default(job_id + 1),
            Err(JobError::State(_))
        ));

        client.start_polling_default(job_id).unwrap();
        client.wait_for_terminal().await;

        assert!(matches!(
            client.start_polling_default(job_id),
            Err(JobError::State(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_submission_supersedes_running_job() {
        let (client, api, first) =
            submitted(ScriptedApi::new(vec![StatusReply::Hang])).await;
        client.start_polling_default(first).unwrap();
        sleep(Duration::from_secs(1)).await;

        *api.audit_id.lock().unwrap() = 43;
        api.push_status(ok(100.0, "completed"));
        let second = client
            .submit_address(ADDRESS, Network::Fuji, &AnalyzerSet::default())
            .await
            .unwrap();
        assert_eq!(second, 43);
        assert_eq!(client.snapshot().state, JobState::Polling);
        assert_eq!(client.snapshot().progress, 0);

        // The superseded job can no longer be cancelled or polled.
        assert!(!client.cancel(first).await);

        client.start_polling_default(second).unwrap();
        let terminal = client.wait_for_terminal().await;
        assert_eq!(terminal.job_id, Some(43));
        assert_eq!(terminal.state, JobState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_terminal_returns_immediately_when_idle() {
        let (client, _api) = client_with(ScriptedApi::new(vec![]));
        let snapshot = client.wait_for_terminal().await;
        assert_eq!(snapshot.state, JobState::Idle);
    }
}
