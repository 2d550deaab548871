//! Job synchronization engine.
//!
//! [`JobSyncEngine`] keeps a [`JobBoard`] consistent with the job service
//! by merging three unordered sources: list fetches, push frames and
//! per-job polls. Each source decodes into a [`JobSnapshot`] and goes
//! through the same [`SyncShared::apply`] path, which holds the board's
//! write lock for one merge only.
//!
//! Two background tasks run per engine, each under a child of the
//! engine's [`CancellationToken`]:
//!
//! - the push task dials the channel, reads frames and redials with a
//!   bounded budget before degrading to poll-only;
//! - the poller issues one `GET /jobs/{id}` per pending or running job on
//!   every tick and sleeps on the status composition when nothing is
//!   active.
//!
//! Observers read snapshots through the query methods or subscribe to the
//! [`SyncEvent`] broadcast.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use stockdash_core::board::{ApplyOutcome, JobBoard, JobLogEntry, StatusComposition, UpdateSource};
use stockdash_core::job::{Job, JobSnapshot};
use stockdash_core::session::{ClientId, Session};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{HttpJobApi, JobApi, JobApiError};
use crate::channel::{PushClient, PushConnection};
use crate::config::ClientConfig;
use crate::processor::process_frames;
use crate::reconnect::{reconnect_loop, ReconnectConfig, ReconnectOutcome};
use crate::state::{ConnectionEvent, ConnectionState};

/// Broadcast channel capacity for sync events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`JobSyncEngine::shutdown`] waits for each task.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Everything observers can learn about the board without polling it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A job was inserted or changed by a merge.
    JobUpdated { job: Job, source: UpdateSource },
    /// A submission was acknowledged and recorded as pending.
    JobCreated { job: Job },
    JobDeleted { job_id: String },
    /// Every job was removed.
    Cleared,
    /// Short human-readable message for transient display.
    Notice { level: NoticeLevel, message: String },
    ConnectionChanged { state: ConnectionState },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Search text must not be empty")]
    EmptyInput,

    #[error(transparent)]
    Api(#[from] JobApiError),

    #[error("Job sync engine has been shut down")]
    ShutDown,
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub client_id: ClientId,
    pub poll_interval: Duration,
    pub reconnect: ReconnectConfig,
    /// Push channel to maintain. `None` runs the engine poll-only.
    pub push: Option<PushClient>,
}

impl SyncOptions {
    /// Poll-only defaults for a fresh client id.
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            poll_interval: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
            push: None,
        }
    }

    pub fn with_push(mut self, push: PushClient) -> Self {
        self.push = Some(push);
        self
    }
}

/// State shared between the engine handle and its background tasks.
pub(crate) struct SyncShared {
    board: RwLock<JobBoard>,
    composition: watch::Sender<StatusComposition>,
    connection: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SyncEvent>,
    cancel: CancellationToken,
}

impl SyncShared {
    fn new(cancel: CancellationToken) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            board: RwLock::new(JobBoard::new()),
            composition: watch::Sender::new(StatusComposition::new()),
            connection: watch::Sender::new(ConnectionState::Disconnected),
            events,
            cancel,
        }
    }

    /// Merge one snapshot into the board and tell observers.
    ///
    /// Poll responses only update jobs that are still on the board, so a
    /// poll that was in flight during a delete cannot resurrect the job.
    pub(crate) async fn apply(&self, snapshot: JobSnapshot, source: UpdateSource) -> ApplyOutcome {
        if self.cancel.is_cancelled() {
            tracing::debug!(job_id = %snapshot.job_id, ?source, "Discarding update after shutdown");
            return ApplyOutcome::Stale;
        }

        let job_id = snapshot.job_id.clone();
        let (outcome, job, composition) = {
            let mut board = self.board.write().await;
            if source == UpdateSource::Poll && board.get(&job_id).is_none() {
                tracing::debug!(job_id = %job_id, "Discarding poll for a job no longer tracked");
                return ApplyOutcome::Stale;
            }
            let outcome = board.apply(snapshot, source, Utc::now());
            let job = board.get(&job_id).cloned();
            let composition = outcome.changes_composition().then(|| board.composition());
            (outcome, job, composition)
        };

        if outcome == ApplyOutcome::Stale {
            return outcome;
        }
        if let Some(composition) = composition {
            self.publish_composition(composition);
        }
        if let Some(job) = job {
            if source == UpdateSource::Push {
                self.notice(
                    NoticeLevel::Info,
                    format!("Update: {} - Progress: {}%", job.status, job.progress),
                );
            }
            let _ = self.events.send(SyncEvent::JobUpdated { job, source });
        }
        outcome
    }

    async fn insert_created(&self, job_id: &str, search_text: &str) {
        let (job, composition) = {
            let mut board = self.board.write().await;
            let inserted = board.insert_created(job_id, search_text, Utc::now());
            let composition = inserted.then(|| board.composition());
            (board.get(job_id).cloned(), composition)
        };

        if let Some(composition) = composition {
            self.publish_composition(composition);
        }
        if let Some(job) = job {
            let _ = self.events.send(SyncEvent::JobCreated { job });
        }
    }

    async fn remove(&self, job_id: &str) {
        let composition = {
            let mut board = self.board.write().await;
            board.remove(job_id).map(|_| board.composition())
        };

        if let Some(composition) = composition {
            self.publish_composition(composition);
        }
        let _ = self.events.send(SyncEvent::JobDeleted {
            job_id: job_id.to_string(),
        });
    }

    async fn clear(&self) {
        self.board.write().await.clear();
        self.publish_composition(StatusComposition::new());
        let _ = self.events.send(SyncEvent::Cleared);
    }

    fn publish_composition(&self, next: StatusComposition) {
        self.composition.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Feed an event to the connection state machine.
    pub(crate) fn transition(&self, event: ConnectionEvent) {
        let mut changed_to = None;
        self.connection.send_if_modified(|state| {
            let next = state.on(event);
            if next == *state {
                return false;
            }
            *state = next;
            changed_to = Some(next);
            true
        });

        if let Some(state) = changed_to {
            tracing::debug!(?event, ?state, "Push channel state changed");
            let _ = self.events.send(SyncEvent::ConnectionChanged { state });
        }
    }

    fn notice(&self, level: NoticeLevel, message: String) {
        let _ = self.events.send(SyncEvent::Notice { level, message });
    }

    /// Log a failed call and surface it as an error notice.
    fn report_failure(&self, context: &str, error: &JobApiError) {
        tracing::warn!(error = %error, "{context}");
        self.notice(NoticeLevel::Error, format!("{context}: {error}"));
    }
}

/// Handle to a running sync engine.
///
/// Created with [`JobSyncEngine::start`]; the returned `Arc` can be cloned
/// freely. Call [`shutdown`](Self::shutdown) to stop the background tasks.
pub struct JobSyncEngine {
    shared: Arc<SyncShared>,
    api: Arc<dyn JobApi>,
    client_id: ClientId,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl JobSyncEngine {
    /// Spawn the poller and, when configured, the push task.
    ///
    /// Must be called from within a Tokio runtime. The board starts empty;
    /// call [`load_jobs`](Self::load_jobs) for the initial fetch.
    pub fn start(api: Arc<dyn JobApi>, options: SyncOptions) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let shared = Arc::new(SyncShared::new(cancel.clone()));
        let mut tasks = Vec::with_capacity(2);

        tracing::info!(
            client_id = %options.client_id,
            push = options.push.is_some(),
            poll_interval_ms = options.poll_interval.as_millis() as u64,
            "Starting job sync engine",
        );

        tasks.push(tokio::spawn(run_poller(
            Arc::clone(&shared),
            Arc::clone(&api),
            options.poll_interval,
            cancel.child_token(),
        )));

        if let Some(push) = options.push {
            tasks.push(tokio::spawn(run_push_loop(
                Arc::clone(&shared),
                push,
                options.reconnect,
                cancel.child_token(),
            )));
        }

        Arc::new(Self {
            shared,
            api,
            client_id: options.client_id,
            tasks: Mutex::new(tasks),
        })
    }

    /// Start an engine for a signed-in session against the configured job
    /// service, with the push channel enabled, and load the job list.
    ///
    /// A failed initial fetch is logged and reported as a notice; polling
    /// and push still start.
    pub async fn connect(config: &ClientConfig, session: &Session) -> Result<Arc<Self>, SyncError> {
        let owner_id = session.owner_id();
        let client_id = ClientId::generate();
        let api = HttpJobApi::new(&config.job_api_url, &owner_id, config.request_timeout)?;
        let push = PushClient::new(&config.job_ws_url, client_id.clone(), &owner_id);

        let options = SyncOptions {
            client_id,
            poll_interval: config.poll_interval,
            reconnect: config.reconnect.clone(),
            push: Some(push),
        };

        let engine = Self::start(Arc::new(api), options);
        // Failure is already reported by load_jobs.
        let _ = engine.load_jobs().await;
        Ok(engine)
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// GET `/jobs` and merge every listed job.
    pub async fn load_jobs(&self) -> Result<usize, SyncError> {
        self.ensure_running()?;

        let snapshots = self.api.list_jobs().await.map_err(|e| {
            self.shared.report_failure("Error fetching jobs", &e);
            e
        })?;
        self.ensure_running()?;

        let count = snapshots.len();
        for snapshot in snapshots {
            self.shared.apply(snapshot, UpdateSource::Fetch).await;
        }

        tracing::info!(count, "Job list loaded");
        Ok(count)
    }

    /// Manual refresh of the job list.
    pub async fn refresh(&self) -> Result<usize, SyncError> {
        self.load_jobs().await
    }

    /// Submit text for vector generation and record the pending job.
    ///
    /// Returns the server-assigned job id.
    pub async fn submit(&self, text: &str) -> Result<String, SyncError> {
        if text.trim().is_empty() {
            return Err(SyncError::EmptyInput);
        }
        self.ensure_running()?;

        let created = self
            .api
            .submit(text, &self.client_id)
            .await
            .map_err(|e| {
                self.shared.report_failure("Error submitting job", &e);
                e
            })?;
        self.ensure_running()?;

        tracing::info!(
            job_id = %created.job_id,
            status = ?created.status,
            message = ?created.message,
            "Job submitted",
        );
        self.shared.insert_created(&created.job_id, text).await;
        Ok(created.job_id)
    }

    /// DELETE one job, then drop it and its log locally.
    ///
    /// Failures are surfaced and not retried; the local entry is kept.
    pub async fn delete_job(&self, job_id: &str) -> Result<(), SyncError> {
        self.ensure_running()?;

        self.api.delete_job(job_id).await.map_err(|e| {
            self.shared.report_failure("Error deleting job", &e);
            e
        })?;
        self.ensure_running()?;

        self.shared.remove(job_id).await;
        tracing::info!(job_id = %job_id, "Job deleted");
        self.shared
            .notice(NoticeLevel::Info, "Job deleted successfully".to_string());
        Ok(())
    }

    /// DELETE every job, then empty the board.
    pub async fn clear_all(&self) -> Result<(), SyncError> {
        self.ensure_running()?;

        self.api.clear_all().await.map_err(|e| {
            self.shared.report_failure("Error clearing jobs", &e);
            e
        })?;
        self.ensure_running()?;

        self.shared.clear().await;
        tracing::info!("All jobs cleared");
        self.shared
            .notice(NoticeLevel::Info, "All jobs cleared successfully".to_string());
        Ok(())
    }

    /// Replace a job's local log with the job service's history.
    ///
    /// The history is returned either way, but it is only stored while the
    /// job is still on the board.
    pub async fn fetch_logs(&self, job_id: &str) -> Result<Vec<JobLogEntry>, SyncError> {
        self.ensure_running()?;

        let records = self.api.job_logs(job_id).await.map_err(|e| {
            self.shared.report_failure("Error fetching job logs", &e);
            e
        })?;
        self.ensure_running()?;

        let now = Utc::now();
        let entries: Vec<JobLogEntry> = records.into_iter().map(|r| r.into_entry(now)).collect();
        let stored = self
            .shared
            .board
            .write()
            .await
            .replace_logs(job_id, entries.clone());

        if stored {
            tracing::debug!(job_id = %job_id, count = entries.len(), "Job log history loaded");
        } else {
            tracing::debug!(job_id = %job_id, "Discarding history for a job no longer tracked");
        }
        Ok(entries)
    }

    /// All jobs, newest first.
    pub async fn jobs(&self) -> Vec<Job> {
        self.shared.board.read().await.jobs()
    }

    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.shared.board.read().await.get(job_id).cloned()
    }

    pub async fn logs(&self, job_id: &str) -> Vec<JobLogEntry> {
        self.shared.board.read().await.logs(job_id).to_vec()
    }

    /// Ids of pending or running jobs, sorted.
    pub async fn active_job_ids(&self) -> Vec<String> {
        self.shared.board.read().await.active_ids()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.subscribe()
    }

    /// Stop both tasks, waiting up to five seconds for each.
    ///
    /// Results of calls still in flight are discarded.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job sync engine");
        self.shared.cancel.cancel();

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await.is_err() {
                tracing::warn!("Sync task did not stop in time");
            }
        }

        self.shared.transition(ConnectionEvent::Shutdown);
        tracing::info!("Job sync engine shut down complete");
    }

    // ---- private helpers ----

    fn ensure_running(&self) -> Result<(), SyncError> {
        if self.shared.cancel.is_cancelled() {
            return Err(SyncError::ShutDown);
        }
        Ok(())
    }
}

/// Push task: connect -> process frames -> reconnect.
///
/// Runs until cancelled or until the retry budget is spent, after which
/// the engine stays poll-only.
async fn run_push_loop(
    shared: Arc<SyncShared>,
    client: PushClient,
    config: ReconnectConfig,
    cancel: CancellationToken,
) {
    shared.transition(ConnectionEvent::Dial);

    let first = tokio::select! {
        _ = cancel.cancelled() => return,
        result = client.connect() => result,
    };

    let mut conn = match first {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "Push channel connection failed, entering reconnect loop");
            match redial(&shared, &client, &config, &cancel).await {
                Some(conn) => conn,
                None => return,
            }
        }
    };

    loop {
        shared.transition(ConnectionEvent::Opened);

        if let Err(e) = process_frames(&mut conn.ws_stream, &shared, &cancel).await {
            tracing::warn!(error = %e, "Push channel failed");
        }

        if cancel.is_cancelled() {
            return;
        }

        tracing::info!(client_id = %conn.client_id, "Push channel lost, entering reconnect loop");
        conn = match redial(&shared, &client, &config, &cancel).await {
            Some(conn) => conn,
            None => return,
        };
    }
}

async fn redial(
    shared: &SyncShared,
    client: &PushClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<PushConnection> {
    match reconnect_loop(client, config, cancel, |event| shared.transition(event)).await {
        ReconnectOutcome::Connected(conn) => Some(conn),
        ReconnectOutcome::Exhausted => {
            shared.transition(ConnectionEvent::GaveUp);
            shared.notice(
                NoticeLevel::Error,
                "Live updates unavailable, falling back to polling".to_string(),
            );
            None
        }
        ReconnectOutcome::Cancelled => None,
    }
}

/// Poller: one `GET /jobs/{id}` per active job per tick.
///
/// The active set is recomputed whenever the status composition changes.
/// With nothing active the task sleeps until the next change.
async fn run_poller(
    shared: Arc<SyncShared>,
    api: Arc<dyn JobApi>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut composition = shared.composition.subscribe();

    loop {
        let active: Vec<String> = composition
            .borrow_and_update()
            .iter()
            .filter(|(_, status)| status.is_active())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        if active.is_empty() {
            tracing::debug!("No active jobs, poller idle");
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = composition.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = composition.changed() => {
                if changed.is_err() {
                    return;
                }
                continue;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        poll_once(&shared, api.as_ref(), &active, &cancel).await;
    }
}

async fn poll_once(
    shared: &SyncShared,
    api: &dyn JobApi,
    job_ids: &[String],
    cancel: &CancellationToken,
) {
    tracing::debug!(count = job_ids.len(), "Polling active jobs");

    let polls = job_ids
        .iter()
        .map(|job_id| async move { (job_id, api.get_job(job_id).await) });
    let results = futures::future::join_all(polls).await;

    if cancel.is_cancelled() {
        return;
    }

    for (job_id, result) in results {
        match result {
            Ok(snapshot) => {
                shared.apply(snapshot, UpdateSource::Poll).await;
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Poll failed, retrying next tick");
                shared.notice(NoticeLevel::Error, format!("Error polling job {job_id}: {e}"));
            }
        }
    }
}
