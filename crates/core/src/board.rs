//! The reconciled `job_id -> Job` map plus per-job update logs.
//!
//! [`JobBoard`] is plain data with no I/O; the client's sync engine owns
//! one behind a lock and routes every source through [`JobBoard::apply`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobSnapshot, JobStatus, MergeResult};
use crate::types::Timestamp;

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// A `job_update` frame from the push channel.
    Push,
    /// A single-job poll response.
    Poll,
    /// The job list fetched on start or refresh.
    Fetch,
    /// Log history loaded from the job service.
    History,
}

/// One line in a job's update log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub timestamp: Timestamp,
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub worker: Option<String>,
    pub source: UpdateSource,
}

impl JobLogEntry {
    fn from_snapshot(snapshot: &JobSnapshot, source: UpdateSource, at: Timestamp) -> Self {
        Self {
            timestamp: at,
            status: snapshot.status,
            progress: snapshot.progress,
            worker: snapshot.worker_id.clone(),
            source,
        }
    }
}

/// Outcome of applying one snapshot to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No job with this id existed; it was inserted.
    Inserted,
    /// An existing job was updated.
    Updated { status_changed: bool },
    /// The snapshot was older than the stored state and was dropped.
    Stale,
}

impl ApplyOutcome {
    /// Whether the set of job statuses may have changed.
    pub fn changes_composition(self) -> bool {
        matches!(
            self,
            ApplyOutcome::Inserted
                | ApplyOutcome::Updated {
                    status_changed: true
                }
        )
    }
}

/// Sorted `job_id -> status` pairs. Two boards with equal compositions
/// poll the same set of jobs.
pub type StatusComposition = BTreeMap<String, JobStatus>;

/// Local reconciled job state.
#[derive(Debug, Default, Clone)]
pub struct JobBoard {
    jobs: HashMap<String, Job>,
    logs: HashMap<String, Vec<JobLogEntry>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly submitted job.
    ///
    /// If a push frame for the same id won the race and created the entry
    /// already, only the submitted text is filled in; the status is left
    /// where the push put it. Returns `true` when a new entry was inserted.
    pub fn insert_created(&mut self, job_id: &str, search_text: &str, at: Timestamp) -> bool {
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.search_text.get_or_insert_with(|| search_text.to_string());
            return false;
        }

        let mut snapshot = JobSnapshot::new(job_id);
        snapshot.status = Some(JobStatus::Pending);
        snapshot.search_text = Some(search_text.to_string());
        snapshot.created_at = Some(at);
        self.jobs
            .insert(job_id.to_string(), Job::from_snapshot(snapshot, at));
        true
    }

    /// Merge a snapshot and append a log entry for it.
    ///
    /// Stale snapshots are dropped without a log entry.
    pub fn apply(
        &mut self,
        snapshot: JobSnapshot,
        source: UpdateSource,
        at: Timestamp,
    ) -> ApplyOutcome {
        let entry = JobLogEntry::from_snapshot(&snapshot, source, at);
        let job_id = snapshot.job_id.clone();

        let outcome = match self.jobs.get_mut(&job_id) {
            Some(job) => match job.merge(&snapshot, at) {
                MergeResult::Applied { status_changed } => ApplyOutcome::Updated { status_changed },
                MergeResult::Stale => {
                    tracing::debug!(job_id = %job_id, ?source, "Dropping stale job snapshot");
                    return ApplyOutcome::Stale;
                }
            },
            None => {
                self.jobs
                    .insert(job_id.clone(), Job::from_snapshot(snapshot, at));
                ApplyOutcome::Inserted
            }
        };

        self.logs.entry(job_id).or_default().push(entry);
        outcome
    }

    /// Remove a job and its log. Returns the removed job, if it existed.
    pub fn remove(&mut self, job_id: &str) -> Option<Job> {
        self.logs.remove(job_id);
        self.jobs.remove(job_id)
    }

    /// Drop every job and every log.
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.logs.clear();
    }

    /// Replace a job's log with server-side history.
    ///
    /// Returns `false` and stores nothing when the job is not on the board.
    pub fn replace_logs(&mut self, job_id: &str, entries: Vec<JobLogEntry>) -> bool {
        if !self.jobs.contains_key(job_id) {
            return false;
        }
        self.logs.insert(job_id.to_string(), entries);
        true
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    /// All jobs, newest first (by `created_at`, then id).
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        jobs
    }

    pub fn logs(&self, job_id: &str) -> &[JobLogEntry] {
        self.logs.get(job_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids of jobs that are pending or running, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .jobs
            .values()
            .filter(|job| job.status.is_active())
            .map(|job| job.job_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn composition(&self) -> StatusComposition {
        self.jobs
            .values()
            .map(|job| (job.job_id.clone(), job.status))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Total number of log entries across all jobs.
    pub fn log_count(&self) -> usize {
        self.logs.values().map(Vec::len).sum()
    }
}
