//! Vector-generation job model and field-level merge rules.
//!
//! A [`Job`] is the locally reconciled view of one background job. Every
//! source that knows something about a job (creation acknowledgement,
//! push frame, poll response, list fetch) is decoded into a
//! [`JobSnapshot`] and folded into the stored job with [`Job::merge`].
//!
//! Merging is a shallow, field-level overwrite with three guards that keep
//! late-arriving stale snapshots from regressing newer state:
//!
//! - status only moves forward along `pending -> running -> {completed, failed}`;
//! - progress never decreases while the job stays `running`;
//! - a result, once set, is never replaced.
//!
//! Snapshots that carry a server sequence number (`seq`) are additionally
//! rejected when they are not newer than the last applied one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{lenient_timestamp, Timestamp};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the worker queue. The job service reports this as `queued`.
    #[serde(alias = "queued")]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Position along the lifecycle. Both terminal states share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether the job still needs polling.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Whether moving from `self` to `next` respects the lifecycle order.
    ///
    /// Re-reporting the current status is allowed; switching between the
    /// two terminal states is not.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locally reconciled state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Server-assigned unique identifier.
    pub job_id: String,
    /// Owning identity, when the job service reports it.
    #[serde(default)]
    pub user_id: Option<String>,
    /// The text originally submitted for vector generation. Write-once.
    #[serde(default)]
    pub search_text: Option<String>,
    pub status: JobStatus,
    /// Completion percentage in `0.0..=100.0`.
    #[serde(default)]
    pub progress: f64,
    /// Present only once the job completed. Immutable once set.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Present only when the job failed.
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp::deserialize")]
    pub created_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp::deserialize")]
    pub completed_at: Option<Timestamp>,
    /// Queue position, meaningful only while pending.
    #[serde(default)]
    pub position: Option<i64>,
    /// Local receipt time of the last applied update. Display only.
    #[serde(skip)]
    pub last_update: Option<Timestamp>,
    /// Highest server sequence number applied so far.
    #[serde(skip)]
    pub last_seq: Option<u64>,
}

/// A partial or full copy of a job's fields as received from the network.
///
/// Every field except `job_id` is optional; an absent (or `null`) field
/// means "unchanged" and never clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp::deserialize"
    )]
    pub created_at: Option<Timestamp>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp::deserialize"
    )]
    pub completed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    /// Monotonic per-job sequence number stamped by the job service, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl JobSnapshot {
    /// Snapshot carrying only an id; the starting point for builders in tests
    /// and for creation acknowledgements.
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }
}

/// Acknowledgement returned by the job-submission endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JobCreated {
    pub job_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

/// What a merge did to the stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeResult {
    /// Fields were applied. `status_changed` is set when the status moved.
    Applied { status_changed: bool },
    /// The snapshot was older than the stored state and was discarded.
    Stale,
}

fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

impl Job {
    /// Build a new job from the first snapshot seen for its id.
    ///
    /// A snapshot without a status is assumed to describe a pending job.
    pub fn from_snapshot(snapshot: JobSnapshot, received_at: Timestamp) -> Self {
        Self {
            job_id: snapshot.job_id,
            user_id: snapshot.user_id,
            search_text: snapshot.search_text,
            status: snapshot.status.unwrap_or(JobStatus::Pending),
            progress: snapshot.progress.map(clamp_progress).unwrap_or(0.0),
            result: snapshot.result,
            error_message: snapshot.error_message,
            worker_id: snapshot.worker_id,
            created_at: snapshot.created_at,
            completed_at: snapshot.completed_at,
            position: snapshot.position,
            last_update: Some(received_at),
            last_seq: snapshot.seq,
        }
    }

    /// Fold a snapshot into this job.
    ///
    /// Present fields overwrite, absent fields are preserved. Returns
    /// [`MergeResult::Stale`] without touching anything when the snapshot
    /// would move the job backwards.
    pub fn merge(&mut self, snapshot: &JobSnapshot, received_at: Timestamp) -> MergeResult {
        if let (Some(incoming), Some(applied)) = (snapshot.seq, self.last_seq) {
            if incoming <= applied {
                return MergeResult::Stale;
            }
        }

        if let Some(next) = snapshot.status {
            if !self.status.can_advance_to(next) {
                return MergeResult::Stale;
            }
        }

        let status_changed = snapshot.status.is_some_and(|next| next != self.status);
        if let Some(next) = snapshot.status {
            self.status = next;
        }

        if let Some(progress) = snapshot.progress {
            let progress = clamp_progress(progress);
            let frozen = self.status.is_terminal() && !status_changed;
            let regresses =
                self.status == JobStatus::Running && !status_changed && progress < self.progress;
            if !frozen && !regresses {
                self.progress = progress;
            }
        }

        if self.search_text.is_none() {
            self.search_text.clone_from(&snapshot.search_text);
        }
        if self.result.is_none() {
            self.result.clone_from(&snapshot.result);
        }
        if snapshot.user_id.is_some() {
            self.user_id.clone_from(&snapshot.user_id);
        }
        if snapshot.error_message.is_some() {
            self.error_message.clone_from(&snapshot.error_message);
        }
        if snapshot.worker_id.is_some() {
            self.worker_id.clone_from(&snapshot.worker_id);
        }
        if snapshot.created_at.is_some() {
            self.created_at = snapshot.created_at;
        }
        if snapshot.completed_at.is_some() {
            self.completed_at = snapshot.completed_at;
        }
        if snapshot.position.is_some() {
            self.position = snapshot.position;
        }
        if snapshot.seq.is_some() {
            self.last_seq = snapshot.seq;
        }

        self.last_update = Some(received_at);
        MergeResult::Applied { status_changed }
    }
}
