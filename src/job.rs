//! Job identity and state types.
//!
//! The job state machine, as observed by a client:
//!
//! ```text
//!   run_job() ──→ Queued ⇄ QueuedHeld
//!                   │
//!                   ▼
//!                Running ⇄ Suspended
//!                   │  │
//!                   │  └──→ Requeued ⇄ RequeuedHeld ──→ Running
//!                   ▼
//!              Done | Failed
//! ```
//!
//! Transitions are driven by the scheduler. Control verbs only *request* a
//! transition.
//!
//! **Groups used by the wait primitives:**
//! - *Started*: `Running`, `Suspended`, `Done`, `Failed`.
//! - *Terminated*: `Done`, `Failed`. Terminal states are permanent.
//! - *Pending*: `Undetermined`, `Queued`, `QueuedHeld`, `Requeued`, `RequeuedHeld`.

use serde::{Deserialize, Serialize};

/// Backend-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Backend-assigned identifier of a job array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobArrayId(pub String);

impl JobArrayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for JobArrayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DRMAA2 job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// The backend cannot currently tell.
    Undetermined,
    Queued,
    QueuedHeld,
    Running,
    Suspended,
    Requeued,
    RequeuedHeld,
    /// Finished successfully.
    Done,
    /// Finished unsuccessfully, including termination on request.
    Failed,
}

impl JobState {
    /// Every state, in declaration order.
    pub const ALL: [JobState; 9] = [
        JobState::Undetermined,
        JobState::Queued,
        JobState::QueuedHeld,
        JobState::Running,
        JobState::Suspended,
        JobState::Requeued,
        JobState::RequeuedHeld,
        JobState::Done,
        JobState::Failed,
    ];

    /// Check if the job has been dispatched at least once.
    pub fn is_started(self) -> bool {
        matches!(
            self,
            JobState::Running | JobState::Suspended | JobState::Done | JobState::Failed
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminated(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Check if the job satisfies neither wait condition yet.
    pub fn is_pending(self) -> bool {
        !self.is_started()
    }

    /// Apply an observed state on top of `self`, keeping terminal states
    /// sticky. Returns the state the client must report.
    pub fn observe(self, next: JobState) -> JobState {
        if self.is_terminated() { self } else { next }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Undetermined => "UNDETERMINED",
            JobState::Queued => "QUEUED",
            JobState::QueuedHeld => "QUEUED_HELD",
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
            JobState::Requeued => "REQUEUED",
            JobState::RequeuedHeld => "REQUEUED_HELD",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A control verb a client can request on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobControl {
    Suspend,
    Resume,
    Hold,
    Release,
    Terminate,
}

impl JobControl {
    /// Whether the verb is meaningful from `state`.
    ///
    /// `Undetermined` is accepted for every verb: the client cannot judge it
    /// and the backend's own rejection applies.
    pub fn is_eligible_from(self, state: JobState) -> bool {
        if state == JobState::Undetermined {
            return true;
        }
        match self {
            JobControl::Suspend => state == JobState::Running,
            JobControl::Resume => state == JobState::Suspended,
            JobControl::Hold => matches!(state, JobState::Queued | JobState::Requeued),
            JobControl::Release => matches!(state, JobState::QueuedHeld | JobState::RequeuedHeld),
            JobControl::Terminate => !state.is_terminated(),
        }
    }

    /// The state a backend moves the job to when it honors the verb.
    pub fn target_state(self, from: JobState) -> JobState {
        match (self, from) {
            (JobControl::Suspend, _) => JobState::Suspended,
            (JobControl::Resume, _) => JobState::Running,
            (JobControl::Hold, JobState::Requeued) => JobState::RequeuedHeld,
            (JobControl::Hold, _) => JobState::QueuedHeld,
            (JobControl::Release, JobState::RequeuedHeld) => JobState::Requeued,
            (JobControl::Release, _) => JobState::Queued,
            (JobControl::Terminate, _) => JobState::Failed,
        }
    }
}

impl std::fmt::Display for JobControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobControl::Suspend => "suspend",
            JobControl::Resume => "resume",
            JobControl::Hold => "hold",
            JobControl::Release => "release",
            JobControl::Terminate => "terminate",
        };
        f.write_str(name)
    }
}
