//! Backend trait and the records it exchanges with the client layer.
//!
//! The [`Backend`] trait is the boundary to the DRM system. The client
//! layer validates arguments, tracks handles and implements the wait
//! primitives; the backend only submits, queries and controls.
//!
//! ```text
//!   capabilities() ──→ create_session() ──→ submit() ──→ job_state() ──→ reap()
//!    (sync, &ref)         (async)           (async)       (async)       (async)
//! ```
//!
//! ## Design principles
//!
//! - **Async-native**: all I/O methods are async.
//! - **Thread-safe**: `Send + Sync` bound enables shared ownership.
//! - **Infallible introspection**: `capabilities()` is synchronous and
//!   infallible. Capabilities are cached at construction, which keeps
//!   `supports()` stable for the lifetime of the backend.
//! - **Opaque persistence**: sessions are addressed by name only. How the
//!   backend keeps them across process restarts is its own business.
//!
//! ## Method table
//!
//! | Method | Kind | Required | Returns |
//! |--------|------|----------|---------|
//! | `name()` | sync | yes | `&str` |
//! | `capabilities()` | sync | yes | `&Capabilities` |
//! | `subscribe()` | sync | provided | `Option<broadcast::Receiver<Notification>>` |
//! | `create_session()` / `open_session()` / `destroy_session()` | async | yes | |
//! | `session_names()` | async | yes | `Vec<String>` |
//! | `submit()` / `submit_bulk()` | async | yes | `JobId` / `BulkSubmission` |
//! | `job_state()` / `job_info()` | async | yes | |
//! | `control()` / `reap()` | async | yes | `()` |
//! | `session_jobs()` / `job_array()` / `all_jobs()` | async | yes | |
//! | reservation methods | async | provided | `UnsupportedOperation` |
//! | `all_queues()` / `all_machines()` | async | yes | |

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::bulk::BulkRange;
use crate::capability::Capabilities;
use crate::error::{DrmaaError, DrmaaResult};
use crate::info::{JobInfo, MachineInfo, QueueInfo, ReservationId, ReservationInfo};
use crate::job::{JobArrayId, JobControl, JobId, JobState};
use crate::notification::Notification;
use crate::template::{JobTemplate, ReservationTemplate};

/// Trait for DRM system backends.
///
/// # Contract
///
/// - `capabilities()` MUST be synchronous, infallible and constant.
/// - `subscribe()` MUST return `Some` if and only if the backend supports
///   `Capability::Callback`.
/// - Unknown job, array, reservation or session names MUST be reported as
///   `InvalidArgument`.
/// - `submit()` starts the job in `Queued`, or `QueuedHeld` when the
///   template asks for it.
/// - `submit_bulk()` MUST return one job per member template, in order.
/// - A job in `Done` or `Failed` MUST never report another state.
/// - `control()` MAY reject a verb with `InvalidState`; the client layer
///   forwards that rejection unchanged.
/// - `reap()` MUST fail with `InvalidState` unless the job is terminated.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Get the capabilities of this backend.
    fn capabilities(&self) -> &Capabilities;

    /// Subscribe to the backend's event stream.
    fn subscribe(&self) -> Option<broadcast::Receiver<Notification>> {
        None
    }

    /// Create a named session. Fails with `InvalidArgument` if the name is
    /// taken.
    async fn create_session(&self, record: &SessionRecord) -> DrmaaResult<()>;

    /// Look up an existing session of the given kind.
    async fn open_session(&self, kind: SessionKind, name: &str) -> DrmaaResult<SessionRecord>;

    /// Remove a session. Its arrays are forgotten; its jobs and
    /// reservations stay visible to monitoring but belong to no session.
    async fn destroy_session(&self, name: &str) -> DrmaaResult<()>;

    /// Names of the sessions of one kind.
    async fn session_names(&self, kind: SessionKind) -> DrmaaResult<Vec<String>>;

    /// Submit one job.
    async fn submit(&self, session: &str, template: &JobTemplate) -> DrmaaResult<JobId>;

    /// Submit a job array. `request.members` already carries the
    /// index-substituted templates.
    async fn submit_bulk(
        &self,
        session: &str,
        request: &BulkRequest,
    ) -> DrmaaResult<BulkSubmission>;

    /// Current state and backend-specific sub state.
    async fn job_state(&self, job: &JobId) -> DrmaaResult<(JobState, String)>;

    async fn job_info(&self, job: &JobId) -> DrmaaResult<JobInfo>;

    /// Request a state transition.
    async fn control(&self, job: &JobId, verb: JobControl) -> DrmaaResult<()>;

    /// Drop all data about a terminated job. Afterwards the job is missing
    /// from every listing and queries for it fail with `InvalidArgument`.
    async fn reap(&self, job: &JobId) -> DrmaaResult<()>;

    /// Jobs submitted in a session, in submission order.
    async fn session_jobs(&self, session: &str) -> DrmaaResult<Vec<JobRecord>>;

    async fn job_array(&self, session: &str, id: &JobArrayId) -> DrmaaResult<JobArrayRecord>;

    /// Every job visible to the caller, including ones submitted elsewhere.
    async fn all_jobs(&self) -> DrmaaResult<Vec<JobRecord>>;

    async fn request_reservation(
        &self,
        _session: &str,
        _template: &ReservationTemplate,
    ) -> DrmaaResult<ReservationRecord> {
        Err(unsupported("request_reservation"))
    }

    async fn reservation_info(&self, _id: &ReservationId) -> DrmaaResult<ReservationInfo> {
        Err(unsupported("reservation_info"))
    }

    async fn terminate_reservation(&self, _id: &ReservationId) -> DrmaaResult<()> {
        Err(unsupported("terminate_reservation"))
    }

    async fn session_reservations(&self, _session: &str) -> DrmaaResult<Vec<ReservationRecord>> {
        Err(unsupported("session_reservations"))
    }

    /// Every reservation visible to the caller.
    async fn all_reservations(&self) -> DrmaaResult<Vec<ReservationRecord>> {
        Ok(vec![])
    }

    async fn all_queues(&self) -> DrmaaResult<Vec<QueueInfo>>;

    async fn all_machines(&self) -> DrmaaResult<Vec<MachineInfo>>;
}

fn unsupported(operation: &str) -> DrmaaError {
    DrmaaError::UnsupportedOperation(format!("{operation} is not implemented by this backend"))
}

/// Kind of a named session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    Job,
    Reservation,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Job => write!(f, "job"),
            SessionKind::Reservation => write!(f, "reservation"),
        }
    }
}

/// Durable description of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: String,
    pub kind: SessionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Job categories offered by the DRM system for this session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub job_categories: Vec<String>,
}

/// A job as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub session_name: String,
    pub template: JobTemplate,
    pub info: JobInfo,
}

/// Arguments of a bulk submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRequest {
    pub range: BulkRange,
    /// The template as given by the caller.
    pub template: JobTemplate,
    /// One substituted template per index of `range`.
    pub members: Vec<JobTemplate>,
    /// Concurrency hint. `None` means unbounded.
    pub max_parallel: Option<u64>,
}

/// Result of a bulk submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSubmission {
    pub array_id: JobArrayId,
    pub jobs: Vec<JobId>,
}

/// A job array as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobArrayRecord {
    pub array_id: JobArrayId,
    pub session_name: String,
    pub template: JobTemplate,
    /// Members still known to the backend, in index order.
    pub jobs: Vec<JobRecord>,
}

/// A reservation as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub reservation_id: ReservationId,
    pub session_name: String,
    pub template: ReservationTemplate,
}
