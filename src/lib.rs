//! DRMAA2 client contract for distributed resource management systems
//!
//! This crate provides a DRMAA2-style client layer: a vendor-neutral way to
//! submit, observe and control jobs and advance reservations on a cluster
//! scheduler. Any DRM system implements the [`Backend`] trait; the client
//! layer on top adds sessions, job handles, wait primitives with timeouts,
//! bulk submission and event notification.
//!
//! # Overview
//!
//! The crate defines:
//! - A [`Backend`] trait covering sessions, jobs, reservations and
//!   cluster introspection
//! - [`Capabilities`] / [`Capability`] describing optional features
//! - [`SessionManager`] as the entry point, handing out [`JobSession`],
//!   [`ReservationSession`] and [`MonitoringSession`]
//! - [`Job`] / [`JobArray`] / [`Reservation`] handles with the control verbs
//! - [`JobState`] with its started and terminated groups
//! - [`JobTemplate`] / [`ReservationTemplate`] and the info records
//! - [`Timeout`] with the [`INFINITE_TIME`] and [`ZERO_TIME`] sentinels
//! - [`DrmaaError`] with 12 error kinds plus the group-verb aggregate
//!
//! # Lifecycle
//!
//! ```text
//!   supports() ──→ create_job_session() ──→ run_job() ──→ wait_started() ──→ wait_terminated() ──→ reap()
//!    (sync)            (async)               (async)        (async)            (async)             (async)
//! ```
//!
//! ```no_run
//! use std::sync::Arc;
//! use drmaa2::{JobTemplate, SessionManager, Timeout};
//! use drmaa2::backend::mock::MockBackend;
//!
//! # async fn run() -> drmaa2::DrmaaResult<()> {
//! let manager = SessionManager::with_backend(Arc::new(MockBackend::new()))?;
//! let session = manager.create_job_session(Some("nightly"), None).await?;
//! let job = session
//!     .run_job(&JobTemplate::command("/bin/sleep").with_args(["10"]))
//!     .await?;
//! job.wait_terminated(Timeout::from_secs(60)?).await?;
//! job.reap().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod board;
pub mod bulk;
pub mod capability;
pub mod config;
pub mod error;
pub mod info;
pub mod job;
pub mod notification;
pub mod schema;
pub mod session;
pub mod template;
pub mod timeout;

pub use backend::Backend;
pub use bulk::BulkRange;
pub use capability::{Capabilities, Capability};
pub use config::ManagerConfig;
pub use error::{DrmaaError, DrmaaResult};
pub use info::{
    CpuArchitecture, JobInfo, MachineInfo, OperatingSystem, QueueInfo, ReservationId,
    ReservationInfo, SlotInfo, Version,
};
pub use job::{JobArrayId, JobControl, JobId, JobState};
pub use notification::{Event, EventCallback, Notification};
pub use schema::{AttributeSchema, Extensions, Record, RecordKind};
pub use session::{
    Job, JobArray, JobSession, MonitoringSession, Reservation, ReservationSession,
    SessionManager,
};
pub use template::{
    HOME_DIR, JobTemplate, PARAMETRIC_INDEX, ReservationStart, ReservationTemplate,
    ResourceLimit, WORKING_DIR,
};
pub use timeout::{INFINITE_TIME, Timeout, ZERO_TIME};
