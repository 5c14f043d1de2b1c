//! Read-only records reported by the DRM system.
//!
//! All fields are optional: a backend that cannot report a value leaves it
//! `None`. [`JobInfo`] doubles as a filter for job listings.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobState};
use crate::schema::{Extensions, Record, RecordKind};

/// Backend-assigned reservation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub String);

impl ReservationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `major.minor` version pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Record for Version {
    const KIND: RecordKind = RecordKind::Version;
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("major", "Major version number"),
        ("minor", "Minor version number"),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingSystem {
    OtherOs,
    Aix,
    Bsd,
    Linux,
    Hpux,
    Irix,
    Macos,
    Sunos,
    Tru64,
    Unixware,
    Win,
    Winnt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CpuArchitecture {
    OtherCpu,
    Alpha,
    Arm,
    Arm64,
    Cell,
    Parisc,
    Parisc64,
    X86,
    X64,
    Ia64,
    Mips,
    Mips64,
    Ppc,
    Ppc64,
    Ppc64le,
    Sparc,
    Sparc64,
}

/// Slots allocated on one machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub machine_name: Option<String>,
    pub slots: Option<u64>,
}

impl SlotInfo {
    pub fn new(machine_name: impl Into<String>, slots: u64) -> Self {
        Self {
            machine_name: Some(machine_name.into()),
            slots: Some(slots),
        }
    }
}

impl Record for SlotInfo {
    const KIND: RecordKind = RecordKind::SlotInfo;
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("machine_name", "Name of the machine providing the slots"),
        ("slots", "Number of slots on that machine"),
    ];
}

/// Snapshot of a job as reported by the DRM system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobInfo {
    pub job_id: Option<JobId>,
    pub job_name: Option<String>,
    pub exit_status: Option<i32>,
    pub terminating_signal: Option<String>,
    pub annotation: Option<String>,
    pub job_state: Option<JobState>,
    pub job_sub_state: Option<String>,
    pub allocated_machines: Option<Vec<SlotInfo>>,
    pub submission_machine: Option<String>,
    pub job_owner: Option<String>,
    pub slots: Option<u64>,
    pub queue_name: Option<String>,
    pub wallclock_time: Option<Duration>,
    pub cpu_time: Option<Duration>,
    pub submission_time: Option<DateTime<Utc>>,
    pub dispatch_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

fn field_matches<T: PartialEq>(filter: &Option<T>, value: &Option<T>) -> bool {
    match filter {
        None => true,
        Some(wanted) => value.as_ref() == Some(wanted),
    }
}

impl JobInfo {
    /// A filter selecting jobs in `state`.
    pub fn with_state(state: JobState) -> Self {
        Self {
            job_state: Some(state),
            ..Default::default()
        }
    }

    /// Check whether this job satisfies `filter`: every field set in the
    /// filter must be equal here.
    pub fn matches(&self, filter: &JobInfo) -> bool {
        field_matches(&filter.job_id, &self.job_id)
            && field_matches(&filter.job_name, &self.job_name)
            && field_matches(&filter.job_state, &self.job_state)
            && field_matches(&filter.queue_name, &self.queue_name)
            && field_matches(&filter.job_owner, &self.job_owner)
            && field_matches(&filter.exit_status, &self.exit_status)
            && field_matches(&filter.slots, &self.slots)
            && field_matches(&filter.submission_machine, &self.submission_machine)
    }
}

impl Record for JobInfo {
    const KIND: RecordKind = RecordKind::JobInfo;
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("job_id", "Backend identifier of the job"),
        ("job_name", "Name given in the job template"),
        ("exit_status", "Exit status of the job process"),
        ("terminating_signal", "Signal that terminated the job"),
        ("annotation", "Human-readable note from the DRM system"),
        ("job_state", "DRMAA2 state of the job"),
        ("job_sub_state", "Backend-specific sub state"),
        ("allocated_machines", "Machines and slots the job runs on"),
        ("submission_machine", "Machine the job was submitted from"),
        ("job_owner", "Owner of the job"),
        ("slots", "Total number of allocated slots"),
        ("queue_name", "Queue the job was placed in"),
        ("wallclock_time", "Accumulated wall-clock time"),
        ("cpu_time", "Accumulated CPU time"),
        ("submission_time", "Time the job was submitted"),
        ("dispatch_time", "Time the job was first dispatched"),
        ("finish_time", "Time the job reached a terminal state"),
    ];

    fn extensions(&self) -> Option<&Extensions> {
        Some(&self.extensions)
    }
}

/// A queue available for submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueInfo {
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl QueueInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

impl Record for QueueInfo {
    const KIND: RecordKind = RecordKind::QueueInfo;
    const FIELDS: &'static [(&'static str, &'static str)] = &[("name", "Queue name")];

    fn extensions(&self) -> Option<&Extensions> {
        Some(&self.extensions)
    }
}

/// An execution host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineInfo {
    pub name: Option<String>,
    pub available: Option<bool>,
    pub sockets: Option<u32>,
    pub cores_per_socket: Option<u32>,
    pub threads_per_core: Option<u32>,
    pub load: Option<f64>,
    /// Kibibytes.
    pub phys_memory: Option<u64>,
    /// Kibibytes.
    pub virt_memory: Option<u64>,
    pub machine_os: Option<OperatingSystem>,
    pub machine_os_version: Option<Version>,
    pub machine_arch: Option<CpuArchitecture>,
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl MachineInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

impl Record for MachineInfo {
    const KIND: RecordKind = RecordKind::MachineInfo;
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("name", "Host name"),
        ("available", "Whether the host accepts work"),
        ("sockets", "Number of CPU sockets"),
        ("cores_per_socket", "Cores per socket"),
        ("threads_per_core", "Hardware threads per core"),
        ("load", "One-minute load average"),
        ("phys_memory", "Physical memory in KiB"),
        ("virt_memory", "Virtual memory in KiB"),
        ("machine_os", "Operating system"),
        ("machine_os_version", "Operating system version"),
        ("machine_arch", "CPU architecture"),
    ];

    fn extensions(&self) -> Option<&Extensions> {
        Some(&self.extensions)
    }
}

/// Snapshot of an advance reservation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationInfo {
    pub reservation_id: Option<ReservationId>,
    pub reservation_name: Option<String>,
    pub reserved_start_time: Option<DateTime<Utc>>,
    pub reserved_end_time: Option<DateTime<Utc>>,
    pub users_acl: Option<Vec<String>>,
    pub reserved_slots: Option<u64>,
    pub reserved_machines: Option<Vec<SlotInfo>>,
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl Record for ReservationInfo {
    const KIND: RecordKind = RecordKind::ReservationInfo;
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("reservation_id", "Backend identifier of the reservation"),
        ("reservation_name", "Name given in the reservation template"),
        ("reserved_start_time", "Start of the reserved window"),
        ("reserved_end_time", "End of the reserved window"),
        ("users_acl", "Users allowed to use the reservation"),
        ("reserved_slots", "Number of reserved slots"),
        ("reserved_machines", "Machines and slots reserved"),
    ];

    fn extensions(&self) -> Option<&Extensions> {
        Some(&self.extensions)
    }
}
