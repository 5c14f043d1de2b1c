//! Submission descriptors: [`JobTemplate`] and [`ReservationTemplate`].
//!
//! Templates are plain values. They are validated against the backend's
//! [`Capabilities`] before anything is sent to the DRM system.
//!
//! # Placeholders
//!
//! | Placeholder | Where | Replaced by |
//! |-------------|-------|-------------|
//! | [`PARAMETRIC_INDEX`] | any string field | the member index, during bulk submission |
//! | [`HOME_DIR`] | prefix of `working_directory` and the I/O paths | the backend |
//! | [`WORKING_DIR`] | prefix of the I/O paths | the backend |

use std::time::Duration;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::capability::{Capabilities, Capability};
use crate::error::{DrmaaError, DrmaaResult};
use crate::info::{CpuArchitecture, OperatingSystem, ReservationId};
use crate::schema::{Extensions, Record, RecordKind};

/// Replaced by the user's home directory on the execution host.
pub const HOME_DIR: &str = "$DRMAA2_HOME_DIR$";
/// Replaced by the job's working directory on the execution host.
pub const WORKING_DIR: &str = "$DRMAA2_WORKING_DIR$";
/// Replaced by the member index of a bulk job.
pub const PARAMETRIC_INDEX: &str = "$DRMAA2_INDEX$";

/// Keys of [`JobTemplate::resource_limits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceLimit {
    CoreFileSize,
    CpuTime,
    DataSize,
    FileSize,
    OpenFiles,
    StackSize,
    VirtualMemory,
    WallclockTime,
}

/// Description of a job submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTemplate {
    pub remote_command: Option<String>,
    pub args: Option<Vec<String>>,
    pub submit_as_hold: Option<bool>,
    pub rerunnable: Option<bool>,
    pub job_environment: Option<FxHashMap<String, String>>,
    pub working_directory: Option<String>,
    pub job_category: Option<String>,
    pub email: Option<Vec<String>>,
    pub email_on_started: Option<bool>,
    pub email_on_terminated: Option<bool>,
    pub job_name: Option<String>,
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    pub error_path: Option<String>,
    pub join_files: Option<bool>,
    pub reservation_id: Option<ReservationId>,
    pub queue_name: Option<String>,
    pub min_slots: Option<u64>,
    pub max_slots: Option<u64>,
    pub priority: Option<i64>,
    pub candidate_machines: Option<Vec<String>>,
    /// Kibibytes.
    pub min_phys_memory: Option<u64>,
    pub machine_os: Option<OperatingSystem>,
    pub machine_arch: Option<CpuArchitecture>,
    pub start_time: Option<DateTime<Utc>>,
    pub deadline_time: Option<DateTime<Utc>>,
    /// Source path → target path.
    pub stage_in_files: Option<FxHashMap<String, String>>,
    /// Source path → target path.
    pub stage_out_files: Option<FxHashMap<String, String>>,
    pub resource_limits: Option<FxHashMap<ResourceLimit, String>>,
    pub accounting_id: Option<String>,
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl JobTemplate {
    /// Template running `command`.
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            remote_command: Some(command.into()),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn held(mut self) -> Self {
        self.submit_as_hold = Some(true);
        self
    }

    /// Copy of this template with every [`PARAMETRIC_INDEX`] replaced by
    /// `index`.
    pub fn with_parametric_index(&self, index: u64) -> JobTemplate {
        let idx = index.to_string();
        let sub = |s: &mut String| {
            if s.contains(PARAMETRIC_INDEX) {
                *s = s.replace(PARAMETRIC_INDEX, &idx);
            }
        };
        let sub_opt = |o: &mut Option<String>| {
            if let Some(s) = o.as_mut() {
                sub(s);
            }
        };
        let sub_list = |o: &mut Option<Vec<String>>| {
            o.iter_mut().flatten().for_each(|s| sub(s));
        };
        let sub_map = |o: &mut Option<FxHashMap<String, String>>| {
            if let Some(map) = o.take() {
                *o = Some(
                    map.into_iter()
                        .map(|(mut k, mut v)| {
                            sub(&mut k);
                            sub(&mut v);
                            (k, v)
                        })
                        .collect(),
                );
            }
        };

        let mut jt = self.clone();
        sub_opt(&mut jt.remote_command);
        sub_list(&mut jt.args);
        sub_map(&mut jt.job_environment);
        sub_opt(&mut jt.working_directory);
        sub_opt(&mut jt.job_category);
        sub_list(&mut jt.email);
        sub_opt(&mut jt.job_name);
        sub_opt(&mut jt.input_path);
        sub_opt(&mut jt.output_path);
        sub_opt(&mut jt.error_path);
        sub_opt(&mut jt.queue_name);
        sub_list(&mut jt.candidate_machines);
        sub_map(&mut jt.stage_in_files);
        sub_map(&mut jt.stage_out_files);
        sub_opt(&mut jt.accounting_id);
        if let Some(ReservationId(id)) = jt.reservation_id.as_mut() {
            sub(id);
        }
        if let Some(limits) = jt.resource_limits.as_mut() {
            limits.values_mut().for_each(|v| sub(v));
        }
        for (_, value) in jt.extensions.iter_mut() {
            if let serde_json::Value::String(s) = value {
                sub(s);
            }
        }
        jt
    }

    /// Validate bounds, placeholders and capability-gated fields.
    pub fn validate(&self, caps: &Capabilities) -> DrmaaResult<()> {
        check_slot_bounds(self.min_slots, self.max_slots)?;
        if let (Some(start), Some(deadline)) = (self.start_time, self.deadline_time) {
            if deadline < start {
                return Err(DrmaaError::InvalidArgument(format!(
                    "deadline_time {deadline} precedes start_time {start}"
                )));
            }
        }

        check_prefix_placeholders(
            "working_directory",
            self.working_directory.as_deref(),
            &[HOME_DIR],
        )?;
        for (field, value) in [
            ("input_path", &self.input_path),
            ("output_path", &self.output_path),
            ("error_path", &self.error_path),
        ] {
            check_prefix_placeholders(field, value.as_deref(), &[HOME_DIR, WORKING_DIR])?;
        }

        if self.email.is_some()
            || self.email_on_started.is_some()
            || self.email_on_terminated.is_some()
        {
            caps.require_attribute(Capability::JtEmail, "email")?;
        }
        if self.stage_in_files.is_some() || self.stage_out_files.is_some() {
            caps.require_attribute(Capability::JtStaging, "stage_in_files/stage_out_files")?;
        }
        if self.deadline_time.is_some() {
            caps.require_attribute(Capability::JtDeadline, "deadline_time")?;
        }
        if self.max_slots.is_some() {
            caps.require_attribute(Capability::JtMaxslots, "max_slots")?;
        }
        if self.accounting_id.is_some() {
            caps.require_attribute(Capability::JtAccountingid, "accounting_id")?;
        }
        caps.schema.check(self)
    }
}

impl Record for JobTemplate {
    const KIND: RecordKind = RecordKind::JobTemplate;
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("remote_command", "Executable to run on the execution host"),
        ("args", "Command-line arguments"),
        ("submit_as_hold", "Submit the job in a held state"),
        ("rerunnable", "Whether the job may be rerun after a failure"),
        ("job_environment", "Environment variables for the job"),
        ("working_directory", "Working directory on the execution host"),
        ("job_category", "Site-defined job category"),
        ("email", "Addresses to notify"),
        ("email_on_started", "Send mail when the job starts"),
        ("email_on_terminated", "Send mail when the job terminates"),
        ("job_name", "Human-readable job name"),
        ("input_path", "Standard input source"),
        ("output_path", "Standard output target"),
        ("error_path", "Standard error target"),
        ("join_files", "Merge standard error into standard output"),
        ("reservation_id", "Advance reservation to run in"),
        ("queue_name", "Queue to submit to"),
        ("min_slots", "Minimum number of slots"),
        ("max_slots", "Maximum number of slots"),
        ("priority", "Scheduling priority"),
        ("candidate_machines", "Hosts the job may run on"),
        ("min_phys_memory", "Minimum physical memory in KiB"),
        ("machine_os", "Required operating system"),
        ("machine_arch", "Required CPU architecture"),
        ("start_time", "Earliest start time"),
        ("deadline_time", "Time by which the job must finish"),
        ("stage_in_files", "Files copied to the execution host"),
        ("stage_out_files", "Files copied back from the execution host"),
        ("resource_limits", "Resource limits keyed by limit name"),
        ("accounting_id", "Accounting identifier"),
    ];

    fn extensions(&self) -> Option<&Extensions> {
        Some(&self.extensions)
    }
}

/// Start of a requested reservation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStart {
    /// As soon as the request is granted. Needs `RT_STARTNOW`.
    Now,
    At(DateTime<Utc>),
}

/// Description of an advance reservation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationTemplate {
    pub reservation_name: Option<String>,
    pub start_time: Option<ReservationStart>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub min_slots: Option<u64>,
    pub max_slots: Option<u64>,
    pub job_category: Option<String>,
    pub users_acl: Option<Vec<String>>,
    pub candidate_machines: Option<Vec<String>>,
    /// Kibibytes.
    pub min_phys_memory: Option<u64>,
    pub machine_os: Option<OperatingSystem>,
    pub machine_arch: Option<CpuArchitecture>,
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl ReservationTemplate {
    /// Validate slot bounds, window ordering and capability-gated fields.
    pub fn validate(&self, caps: &Capabilities) -> DrmaaResult<()> {
        check_slot_bounds(self.min_slots, self.max_slots)?;

        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(DrmaaError::InvalidArgument("duration must be positive".into()));
        }
        if let (Some(ReservationStart::At(start)), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                return Err(DrmaaError::InvalidArgument(format!(
                    "end_time {end} is not after start_time {start}"
                )));
            }
            if let Some(duration) = self.duration {
                let window = (end - start).to_std().unwrap_or_default();
                if duration > window {
                    return Err(DrmaaError::InvalidArgument(format!(
                        "duration {duration:?} exceeds the window {window:?}"
                    )));
                }
            }
        }

        if self.start_time == Some(ReservationStart::Now) {
            caps.require_attribute(Capability::RtStartnow, "start_time")?;
        }
        if self.duration.is_some() {
            caps.require_attribute(Capability::RtDuration, "duration")?;
        }
        if self.machine_os.is_some() {
            caps.require_attribute(Capability::RtMachineos, "machine_os")?;
        }
        if self.machine_arch.is_some() {
            caps.require_attribute(Capability::RtMachinearch, "machine_arch")?;
        }
        if self.min_slots.is_some() || self.max_slots.is_some() {
            caps.require_attribute(Capability::ReserveSlots, "min_slots/max_slots")?;
        }
        caps.schema.check(self)
    }
}

impl Record for ReservationTemplate {
    const KIND: RecordKind = RecordKind::ReservationTemplate;
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("reservation_name", "Human-readable reservation name"),
        ("start_time", "Start of the requested window"),
        ("end_time", "End of the requested window"),
        ("duration", "Length of the reservation"),
        ("min_slots", "Minimum number of slots"),
        ("max_slots", "Maximum number of slots"),
        ("job_category", "Site-defined job category"),
        ("users_acl", "Users allowed to use the reservation"),
        ("candidate_machines", "Hosts the reservation may use"),
        ("min_phys_memory", "Minimum physical memory in KiB"),
        ("machine_os", "Required operating system"),
        ("machine_arch", "Required CPU architecture"),
    ];

    fn extensions(&self) -> Option<&Extensions> {
        Some(&self.extensions)
    }
}

fn check_slot_bounds(min: Option<u64>, max: Option<u64>) -> DrmaaResult<()> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(DrmaaError::InvalidArgument(format!(
            "min_slots {min} exceeds max_slots {max}"
        ))),
        _ => Ok(()),
    }
}

/// `allowed` placeholders may only open the value; none may appear later.
fn check_prefix_placeholders(
    field: &str,
    value: Option<&str>,
    allowed: &[&str],
) -> DrmaaResult<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let rest = allowed
        .iter()
        .find_map(|p| value.strip_prefix(p))
        .unwrap_or(value);
    for placeholder in [HOME_DIR, WORKING_DIR] {
        if rest.contains(placeholder) {
            return Err(DrmaaError::InvalidArgument(format!(
                "{placeholder} is only allowed at the start of {field}"
            )));
        }
    }
    Ok(())
}
