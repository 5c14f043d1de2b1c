//! Backend capability introspection.
//!
//! A backend describes itself once, at construction, with a [`Capabilities`]
//! value: which optional DRMAA2 features it implements, the identity of the
//! DRM system behind it, and the extension attributes it appends to the
//! standard records. The value is cached and never changes for the lifetime
//! of the backend, so [`Capabilities::supports`] is pure.

use serde::{Deserialize, Serialize};

use crate::error::{DrmaaError, DrmaaResult};
use crate::info::Version;
use crate::schema::AttributeSchema;

/// Optional DRMAA2 features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// Reservation sessions are available.
    AdvanceReservation,
    /// Reservations may request slot counts.
    ReserveSlots,
    /// Event notification callbacks are delivered.
    Callback,
    /// `max_parallel` is honored for bulk submissions.
    BulkJobsMaxparallel,
    /// `JobTemplate` email fields.
    JtEmail,
    /// `JobTemplate` file staging fields.
    JtStaging,
    /// `JobTemplate::deadline_time`.
    JtDeadline,
    /// `JobTemplate::max_slots`.
    JtMaxslots,
    /// `JobTemplate::accounting_id`.
    JtAccountingid,
    /// `ReservationTemplate` start time of "now".
    RtStartnow,
    /// `ReservationTemplate::duration`.
    RtDuration,
    /// `ReservationTemplate::machine_os`.
    RtMachineos,
    /// `ReservationTemplate::machine_arch`.
    RtMachinearch,
}

impl Capability {
    pub const ALL: [Capability; 13] = [
        Capability::AdvanceReservation,
        Capability::ReserveSlots,
        Capability::Callback,
        Capability::BulkJobsMaxparallel,
        Capability::JtEmail,
        Capability::JtStaging,
        Capability::JtDeadline,
        Capability::JtMaxslots,
        Capability::JtAccountingid,
        Capability::RtStartnow,
        Capability::RtDuration,
        Capability::RtMachineos,
        Capability::RtMachinearch,
    ];
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::AdvanceReservation => "ADVANCE_RESERVATION",
            Capability::ReserveSlots => "RESERVE_SLOTS",
            Capability::Callback => "CALLBACK",
            Capability::BulkJobsMaxparallel => "BULK_JOBS_MAXPARALLEL",
            Capability::JtEmail => "JT_EMAIL",
            Capability::JtStaging => "JT_STAGING",
            Capability::JtDeadline => "JT_DEADLINE",
            Capability::JtMaxslots => "JT_MAXSLOTS",
            Capability::JtAccountingid => "JT_ACCOUNTINGID",
            Capability::RtStartnow => "RT_STARTNOW",
            Capability::RtDuration => "RT_DURATION",
            Capability::RtMachineos => "RT_MACHINEOS",
            Capability::RtMachinearch => "RT_MACHINEARCH",
        };
        f.write_str(name)
    }
}

/// Self-description of a DRMAA2 backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Name of the DRM system.
    pub drms_name: String,
    /// Version of the DRM system.
    pub drms_version: Version,
    /// Name of the DRMAA2 implementation.
    pub drmaa_name: String,
    /// DRMAA version implemented.
    pub drmaa_version: Version,
    /// Optional features the backend implements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported: Vec<Capability>,
    /// Extension attributes appended to the standard records.
    #[serde(default)]
    pub schema: AttributeSchema,
}

impl Capabilities {
    /// A backend with no optional features.
    pub fn minimal(drms_name: impl Into<String>, drms_version: Version) -> Self {
        Self {
            drms_name: drms_name.into(),
            drms_version,
            drmaa_name: "drmaa2-rs".into(),
            drmaa_version: Version::new(2, 0),
            supported: vec![],
            schema: AttributeSchema::default(),
        }
    }

    /// A backend implementing every optional feature.
    pub fn full(drms_name: impl Into<String>, drms_version: Version) -> Self {
        Self::minimal(drms_name, drms_version).with_supported(Capability::ALL)
    }

    /// Add supported capabilities.
    pub fn with_supported(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        for cap in caps {
            if !self.supported.contains(&cap) {
                self.supported.push(cap);
            }
        }
        self.supported.sort();
        self
    }

    /// Remove a capability.
    pub fn without(mut self, cap: Capability) -> Self {
        self.supported.retain(|c| *c != cap);
        self
    }

    /// Attach an extension schema.
    pub fn with_schema(mut self, schema: AttributeSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Check whether an optional feature is implemented.
    pub fn supports(&self, cap: Capability) -> bool {
        self.supported.contains(&cap)
    }

    /// Fail with `UnsupportedAttribute` if `cap` is missing.
    pub(crate) fn require_attribute(&self, cap: Capability, field: &str) -> DrmaaResult<()> {
        if self.supports(cap) {
            Ok(())
        } else {
            Err(DrmaaError::UnsupportedAttribute(format!(
                "{field} requires capability {cap}"
            )))
        }
    }

    /// Fail with `UnsupportedOperation` if `cap` is missing.
    pub(crate) fn require_operation(&self, cap: Capability, operation: &str) -> DrmaaResult<()> {
        if self.supports(cap) {
            Ok(())
        } else {
            Err(DrmaaError::UnsupportedOperation(format!(
                "{operation} requires capability {cap}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_supports_nothing() {
        let caps = Capabilities::minimal("slurm", Version::new(23, 11));
        for cap in Capability::ALL {
            assert!(!caps.supports(cap));
        }
        assert_eq!(caps.drmaa_version, Version::new(2, 0));
    }

    #[test]
    fn test_full_and_without() {
        let caps = Capabilities::full("mock", Version::new(1, 0)).without(Capability::Callback);
        assert!(caps.supports(Capability::AdvanceReservation));
        assert!(!caps.supports(Capability::Callback));
        assert_eq!(caps.supported.len(), Capability::ALL.len() - 1);
    }

    #[test]
    fn test_with_supported_dedups() {
        let caps = Capabilities::minimal("mock", Version::new(1, 0))
            .with_supported([Capability::Callback, Capability::Callback]);
        assert_eq!(caps.supported, vec![Capability::Callback]);
    }

    #[test]
    fn test_require_errors() {
        let caps = Capabilities::minimal("mock", Version::new(1, 0));
        assert!(matches!(
            caps.require_attribute(Capability::JtEmail, "email"),
            Err(DrmaaError::UnsupportedAttribute(_))
        ));
        assert!(matches!(
            caps.require_operation(Capability::Callback, "register_event_notification"),
            Err(DrmaaError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_capability_serde_names() {
        assert_eq!(
            serde_json::to_string(&Capability::BulkJobsMaxparallel).unwrap(),
            "\"BULK_JOBS_MAXPARALLEL\""
        );
        assert_eq!(Capability::RtStartnow.to_string(), "RT_STARTNOW");
    }
}
