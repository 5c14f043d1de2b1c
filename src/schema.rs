//! Attribute descriptions and backend extension fields.
//!
//! Every standard record carries a fixed set of mandatory fields plus an open
//! [`Extensions`] map. A backend declares which extension names it
//! understands, per record kind, in an [`AttributeSchema`]. Reading an
//! extension the backend never set resolves to `None`; submitting one it
//! never declared is rejected.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{DrmaaError, DrmaaResult};

/// The record types that accept extension fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    JobTemplate,
    JobInfo,
    ReservationTemplate,
    ReservationInfo,
    QueueInfo,
    MachineInfo,
    Notification,
    SlotInfo,
    Version,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Implemented by every standard record.
pub trait Record {
    const KIND: RecordKind;

    /// Mandatory fields as `(snake_case name, description)` pairs.
    const FIELDS: &'static [(&'static str, &'static str)];

    /// Backend-specific extension values, if the record has any.
    fn extensions(&self) -> Option<&Extensions> {
        None
    }
}

/// Backend-appended fields of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extensions(FxHashMap<String, serde_json::Value>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an extension value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Read an extension value. Unknown names resolve to `None`.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut serde_json::Value)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Extension fields a backend declares, with their descriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeSchema {
    #[serde(default)]
    fields: FxHashMap<RecordKind, Vec<(String, String)>>,
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an extension field.
    pub fn with_field(
        mut self,
        kind: RecordKind,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.fields
            .entry(kind)
            .or_default()
            .push((name.into(), description.into()));
        self
    }

    /// Description of a declared extension field.
    pub fn describe(&self, kind: RecordKind, name: &str) -> Option<&str> {
        self.fields
            .get(&kind)?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_str())
    }

    /// Names of the extension fields declared for `kind`.
    pub fn field_names(&self, kind: RecordKind) -> impl Iterator<Item = &str> {
        self.fields
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|(n, _)| n.as_str())
    }

    /// Reject any extension in `record` the backend did not declare.
    pub fn check<R: Record>(&self, record: &R) -> DrmaaResult<()> {
        let Some(extensions) = record.extensions() else {
            return Ok(());
        };
        for (name, _) in extensions.iter() {
            if self.describe(R::KIND, name).is_none() {
                return Err(DrmaaError::UnsupportedAttribute(format!(
                    "{} has no extension field {name}",
                    R::KIND
                )));
            }
        }
        Ok(())
    }

    /// Human-readable description of a mandatory or extension field.
    ///
    /// Accepts both `snake_case` and `camelCase` names.
    pub fn describe_attribute<R: Record>(&self, _instance: &R, name: &str) -> DrmaaResult<String> {
        let key = to_snake_case(name);
        if let Some((_, description)) = R::FIELDS.iter().find(|(field, _)| *field == key) {
            return Ok((*description).to_string());
        }
        self.describe(R::KIND, &key)
            .or_else(|| self.describe(R::KIND, name))
            .map(str::to_string)
            .ok_or_else(|| {
                DrmaaError::UnsupportedAttribute(format!("{} has no field {name}", R::KIND))
            })
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
