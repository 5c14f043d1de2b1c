use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DrmaaError, DrmaaResult};

/// Client-side settings of a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Longest sleep between backend polls while a wait primitive blocks.
    /// Notifications wake waiters earlier.
    pub poll_interval_ms: u64,
    /// Prefix of generated session names.
    pub session_name_prefix: String,
    /// Contact string used when a session is created without one.
    pub default_contact: Option<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            session_name_prefix: "drmaa2".to_string(),
            default_contact: None,
        }
    }
}

impl ManagerConfig {
    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> DrmaaResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DrmaaError::InvalidArgument(format!("invalid configuration: {e}")))?;
        if config.poll_interval_ms == 0 {
            return Err(DrmaaError::InvalidArgument(
                "poll_interval_ms must be positive".into(),
            ));
        }
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        self
    }

    pub fn with_session_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_name_prefix = prefix.into();
        self
    }

    pub fn with_default_contact(mut self, contact: impl Into<String>) -> Self {
        self.default_contact = Some(contact.into());
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
