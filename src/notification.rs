//! Event notification.
//!
//! A backend that supports [`Capability::Callback`] publishes
//! [`Notification`]s on a broadcast channel. The session manager runs one
//! dispatch task that drains the channel, updates the client's view of job
//! states, and hands each event to the single registered callback. Backend
//! code never calls into user code directly.
//!
//! Delivery is best-effort: events dropped by a lagging receiver are logged
//! and skipped.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::capability::{Capabilities, Capability};
use crate::error::DrmaaResult;
use crate::job::{JobId, JobState};
use crate::schema::{Extensions, Record, RecordKind};

/// Kind of state change reported by the DRM system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    NewState,
    Migrated,
    AttributeChange,
}

/// An event about one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notification {
    pub event: Option<Event>,
    pub job_id: Option<JobId>,
    pub session_name: Option<String>,
    pub job_state: Option<JobState>,
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl Notification {
    /// A `NEW_STATE` event.
    pub fn new_state(job_id: JobId, session_name: impl Into<String>, state: JobState) -> Self {
        Self {
            event: Some(Event::NewState),
            job_id: Some(job_id),
            session_name: Some(session_name.into()),
            job_state: Some(state),
            extensions: Extensions::default(),
        }
    }
}

impl Record for Notification {
    const KIND: RecordKind = RecordKind::Notification;
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("event", "Kind of event"),
        ("job_id", "Job the event refers to"),
        ("session_name", "Session owning the job"),
        ("job_state", "State of the job after the event"),
    ];

    fn extensions(&self) -> Option<&Extensions> {
        Some(&self.extensions)
    }
}

/// User callback receiving notifications.
pub type EventCallback = Arc<dyn Fn(Notification) + Send + Sync>;

/// Process-scoped callback slot. Registering replaces the previous callback.
#[derive(Default)]
pub(crate) struct NotificationChannel {
    callback: RwLock<Option<EventCallback>>,
}

impl NotificationChannel {
    pub(crate) fn register(&self, caps: &Capabilities, callback: EventCallback) -> DrmaaResult<()> {
        caps.require_operation(Capability::Callback, "register_event_notification")?;
        let replaced = self
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(callback)
            .is_some();
        tracing::debug!(replaced, "Event callback registered");
        Ok(())
    }

    pub(crate) fn clear(&self) {
        self.callback
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Hand `notification` to the current callback, if any.
    pub(crate) fn deliver(&self, notification: Notification) {
        let callback = self
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(notification);
        }
    }
}

impl std::fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered = self
            .callback
            .read()
            .map(|c| c.is_some())
            .unwrap_or(false);
        f.debug_struct("NotificationChannel")
            .field("registered", &registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::DrmaaError;
    use crate::info::Version;

    #[test]
    fn test_register_requires_callback_capability() {
        let channel = NotificationChannel::default();
        let caps = Capabilities::minimal("mock", Version::new(1, 0));
        let err = channel.register(&caps, Arc::new(|_| {})).unwrap_err();
        assert!(matches!(err, DrmaaError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_register_replaces_callback() {
        let channel = NotificationChannel::default();
        let caps = Capabilities::minimal("mock", Version::new(1, 0))
            .with_supported([Capability::Callback]);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        channel
            .register(&caps, Arc::new(move |_| first.lock().unwrap().push("first")))
            .unwrap();
        let second = seen.clone();
        channel
            .register(&caps, Arc::new(move |_| second.lock().unwrap().push("second")))
            .unwrap();

        channel.deliver(Notification::default());
        assert_eq!(*seen.lock().unwrap(), vec!["second"]);

        channel.clear();
        channel.deliver(Notification::default());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_new_state_event() {
        let n = Notification::new_state(JobId::new("3"), "s", JobState::Done);
        assert_eq!(n.event, Some(Event::NewState));
        assert_eq!(n.job_state, Some(JobState::Done));
    }
}
