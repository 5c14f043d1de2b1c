//! Session management: the entry point of the client layer.
//!
//! [`SessionManager`] owns the backend, the client's view of job states and
//! the notification callback slot. Everything else ([`JobSession`],
//! [`ReservationSession`], [`MonitoringSession`], [`Job`], [`JobArray`],
//! [`Reservation`]) is a cheap handle sharing that state.
//!
//! ```text
//!   SessionManager ──→ create/open_job_session() ──→ JobSession ──→ run_job() ──→ Job
//!        │                                              │
//!        │                                              └──→ run_bulk_jobs() ──→ JobArray
//!        ├──→ create/open_reservation_session() ──→ ReservationSession ──→ Reservation
//!        ├──→ open_monitoring_session() ──→ MonitoringSession
//!        └──→ register_event_notification()
//! ```

mod job;
mod job_array;
mod job_session;
mod monitoring;
mod registry;
mod reservation;
mod wait;

use std::sync::{Arc, Mutex, PoisonError, Weak};

use rustc_hash::FxHashSet;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub use job::Job;
pub use job_array::JobArray;
pub use job_session::JobSession;
pub use monitoring::MonitoringSession;
pub use reservation::{Reservation, ReservationSession};

use crate::backend::{Backend, SessionKind, SessionRecord};
use crate::board::StateBoard;
use crate::capability::{Capabilities, Capability};
use crate::config::ManagerConfig;
use crate::error::{DrmaaError, DrmaaResult};
use crate::info::{ReservationId, Version};
use crate::notification::{Event, Notification, NotificationChannel};
use crate::schema::Record;
use registry::SessionRegistry;

/// State shared by the manager and every handle it hands out.
pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) config: ManagerConfig,
    pub(crate) board: StateBoard,
    pub(crate) registry: SessionRegistry,
    pub(crate) notifications: NotificationChannel,
    pub(crate) terminated_reservations: Mutex<FxHashSet<ReservationId>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn capabilities(&self) -> &Capabilities {
        self.backend.capabilities()
    }

    fn handle_event(&self, notification: Notification) {
        if notification.event == Some(Event::NewState) {
            if let (Some(id), Some(state)) = (&notification.job_id, notification.job_state) {
                self.board.observe_tracked(id, state);
            }
        }
        self.notifications.deliver(notification);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(task) = self
            .dispatcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

/// Drain backend events until the backend or the manager goes away.
async fn dispatch(shared: Weak<Shared>, mut events: broadcast::Receiver<Notification>) {
    loop {
        match events.recv().await {
            Ok(notification) => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.handle_event(notification);
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Notification stream lagged, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::debug!("Notification dispatcher stopped");
}

/// Entry point: capability checks, session registry and event
/// notification for one backend.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Wrap a backend.
    ///
    /// If the backend publishes events, a dispatch task is spawned on the
    /// current tokio runtime; calling this outside a runtime then fails with
    /// `Internal`.
    pub fn new(backend: Arc<dyn Backend>, config: ManagerConfig) -> DrmaaResult<Self> {
        let events = backend.subscribe();
        let shared = Arc::new(Shared {
            backend,
            config,
            board: StateBoard::new(),
            registry: SessionRegistry::default(),
            notifications: NotificationChannel::default(),
            terminated_reservations: Mutex::new(FxHashSet::default()),
            dispatcher: Mutex::new(None),
        });

        if let Some(events) = events {
            let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
                DrmaaError::Internal(format!("event dispatch needs a tokio runtime: {e}"))
            })?;
            let task = runtime.spawn(dispatch(Arc::downgrade(&shared), events));
            *shared.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        }

        let caps = shared.capabilities();
        tracing::info!(
            backend = shared.backend.name(),
            drms = %caps.drms_name,
            drms_version = %caps.drms_version,
            "Session manager ready"
        );
        Ok(Self { shared })
    }

    /// Wrap a backend with the default configuration.
    pub fn with_backend(backend: Arc<dyn Backend>) -> DrmaaResult<Self> {
        Self::new(backend, ManagerConfig::default())
    }

    /// Check whether the backend implements an optional feature.
    pub fn supports(&self, capability: Capability) -> bool {
        self.shared.capabilities().supports(capability)
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.shared.capabilities()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub fn drms_name(&self) -> &str {
        &self.shared.capabilities().drms_name
    }

    pub fn drms_version(&self) -> Version {
        self.shared.capabilities().drms_version
    }

    pub fn drmaa_name(&self) -> &str {
        &self.shared.capabilities().drmaa_name
    }

    pub fn drmaa_version(&self) -> Version {
        self.shared.capabilities().drmaa_version
    }

    async fn create_session(
        &self,
        kind: SessionKind,
        name: Option<&str>,
        contact: Option<&str>,
    ) -> DrmaaResult<SessionRecord> {
        let name = match name {
            Some("") => {
                return Err(DrmaaError::InvalidArgument("session name must not be empty".into()));
            }
            Some(name) => name.to_string(),
            None => SessionRegistry::generate_name(&self.shared.config.session_name_prefix, kind),
        };
        let record = SessionRecord {
            name,
            kind,
            contact: contact
                .map(str::to_string)
                .or_else(|| self.shared.config.default_contact.clone()),
            job_categories: vec![],
        };
        self.shared.backend.create_session(&record).await?;
        let record = self.shared.backend.open_session(kind, &record.name).await?;
        tracing::info!(session = %record.name, %kind, "Session created");
        Ok(record)
    }

    /// Create and open a new job session. A name is generated if none is
    /// given.
    pub async fn create_job_session(
        &self,
        name: Option<&str>,
        contact: Option<&str>,
    ) -> DrmaaResult<JobSession> {
        let record = self.create_session(SessionKind::Job, name, contact).await?;
        let handle = self.shared.registry.attach(&record.name);
        Ok(JobSession::new(self.shared.clone(), handle, record))
    }

    /// Open an existing job session by name.
    pub async fn open_job_session(&self, name: &str) -> DrmaaResult<JobSession> {
        let record = self.shared.backend.open_session(SessionKind::Job, name).await?;
        let handle = self.shared.registry.attach(&record.name);
        tracing::info!(session = %record.name, "Job session opened");
        Ok(JobSession::new(self.shared.clone(), handle, record))
    }

    /// Create and open a new reservation session.
    pub async fn create_reservation_session(
        &self,
        name: Option<&str>,
        contact: Option<&str>,
    ) -> DrmaaResult<ReservationSession> {
        self.shared
            .capabilities()
            .require_operation(Capability::AdvanceReservation, "create_reservation_session")?;
        let record = self.create_session(SessionKind::Reservation, name, contact).await?;
        let handle = self.shared.registry.attach(&record.name);
        Ok(ReservationSession::new(self.shared.clone(), handle, record))
    }

    /// Open an existing reservation session by name.
    pub async fn open_reservation_session(&self, name: &str) -> DrmaaResult<ReservationSession> {
        self.shared
            .capabilities()
            .require_operation(Capability::AdvanceReservation, "open_reservation_session")?;
        let record = self
            .shared
            .backend
            .open_session(SessionKind::Reservation, name)
            .await?;
        let handle = self.shared.registry.attach(&record.name);
        tracing::info!(session = %record.name, "Reservation session opened");
        Ok(ReservationSession::new(self.shared.clone(), handle, record))
    }

    /// Open a read-only, cluster-wide view.
    pub fn open_monitoring_session(&self, contact: Option<&str>) -> MonitoringSession {
        let contact = contact
            .map(str::to_string)
            .or_else(|| self.shared.config.default_contact.clone());
        MonitoringSession::new(self.shared.clone(), contact)
    }

    /// Remove a session and all state the backend holds for it. Open
    /// handles to it become invalid.
    pub async fn destroy_session(&self, name: &str) -> DrmaaResult<()> {
        self.shared.backend.destroy_session(name).await?;
        self.shared.registry.forget(name);
        tracing::info!(session = %name, "Session destroyed");
        Ok(())
    }

    /// Names valid for [`SessionManager::open_job_session`].
    pub async fn get_job_session_names(&self) -> DrmaaResult<Vec<String>> {
        self.shared.backend.session_names(SessionKind::Job).await
    }

    /// Names valid for [`SessionManager::open_reservation_session`].
    pub async fn get_reservation_session_names(&self) -> DrmaaResult<Vec<String>> {
        self.shared.backend.session_names(SessionKind::Reservation).await
    }

    /// Register the callback receiving every backend event, replacing any
    /// previous one. Requires [`Capability::Callback`].
    ///
    /// There is one callback slot per manager, shared by all of its clones.
    /// A process talking to one DRM system builds one manager and clones it
    /// wherever needed, which gives it a single registration point. Separate
    /// managers keep separate slots.
    ///
    /// The callback runs on the manager's dispatch task; it should return
    /// quickly.
    pub fn register_event_notification<F>(&self, callback: F) -> DrmaaResult<()>
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.shared
            .notifications
            .register(self.shared.capabilities(), Arc::new(callback))
    }

    /// Remove the registered callback, if any.
    pub fn clear_event_notification(&self) {
        self.shared.notifications.clear();
    }

    /// Human-readable description of a record field.
    pub fn describe_attribute<R: Record>(&self, instance: &R, name: &str) -> DrmaaResult<String> {
        self.shared
            .capabilities()
            .schema
            .describe_attribute(instance, name)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("backend", &self.shared.backend.name())
            .field("config", &self.shared.config)
            .field("notifications", &self.shared.notifications)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::job::JobState;
    use crate::template::JobTemplate;

    fn manager() -> (Arc<MockBackend>, SessionManager) {
        let backend = Arc::new(MockBackend::new());
        let manager = SessionManager::with_backend(backend.clone()).unwrap();
        (backend, manager)
    }

    #[tokio::test]
    async fn test_supports_is_stable() {
        let (_, manager) = manager();
        for cap in Capability::ALL {
            assert_eq!(manager.supports(cap), manager.supports(cap));
        }
        assert!(manager.supports(Capability::Callback));
        assert!(manager.supports(Capability::AdvanceReservation));
        assert_eq!(manager.drms_name(), "Mock DRM");
        assert_eq!(manager.drmaa_version(), Version::new(2, 0));
    }

    #[tokio::test]
    async fn test_job_session_roundtrip_by_name() {
        let (_, manager) = manager();
        let session = manager.create_job_session(None, None).await.unwrap();
        let name = session.session_name().to_string();
        assert!(name.starts_with("drmaa2-job-"));
        session.close().unwrap();

        let session = manager.open_job_session(&name).await.unwrap();
        session.close().unwrap();
        assert_eq!(manager.get_job_session_names().await.unwrap(), vec![name.clone()]);

        manager.destroy_session(&name).await.unwrap();
        assert!(manager.get_job_session_names().await.unwrap().is_empty());
        assert!(matches!(
            manager.open_job_session(&name).await,
            Err(DrmaaError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_and_empty_names() {
        let (_, manager) = manager();
        manager.create_job_session(Some("dup"), None).await.unwrap();
        assert!(matches!(
            manager.create_job_session(Some("dup"), None).await,
            Err(DrmaaError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.create_job_session(Some(""), None).await,
            Err(DrmaaError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_session_kinds_are_separate() {
        let (_, manager) = manager();
        let rs = manager
            .create_reservation_session(Some("ar"), Some("contact"))
            .await
            .unwrap();
        assert_eq!(rs.contact(), Some("contact"));
        assert!(manager.open_job_session("ar").await.is_err());
        assert_eq!(
            manager.get_reservation_session_names().await.unwrap(),
            vec!["ar".to_string()]
        );
        assert!(manager.get_job_session_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_contact_from_config() {
        let backend = Arc::new(MockBackend::new());
        let manager = SessionManager::new(
            backend,
            ManagerConfig::default().with_default_contact("mock://cluster"),
        )
        .unwrap();
        let session = manager.create_job_session(None, None).await.unwrap();
        assert_eq!(session.contact(), Some("mock://cluster"));
        assert_eq!(
            manager.open_monitoring_session(None).contact(),
            Some("mock://cluster")
        );
    }

    #[tokio::test]
    async fn test_reservation_sessions_need_capability() {
        let backend = Arc::new(MockBackend::with_capabilities(
            Capabilities::full("mock", Version::new(1, 0)).without(Capability::AdvanceReservation),
        ));
        let manager = SessionManager::with_backend(backend).unwrap();
        assert!(matches!(
            manager.create_reservation_session(None, None).await,
            Err(DrmaaError::UnsupportedOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_callback_receives_events() {
        let (backend, manager) = manager();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager
            .register_event_notification(move |n| {
                let _ = tx.send(n);
            })
            .unwrap();

        let session = manager.create_job_session(None, None).await.unwrap();
        let job = session.run_job(&JobTemplate::command("/bin/sleep")).await.unwrap();
        backend.advance(job.id(), JobState::Running).unwrap();

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.event, Some(Event::NewState));
        assert_eq!(queued.job_state, Some(JobState::Queued));
        let running = rx.recv().await.unwrap();
        assert_eq!(running.job_id.as_ref(), Some(job.id()));
        assert_eq!(running.job_state, Some(JobState::Running));
        assert_eq!(running.session_name.as_deref(), Some(session.session_name()));
    }

    #[tokio::test]
    async fn test_register_replaces_previous_callback() {
        let (backend, manager) = manager();
        let elsewhere = manager.clone();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel::<Notification>();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel::<Notification>();
        manager
            .register_event_notification(move |n| {
                let _ = old_tx.send(n);
            })
            .unwrap();
        elsewhere
            .register_event_notification(move |n| {
                let _ = new_tx.send(n);
            })
            .unwrap();

        backend.emit(Notification {
            event: Some(Event::Migrated),
            ..Default::default()
        });
        let got = new_rx.recv().await.unwrap();
        assert_eq!(got.event, Some(Event::Migrated));
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_register_without_callback_capability() {
        let backend = Arc::new(MockBackend::with_capabilities(
            Capabilities::full("mock", Version::new(1, 0)).without(Capability::Callback),
        ));
        let manager = SessionManager::with_backend(backend).unwrap();
        assert!(matches!(
            manager.register_event_notification(|_| {}),
            Err(DrmaaError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_events_need_runtime() {
        let backend = Arc::new(MockBackend::new());
        assert!(matches!(
            SessionManager::with_backend(backend),
            Err(DrmaaError::Internal(_))
        ));

        let quiet = Arc::new(MockBackend::with_capabilities(
            Capabilities::full("mock", Version::new(1, 0)).without(Capability::Callback),
        ));
        assert!(SessionManager::with_backend(quiet).is_ok());
    }

    #[tokio::test]
    async fn test_describe_attribute() {
        let (_, manager) = manager();
        assert!(manager
            .describe_attribute(&Notification::default(), "sessionName")
            .is_ok());
        assert_eq!(
            manager
                .describe_attribute(&JobTemplate::default(), "mock_testattr")
                .unwrap(),
            "Free-form test attribute understood by the mock DRM"
        );
    }

    #[tokio::test]
    async fn test_dispatcher_stops_with_manager() {
        let (backend, manager) = manager();
        drop(manager);
        tokio::time::sleep(Duration::from_millis(10)).await;
        // The dispatcher was aborted; publishing must not panic or block.
        backend.emit(Notification::default());
    }

    #[tokio::test]
    async fn test_reap_releases_tracked_state() {
        let (backend, manager) = manager();
        let session = manager.create_job_session(None, None).await.unwrap();
        let job = session.run_job(&JobTemplate::command("/bin/true")).await.unwrap();
        let stale = session.get_jobs(None).await.unwrap().remove(0);
        backend.advance(job.id(), JobState::Done).unwrap();
        assert_eq!(manager.shared.board.len(), 1);

        job.reap().await.unwrap();
        assert_eq!(manager.shared.board.len(), 0);

        // Neither a clone nor a handle from an earlier listing brings it back.
        assert!(job.clone().terminate().await.is_err());
        assert!(stale.terminate().await.is_err());
        assert!(stale.get_state().await.is_err());
        assert_eq!(manager.shared.board.len(), 0);
    }
}
