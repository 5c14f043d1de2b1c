//! In-memory reference backend.
//!
//! [`MockBackend`] keeps sessions, jobs, arrays and reservations in a
//! mutex-guarded table and never runs anything. Jobs stay where the client
//! or the test puts them: [`MockBackend::advance`] plays the scheduler and
//! publishes a `NEW_STATE` notification for every transition.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;

use super::{
    Backend, BulkRequest, BulkSubmission, JobArrayRecord, JobRecord, ReservationRecord,
    SessionKind, SessionRecord,
};
use crate::capability::{Capabilities, Capability};
use crate::error::{DrmaaError, DrmaaResult};
use crate::info::{
    CpuArchitecture, JobInfo, MachineInfo, OperatingSystem, QueueInfo, ReservationId,
    ReservationInfo, SlotInfo, Version,
};
use crate::job::{JobArrayId, JobControl, JobId, JobState};
use crate::notification::Notification;
use crate::schema::{AttributeSchema, RecordKind};
use crate::template::{JobTemplate, ReservationStart, ReservationTemplate};

const EVENT_BUFFER: usize = 1024;
const DEFAULT_QUEUE: &str = "default";
const HOST: &str = "mock-node-01";

struct MockJob {
    seq: u64,
    session: String,
    template: JobTemplate,
    state: JobState,
    info: JobInfo,
}

impl MockJob {
    fn record(&self, id: &JobId) -> JobRecord {
        JobRecord {
            job_id: id.clone(),
            session_name: self.session.clone(),
            template: self.template.clone(),
            info: self.info.clone(),
        }
    }
}

struct MockArray {
    session: String,
    template: JobTemplate,
    jobs: Vec<JobId>,
}

#[derive(Default)]
struct MockState {
    sessions: FxHashMap<String, SessionRecord>,
    jobs: FxHashMap<JobId, MockJob>,
    arrays: FxHashMap<JobArrayId, MockArray>,
    reservations: FxHashMap<ReservationId, (u64, ReservationRecord, ReservationInfo)>,
    queues: Vec<QueueInfo>,
    machines: Vec<MachineInfo>,
    next_id: u64,
}

impl MockState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn session(&self, name: &str, kind: SessionKind) -> DrmaaResult<&SessionRecord> {
        match self.sessions.get(name) {
            Some(record) if record.kind == kind => Ok(record),
            _ => Err(DrmaaError::InvalidSession(format!(
                "no {kind} session named {name}"
            ))),
        }
    }

    fn job_mut(&mut self, id: &JobId) -> DrmaaResult<&mut MockJob> {
        self.jobs
            .get_mut(id)
            .ok_or_else(|| DrmaaError::InvalidArgument(format!("unknown job {id}")))
    }

    fn insert_job(&mut self, session: &str, template: &JobTemplate) -> (JobId, JobState) {
        let seq = self.next();
        let id = JobId::new(format!("mock-job-{seq}"));
        let state = if template.submit_as_hold == Some(true) {
            JobState::QueuedHeld
        } else {
            JobState::Queued
        };
        let info = JobInfo {
            job_id: Some(id.clone()),
            job_name: template.job_name.clone(),
            job_state: Some(state),
            job_sub_state: Some(sub_state(state)),
            submission_machine: Some("localhost".into()),
            job_owner: Some("mock".into()),
            queue_name: Some(
                template
                    .queue_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
            ),
            submission_time: Some(Utc::now()),
            ..Default::default()
        };
        self.jobs.insert(
            id.clone(),
            MockJob {
                seq,
                session: session.to_string(),
                template: template.clone(),
                state,
                info,
            },
        );
        (id, state)
    }
}

fn sub_state(state: JobState) -> String {
    format!("mock:{}", state.to_string().to_lowercase())
}

/// In-memory DRM system for tests and demos.
pub struct MockBackend {
    capabilities: Capabilities,
    state: Mutex<MockState>,
    events: broadcast::Sender<Notification>,
}

impl MockBackend {
    /// A mock supporting every optional feature, with one extension field
    /// (`mock_testattr`) on job templates, one queue and one machine.
    pub fn new() -> Self {
        let schema = AttributeSchema::new().with_field(
            RecordKind::JobTemplate,
            "mock_testattr",
            "Free-form test attribute understood by the mock DRM",
        );
        Self::with_capabilities(
            Capabilities::full("Mock DRM", Version::new(1, 0)).with_schema(schema),
        )
    }

    pub fn with_capabilities(mut capabilities: Capabilities) -> Self {
        capabilities.drmaa_name = "Mock DRM DRMAA Implementation".into();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let state = MockState {
            queues: vec![QueueInfo::named(DEFAULT_QUEUE)],
            machines: vec![MachineInfo {
                available: Some(true),
                sockets: Some(2),
                cores_per_socket: Some(8),
                threads_per_core: Some(2),
                load: Some(0.0),
                phys_memory: Some(64 * 1024 * 1024),
                machine_os: Some(OperatingSystem::Linux),
                machine_arch: Some(CpuArchitecture::X64),
                ..MachineInfo::named(HOST)
            }],
            ..Default::default()
        };
        Self {
            capabilities,
            state: Mutex::new(state),
            events,
        }
    }

    /// Add a queue.
    pub fn with_queue(self, name: impl Into<String>) -> Self {
        self.lock().queues.push(QueueInfo::named(name));
        self
    }

    /// Add a machine.
    pub fn with_machine(self, machine: MachineInfo) -> Self {
        self.lock().machines.push(machine);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, notification: Notification) {
        if self.capabilities.supports(Capability::Callback) {
            // No receiver is fine: nobody is listening yet.
            let _ = self.events.send(notification);
        }
    }

    /// Move a job to `state` as the scheduler would, and publish the event.
    pub fn advance(&self, job: &JobId, state: JobState) -> DrmaaResult<()> {
        let session = self.set_state(job, state)?;
        self.publish(Notification::new_state(job.clone(), session, state));
        Ok(())
    }

    /// Move a job without publishing anything. Only polling can see it.
    pub fn advance_silently(&self, job: &JobId, state: JobState) -> DrmaaResult<()> {
        self.set_state(job, state).map(|_| ())
    }

    /// Publish an arbitrary notification.
    pub fn emit(&self, notification: Notification) {
        self.publish(notification);
    }

    /// Register a job submitted outside any DRMAA session.
    pub fn inject_foreign_job(&self, template: &JobTemplate) -> JobId {
        self.lock().insert_job("", template).0
    }

    fn set_state(&self, job: &JobId, next: JobState) -> DrmaaResult<String> {
        let mut state = self.lock();
        let record = state.job_mut(job)?;
        if record.state.is_terminated() {
            return Err(DrmaaError::InvalidState(format!(
                "job {job} already reached {}",
                record.state
            )));
        }
        let now = Utc::now();
        if next.is_started() && record.info.dispatch_time.is_none() {
            record.info.dispatch_time = Some(now);
            record.info.allocated_machines = Some(vec![SlotInfo::new(HOST, 1)]);
            record.info.slots = Some(1);
        }
        if next.is_terminated() {
            record.info.finish_time = Some(now);
            if let Some(dispatched) = record.info.dispatch_time {
                record.info.wallclock_time =
                    Some((now - dispatched).to_std().unwrap_or(Duration::ZERO));
            }
            if next == JobState::Done {
                record.info.exit_status = Some(0);
            }
        }
        record.state = next;
        record.info.job_state = Some(next);
        record.info.job_sub_state = Some(sub_state(next));
        Ok(record.session.clone())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<Notification>> {
        self.capabilities
            .supports(Capability::Callback)
            .then(|| self.events.subscribe())
    }

    async fn create_session(&self, record: &SessionRecord) -> DrmaaResult<()> {
        let mut state = self.lock();
        if state.sessions.contains_key(&record.name) {
            return Err(DrmaaError::InvalidArgument(format!(
                "session {} already exists",
                record.name
            )));
        }
        let mut record = record.clone();
        if record.kind == SessionKind::Job && record.job_categories.is_empty() {
            record.job_categories = vec!["default".into()];
        }
        state.sessions.insert(record.name.clone(), record);
        Ok(())
    }

    async fn open_session(&self, kind: SessionKind, name: &str) -> DrmaaResult<SessionRecord> {
        match self.lock().sessions.get(name) {
            Some(record) if record.kind == kind => Ok(record.clone()),
            _ => Err(DrmaaError::InvalidArgument(format!(
                "no {kind} session named {name}"
            ))),
        }
    }

    async fn destroy_session(&self, name: &str) -> DrmaaResult<()> {
        let mut state = self.lock();
        if state.sessions.remove(name).is_none() {
            return Err(DrmaaError::InvalidArgument(format!("no session named {name}")));
        }
        // Work keeps running on the cluster; it just stops belonging to a session.
        for job in state.jobs.values_mut().filter(|job| job.session == name) {
            job.session.clear();
        }
        state.arrays.retain(|_, array| array.session != name);
        for (_, record, _) in state
            .reservations
            .values_mut()
            .filter(|(_, record, _)| record.session_name == name)
        {
            record.session_name.clear();
        }
        Ok(())
    }

    async fn session_names(&self, kind: SessionKind) -> DrmaaResult<Vec<String>> {
        let mut names: Vec<String> = self
            .lock()
            .sessions
            .values()
            .filter(|r| r.kind == kind)
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn submit(&self, session: &str, template: &JobTemplate) -> DrmaaResult<JobId> {
        let (id, job_state) = {
            let mut state = self.lock();
            state.session(session, SessionKind::Job)?;
            state.insert_job(session, template)
        };
        self.publish(Notification::new_state(id.clone(), session, job_state));
        Ok(id)
    }

    async fn submit_bulk(
        &self,
        session: &str,
        request: &BulkRequest,
    ) -> DrmaaResult<BulkSubmission> {
        let (submission, created) = {
            let mut state = self.lock();
            state.session(session, SessionKind::Job)?;
            let created: Vec<(JobId, JobState)> = request
                .members
                .iter()
                .map(|template| state.insert_job(session, template))
                .collect();
            let array_id = JobArrayId::new(format!("mock-array-{}", state.next()));
            let jobs: Vec<JobId> = created.iter().map(|(id, _)| id.clone()).collect();
            state.arrays.insert(
                array_id.clone(),
                MockArray {
                    session: session.to_string(),
                    template: request.template.clone(),
                    jobs: jobs.clone(),
                },
            );
            (BulkSubmission { array_id, jobs }, created)
        };
        for (id, job_state) in created {
            self.publish(Notification::new_state(id, session, job_state));
        }
        Ok(submission)
    }

    async fn job_state(&self, job: &JobId) -> DrmaaResult<(JobState, String)> {
        let mut state = self.lock();
        let record = state.job_mut(job)?;
        Ok((record.state, sub_state(record.state)))
    }

    async fn job_info(&self, job: &JobId) -> DrmaaResult<JobInfo> {
        Ok(self.lock().job_mut(job)?.info.clone())
    }

    async fn control(&self, job: &JobId, verb: JobControl) -> DrmaaResult<()> {
        let (session, next) = {
            let mut state = self.lock();
            let record = state.job_mut(job)?;
            if record.state == JobState::Undetermined || !verb.is_eligible_from(record.state) {
                return Err(DrmaaError::InvalidState(format!(
                    "cannot {verb} job {job} in state {}",
                    record.state
                )));
            }
            let next = verb.target_state(record.state);
            if verb == JobControl::Terminate {
                record.info.terminating_signal = Some("SIGKILL".into());
                record.info.finish_time = Some(Utc::now());
            }
            record.state = next;
            record.info.job_state = Some(next);
            record.info.job_sub_state = Some(sub_state(next));
            (record.session.clone(), next)
        };
        self.publish(Notification::new_state(job.clone(), session, next));
        Ok(())
    }

    async fn reap(&self, job: &JobId) -> DrmaaResult<()> {
        let mut state = self.lock();
        let record = state.job_mut(job)?;
        if !record.state.is_terminated() {
            return Err(DrmaaError::InvalidState(format!(
                "job {job} is {}, not terminated",
                record.state
            )));
        }
        state.jobs.remove(job);
        Ok(())
    }

    async fn session_jobs(&self, session: &str) -> DrmaaResult<Vec<JobRecord>> {
        let state = self.lock();
        state.session(session, SessionKind::Job)?;
        let mut jobs: Vec<(&JobId, &MockJob)> = state
            .jobs
            .iter()
            .filter(|(_, job)| job.session == session)
            .collect();
        jobs.sort_by_key(|(_, job)| job.seq);
        Ok(jobs.into_iter().map(|(id, job)| job.record(id)).collect())
    }

    async fn job_array(&self, session: &str, id: &JobArrayId) -> DrmaaResult<JobArrayRecord> {
        let state = self.lock();
        let array = state
            .arrays
            .get(id)
            .filter(|a| a.session == session)
            .ok_or_else(|| DrmaaError::InvalidArgument(format!("unknown job array {id}")))?;
        let jobs = array
            .jobs
            .iter()
            .filter_map(|job_id| state.jobs.get(job_id).map(|job| job.record(job_id)))
            .collect();
        Ok(JobArrayRecord {
            array_id: id.clone(),
            session_name: array.session.clone(),
            template: array.template.clone(),
            jobs,
        })
    }

    async fn all_jobs(&self) -> DrmaaResult<Vec<JobRecord>> {
        let state = self.lock();
        let mut jobs: Vec<(&JobId, &MockJob)> = state.jobs.iter().collect();
        jobs.sort_by_key(|(_, job)| job.seq);
        Ok(jobs.into_iter().map(|(id, job)| job.record(id)).collect())
    }

    async fn request_reservation(
        &self,
        session: &str,
        template: &ReservationTemplate,
    ) -> DrmaaResult<ReservationRecord> {
        let mut state = self.lock();
        state.session(session, SessionKind::Reservation)?;
        let seq = state.next();
        let id = ReservationId::new(format!("mock-ar-{seq}"));

        let start = match template.start_time {
            Some(ReservationStart::At(at)) => at,
            Some(ReservationStart::Now) | None => Utc::now(),
        };
        let end = match (template.end_time, template.duration) {
            (Some(end), _) => end,
            (None, Some(duration)) => {
                start + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::hours(1))
            }
            (None, None) => start + chrono::Duration::hours(1),
        };
        let slots = template.max_slots.or(template.min_slots).unwrap_or(1);

        let record = ReservationRecord {
            reservation_id: id.clone(),
            session_name: session.to_string(),
            template: template.clone(),
        };
        let info = ReservationInfo {
            reservation_id: Some(id.clone()),
            reservation_name: template.reservation_name.clone(),
            reserved_start_time: Some(start),
            reserved_end_time: Some(end),
            users_acl: template.users_acl.clone(),
            reserved_slots: Some(slots),
            reserved_machines: Some(vec![SlotInfo::new(HOST, slots)]),
            ..Default::default()
        };
        state.reservations.insert(id, (seq, record.clone(), info));
        Ok(record)
    }

    async fn reservation_info(&self, id: &ReservationId) -> DrmaaResult<ReservationInfo> {
        self.lock()
            .reservations
            .get(id)
            .map(|(_, _, info)| info.clone())
            .ok_or_else(|| DrmaaError::InvalidArgument(format!("unknown reservation {id}")))
    }

    async fn terminate_reservation(&self, id: &ReservationId) -> DrmaaResult<()> {
        self.lock()
            .reservations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DrmaaError::InvalidArgument(format!("unknown reservation {id}")))
    }

    async fn session_reservations(&self, session: &str) -> DrmaaResult<Vec<ReservationRecord>> {
        let state = self.lock();
        state.session(session, SessionKind::Reservation)?;
        let mut found: Vec<_> = state
            .reservations
            .values()
            .filter(|(_, r, _)| r.session_name == session)
            .collect();
        found.sort_by_key(|(seq, _, _)| *seq);
        Ok(found.into_iter().map(|(_, r, _)| r.clone()).collect())
    }

    async fn all_reservations(&self) -> DrmaaResult<Vec<ReservationRecord>> {
        let state = self.lock();
        let mut found: Vec<_> = state.reservations.values().collect();
        found.sort_by_key(|(seq, _, _)| *seq);
        Ok(found.into_iter().map(|(_, r, _)| r.clone()).collect())
    }

    async fn all_queues(&self) -> DrmaaResult<Vec<QueueInfo>> {
        Ok(self.lock().queues.clone())
    }

    async fn all_machines(&self) -> DrmaaResult<Vec<MachineInfo>> {
        Ok(self.lock().machines.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn with_session(backend: &MockBackend) -> &'static str {
        backend
            .create_session(&SessionRecord {
                name: "s1".into(),
                kind: SessionKind::Job,
                contact: None,
                job_categories: vec![],
            })
            .await
            .unwrap();
        "s1"
    }

    #[tokio::test]
    async fn test_submit_starts_queued() {
        let backend = MockBackend::new();
        let session = with_session(&backend).await;
        let id = backend.submit(session, &JobTemplate::command("/bin/true")).await.unwrap();
        let (state, sub) = backend.job_state(&id).await.unwrap();
        assert_eq!(state, JobState::Queued);
        assert_eq!(sub, "mock:queued");

        let held = backend
            .submit(session, &JobTemplate::command("/bin/true").held())
            .await
            .unwrap();
        assert_eq!(backend.job_state(&held).await.unwrap().0, JobState::QueuedHeld);
    }

    #[tokio::test]
    async fn test_submit_into_unknown_session() {
        let backend = MockBackend::new();
        let err = backend.submit("nope", &JobTemplate::default()).await.unwrap_err();
        assert!(matches!(err, DrmaaError::InvalidSession(_)));
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let backend = MockBackend::new();
        let session = with_session(&backend).await;
        let id = backend.submit(session, &JobTemplate::default()).await.unwrap();
        backend.advance(&id, JobState::Running).unwrap();
        backend.advance(&id, JobState::Done).unwrap();
        assert!(matches!(
            backend.advance(&id, JobState::Running),
            Err(DrmaaError::InvalidState(_))
        ));
        let info = backend.job_info(&id).await.unwrap();
        assert_eq!(info.exit_status, Some(0));
        assert!(info.finish_time.is_some());
    }

    #[tokio::test]
    async fn test_control_enforces_eligibility() {
        let backend = MockBackend::new();
        let session = with_session(&backend).await;
        let id = backend.submit(session, &JobTemplate::default()).await.unwrap();
        assert!(matches!(
            backend.control(&id, JobControl::Suspend).await,
            Err(DrmaaError::InvalidState(_))
        ));
        backend.control(&id, JobControl::Hold).await.unwrap();
        assert_eq!(backend.job_state(&id).await.unwrap().0, JobState::QueuedHeld);
        backend.control(&id, JobControl::Terminate).await.unwrap();
        assert_eq!(backend.job_state(&id).await.unwrap().0, JobState::Failed);
    }

    #[tokio::test]
    async fn test_reap_removes_job() {
        let backend = MockBackend::new();
        let session = with_session(&backend).await;
        let id = backend.submit(session, &JobTemplate::default()).await.unwrap();
        assert!(matches!(backend.reap(&id).await, Err(DrmaaError::InvalidState(_))));
        backend.advance(&id, JobState::Failed).unwrap();
        backend.reap(&id).await.unwrap();
        assert!(matches!(
            backend.job_state(&id).await,
            Err(DrmaaError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_events_published() {
        let backend = MockBackend::new();
        let mut events = backend.subscribe().unwrap();
        let session = with_session(&backend).await;
        let id = backend.submit(session, &JobTemplate::default()).await.unwrap();
        backend.advance(&id, JobState::Running).unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(first.job_state, Some(JobState::Queued));
        let second = events.recv().await.unwrap();
        assert_eq!(second.job_id, Some(id));
        assert_eq!(second.job_state, Some(JobState::Running));
    }

    #[tokio::test]
    async fn test_no_events_without_callback_capability() {
        let backend = MockBackend::with_capabilities(
            Capabilities::full("mock", Version::new(1, 0)).without(Capability::Callback),
        );
        assert!(backend.subscribe().is_none());
    }
}
