//! Client-side view of job states.
//!
//! The board merges every state the client observes, from polls and from
//! notifications, keeping terminal states sticky. Each change bumps an epoch
//! on a `watch` channel, which is what blocked wait loops sleep on. Reaping
//! a job drops its entry; the handle itself remembers that it was reaped.

use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::FxHashMap;
use tokio::sync::watch;

use crate::job::{JobId, JobState};

struct Entry {
    state: JobState,
    /// Serializes control verbs and reaping on one job.
    control: Arc<tokio::sync::Mutex<()>>,
}

impl Entry {
    fn new(state: JobState) -> Self {
        Self {
            state,
            control: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

pub(crate) struct StateBoard {
    jobs: Mutex<FxHashMap<JobId, Entry>>,
    epoch: watch::Sender<u64>,
}

impl StateBoard {
    pub(crate) fn new() -> Self {
        Self {
            jobs: Mutex::new(FxHashMap::default()),
            epoch: watch::Sender::new(0),
        }
    }

    /// Merge an observed state and return the state the client reports.
    pub(crate) fn observe(&self, id: &JobId, observed: JobState) -> JobState {
        self.merge(id, observed, true).unwrap_or(observed)
    }

    fn merge(&self, id: &JobId, observed: JobState, insert: bool) -> Option<JobState> {
        let (effective, changed) = {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            match jobs.get_mut(id) {
                Some(entry) => {
                    let next = entry.state.observe(observed);
                    let changed = next != entry.state;
                    entry.state = next;
                    (next, changed)
                }
                None if insert => {
                    jobs.insert(id.clone(), Entry::new(observed));
                    (observed, true)
                }
                None => return None,
            }
        };
        if changed {
            tracing::debug!(job_id = %id, state = %effective, "Job state changed");
            self.bump();
        }
        Some(effective)
    }

    /// Start tracking a freshly submitted job. Its state stays
    /// `Undetermined` until the first poll or notification.
    pub(crate) fn track(&self, id: &JobId) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_insert_with(|| Entry::new(JobState::Undetermined));
    }

    /// Merge a state pushed by the backend, but only for jobs this client
    /// already tracks.
    pub(crate) fn observe_tracked(&self, id: &JobId, observed: JobState) {
        self.merge(id, observed, false);
    }

    /// Last merged state, if the job is tracked.
    pub(crate) fn state(&self, id: &JobId) -> Option<JobState> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| entry.state)
    }

    /// Per-job lock held across a control round-trip.
    pub(crate) fn control_lock(&self, id: &JobId) -> Arc<tokio::sync::Mutex<()>> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_insert_with(|| Entry::new(JobState::Undetermined))
            .control
            .clone()
    }

    /// Stop tracking a job. Waiters are woken so they notice.
    pub(crate) fn forget(&self, id: &JobId) {
        let removed = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            self.bump();
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.epoch.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn bump(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }
}
