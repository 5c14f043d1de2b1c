use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::Shared;
use super::wait::{WaitCondition, wait_any};
use crate::backend::JobRecord;
use crate::error::{DrmaaError, DrmaaResult};
use crate::info::JobInfo;
use crate::job::{JobControl, JobId, JobState};
use crate::template::JobTemplate;
use crate::timeout::Timeout;

struct JobInner {
    id: JobId,
    session_name: String,
    template: JobTemplate,
    shared: Arc<Shared>,
    reaped: AtomicBool,
}

/// Handle to one submitted job.
///
/// Handles are cheap to clone; clones refer to the same job. Once the job
/// is reaped, every clone fails with `InvalidArgument` without asking the
/// backend. Handles obtained separately, for example from a later listing,
/// fail the same way because the backend no longer knows the job.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    pub(crate) fn new(
        shared: Arc<Shared>,
        id: JobId,
        session_name: impl Into<String>,
        template: JobTemplate,
    ) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id,
                session_name: session_name.into(),
                template,
                shared,
                reaped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.inner.id
    }

    /// Owning session. Empty for jobs submitted outside any session.
    pub fn session_name(&self) -> &str {
        &self.inner.session_name
    }

    /// The template the job was submitted with.
    pub fn template(&self) -> &JobTemplate {
        &self.inner.template
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    fn ensure_live(&self) -> DrmaaResult<()> {
        if self.inner.reaped.load(Ordering::Acquire) {
            // A control call that lost the race to `reap` may have re-added it.
            self.inner.shared.board.forget(self.id());
            return Err(DrmaaError::InvalidArgument(format!(
                "job {} has been reaped",
                self.id()
            )));
        }
        Ok(())
    }

    /// Drop the client's entry when the backend no longer knows the job.
    fn forget_if_unknown<T>(&self, result: DrmaaResult<T>) -> DrmaaResult<T> {
        if let Err(DrmaaError::InvalidArgument(_)) = &result {
            self.inner.shared.board.forget(self.id());
        }
        result
    }

    /// Poll the backend and merge the result into the client's view.
    pub(crate) async fn refresh(&self) -> DrmaaResult<(JobState, String)> {
        self.ensure_live()?;
        let shared = &self.inner.shared;
        let polled = shared.backend.job_state(self.id()).await;
        let (state, sub_state) = self.forget_if_unknown(polled)?;
        Ok((shared.board.observe(self.id(), state), sub_state))
    }

    /// Current state and the backend's opaque sub state.
    pub async fn get_state(&self) -> DrmaaResult<(JobState, String)> {
        self.refresh().await
    }

    /// Full snapshot of the job.
    pub async fn get_info(&self) -> DrmaaResult<JobInfo> {
        self.ensure_live()?;
        let shared = &self.inner.shared;
        let fetched = shared.backend.job_info(self.id()).await;
        let mut info = self.forget_if_unknown(fetched)?;
        if let Some(state) = info.job_state {
            info.job_state = Some(shared.board.observe(self.id(), state));
        }
        Ok(info)
    }

    pub(crate) async fn control(&self, verb: JobControl) -> DrmaaResult<()> {
        self.ensure_live()?;
        let shared = &self.inner.shared;
        let lock = shared.board.control_lock(self.id());
        let _guard = lock.lock().await;
        // The job may have been reaped while this call waited for the lock.
        let (state, _) = self.refresh().await?;
        if !verb.is_eligible_from(state) {
            return Err(DrmaaError::InvalidState(format!(
                "cannot {verb} job {} in state {state}",
                self.id()
            )));
        }
        shared.backend.control(self.id(), verb).await?;
        tracing::debug!(job_id = %self.id(), %verb, from = %state, "Control request accepted");
        Ok(())
    }

    /// Request suspension of a running job.
    pub async fn suspend(&self) -> DrmaaResult<()> {
        self.control(JobControl::Suspend).await
    }

    /// Request resumption of a suspended job.
    pub async fn resume(&self) -> DrmaaResult<()> {
        self.control(JobControl::Resume).await
    }

    /// Put a queued job on hold.
    pub async fn hold(&self) -> DrmaaResult<()> {
        self.control(JobControl::Hold).await
    }

    /// Release a held job.
    pub async fn release(&self) -> DrmaaResult<()> {
        self.control(JobControl::Release).await
    }

    /// Request termination of a job that has not finished yet.
    pub async fn terminate(&self) -> DrmaaResult<()> {
        self.control(JobControl::Terminate).await
    }

    /// Release all bookkeeping for a terminated job. Every later operation
    /// on this job fails with `InvalidArgument`.
    pub async fn reap(&self) -> DrmaaResult<()> {
        self.ensure_live()?;
        let shared = &self.inner.shared;
        let lock = shared.board.control_lock(self.id());
        let _guard = lock.lock().await;
        let (state, _) = self.refresh().await?;
        if !state.is_terminated() {
            return Err(DrmaaError::InvalidState(format!(
                "job {} is {state}, only terminated jobs can be reaped",
                self.id()
            )));
        }
        shared.backend.reap(self.id()).await?;
        self.inner.reaped.store(true, Ordering::Release);
        shared.board.forget(self.id());
        tracing::debug!(job_id = %self.id(), "Job reaped");
        Ok(())
    }

    /// Wait until the job has been dispatched (or has already finished).
    pub async fn wait_started(&self, timeout: Timeout) -> DrmaaResult<()> {
        wait_any(self.shared(), std::slice::from_ref(self), timeout, WaitCondition::Started).await?;
        Ok(())
    }

    /// Wait until the job is `Done` or `Failed`.
    pub async fn wait_terminated(&self, timeout: Timeout) -> DrmaaResult<()> {
        wait_any(self.shared(), std::slice::from_ref(self), timeout, WaitCondition::Terminated)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("session_name", &self.inner.session_name)
            .finish_non_exhaustive()
    }
}

/// Build handles for backend job records, skipping jobs that do not match
/// `filter`. Reaped jobs are gone from the backend and never show up here.
/// States already known to this client take precedence over a stale
/// backend snapshot.
pub(crate) fn jobs_from_records(
    shared: &Arc<Shared>,
    records: Vec<JobRecord>,
    filter: Option<&JobInfo>,
) -> Vec<Job> {
    records
        .into_iter()
        .filter_map(|mut record| {
            if let Some(known) = shared.board.state(&record.job_id) {
                let reported = record.info.job_state.unwrap_or(known);
                record.info.job_state = Some(known.observe(reported));
            }
            if filter.is_some_and(|f| !record.info.matches(f)) {
                return None;
            }
            Some(Job::new(
                shared.clone(),
                record.job_id,
                record.session_name,
                record.template,
            ))
        })
        .collect()
}
