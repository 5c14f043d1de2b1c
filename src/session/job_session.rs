use std::sync::Arc;

use super::Shared;
use super::job::{Job, jobs_from_records};
use super::job_array::JobArray;
use super::registry::SessionHandle;
use super::wait::{WaitCondition, wait_any};
use crate::backend::{BulkRequest, SessionRecord};
use crate::bulk::BulkRange;
use crate::capability::Capability;
use crate::error::{DrmaaError, DrmaaResult};
use crate::info::JobInfo;
use crate::job::JobArrayId;
use crate::template::JobTemplate;
use crate::timeout::Timeout;

/// A named container for submitted jobs.
///
/// Closing the handle leaves the session itself in place; it persists
/// until [`SessionManager::destroy_session`](super::SessionManager::destroy_session).
pub struct JobSession {
    shared: Arc<Shared>,
    handle: SessionHandle,
    record: SessionRecord,
}

impl JobSession {
    pub(crate) fn new(shared: Arc<Shared>, handle: SessionHandle, record: SessionRecord) -> Self {
        Self {
            shared,
            handle,
            record,
        }
    }

    pub fn session_name(&self) -> &str {
        self.handle.name()
    }

    pub fn contact(&self) -> Option<&str> {
        self.record.contact.as_deref()
    }

    /// Job categories the DRM system offers in this session.
    pub fn job_categories(&self) -> &[String] {
        &self.record.job_categories
    }

    fn check(&self) -> DrmaaResult<()> {
        self.handle.check(&self.shared.registry)
    }

    /// Jobs of this session matching `filter`, in submission order. Reaped
    /// jobs are not listed.
    pub async fn get_jobs(&self, filter: Option<&JobInfo>) -> DrmaaResult<Vec<Job>> {
        self.check()?;
        let records = self.shared.backend.session_jobs(self.session_name()).await?;
        Ok(jobs_from_records(&self.shared, records, filter))
    }

    /// Look up a job array of this session by id.
    pub async fn get_job_array(&self, id: &JobArrayId) -> DrmaaResult<JobArray> {
        self.check()?;
        let record = self.shared.backend.job_array(self.session_name(), id).await?;
        let jobs = jobs_from_records(&self.shared, record.jobs, None);
        Ok(JobArray::new(record.array_id, record.session_name, record.template, jobs))
    }

    /// Submit one job.
    pub async fn run_job(&self, template: &JobTemplate) -> DrmaaResult<Job> {
        self.check()?;
        template.validate(self.shared.capabilities())?;
        let id = self.shared.backend.submit(self.session_name(), template).await?;
        self.shared.board.track(&id);
        tracing::debug!(job_id = %id, session = %self.session_name(), "Job submitted");
        Ok(Job::new(
            self.shared.clone(),
            id,
            self.session_name(),
            template.clone(),
        ))
    }

    /// Submit one job per index in `begin..=end` stepping by `step`, with
    /// the parametric index placeholder substituted in each copy of
    /// `template`.
    ///
    /// `max_parallel` bounds how many members the DRM system may run at
    /// once; `None` leaves it unbounded. The hint is dropped when the backend
    /// does not support [`Capability::BulkJobsMaxparallel`].
    pub async fn run_bulk_jobs(
        &self,
        template: &JobTemplate,
        begin: u64,
        end: u64,
        step: u64,
        max_parallel: Option<u64>,
    ) -> DrmaaResult<JobArray> {
        self.check()?;
        let range = BulkRange::new(begin, end, step)?;
        if max_parallel == Some(0) {
            return Err(DrmaaError::InvalidArgument(
                "max_parallel must be positive".into(),
            ));
        }
        template.validate(self.shared.capabilities())?;

        let bounded = self
            .shared
            .capabilities()
            .supports(Capability::BulkJobsMaxparallel);
        let max_parallel = match max_parallel {
            Some(limit) if !bounded => {
                tracing::warn!(
                    limit,
                    "Backend does not support max_parallel, submitting unbounded"
                );
                None
            }
            other => other,
        };
        let members: Vec<JobTemplate> = range
            .indices()
            .map(|index| template.with_parametric_index(index))
            .collect();
        let request = BulkRequest {
            range,
            template: template.clone(),
            members,
            max_parallel,
        };

        let submission = self
            .shared
            .backend
            .submit_bulk(self.session_name(), &request)
            .await?;
        if submission.jobs.len() != request.members.len() {
            return Err(DrmaaError::Internal(format!(
                "backend created {} jobs for {} indices",
                submission.jobs.len(),
                request.members.len()
            )));
        }

        let jobs = submission
            .jobs
            .into_iter()
            .zip(request.members)
            .map(|(id, member)| {
                self.shared.board.track(&id);
                Job::new(self.shared.clone(), id, self.session_name(), member)
            })
            .collect();
        tracing::info!(
            array_id = %submission.array_id,
            session = %self.session_name(),
            begin,
            end,
            step,
            count = range.len(),
            "Job array submitted"
        );
        Ok(JobArray::new(
            submission.array_id,
            self.session_name(),
            request.template,
            jobs,
        ))
    }

    /// Wait until any of `jobs` has started and return it.
    pub async fn wait_any_started(&self, jobs: &[Job], timeout: Timeout) -> DrmaaResult<Job> {
        self.check()?;
        wait_any(&self.shared, jobs, timeout, WaitCondition::Started)
            .await
            .cloned()
    }

    /// Wait until any of `jobs` has terminated and return it.
    pub async fn wait_any_terminated(&self, jobs: &[Job], timeout: Timeout) -> DrmaaResult<Job> {
        self.check()?;
        wait_any(&self.shared, jobs, timeout, WaitCondition::Terminated)
            .await
            .cloned()
    }

    /// Release this handle. Closing twice is harmless.
    pub fn close(&self) -> DrmaaResult<()> {
        if self.handle.close() {
            tracing::debug!(session = %self.session_name(), "Job session closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for JobSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSession")
            .field("handle", &self.handle)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
