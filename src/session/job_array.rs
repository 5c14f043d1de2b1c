use std::future::Future;
use std::sync::Arc;

use super::job::Job;
use crate::error::{DrmaaError, DrmaaResult};
use crate::job::{JobArrayId, JobControl};
use crate::template::JobTemplate;

struct JobArrayInner {
    id: JobArrayId,
    session_name: String,
    template: JobTemplate,
    jobs: Vec<Job>,
}

/// Handle to the jobs created by one bulk submission.
///
/// Group verbs run the job verb on every member, in index order, and keep
/// going after a failure. If any member fails the verb returns
/// [`DrmaaError::Partial`] listing the failed members.
#[derive(Clone)]
pub struct JobArray {
    inner: Arc<JobArrayInner>,
}

impl JobArray {
    pub(crate) fn new(
        id: JobArrayId,
        session_name: impl Into<String>,
        template: JobTemplate,
        jobs: Vec<Job>,
    ) -> Self {
        Self {
            inner: Arc::new(JobArrayInner {
                id,
                session_name: session_name.into(),
                template,
                jobs,
            }),
        }
    }

    pub fn id(&self) -> &JobArrayId {
        &self.inner.id
    }

    pub fn session_name(&self) -> &str {
        &self.inner.session_name
    }

    /// The template as submitted, before index substitution.
    pub fn template(&self) -> &JobTemplate {
        &self.inner.template
    }

    /// Members in index order.
    pub fn jobs(&self) -> &[Job] {
        &self.inner.jobs
    }

    async fn each<F, Fut>(&self, verb: &str, op: F) -> DrmaaResult<()>
    where
        F: Fn(Job) -> Fut,
        Fut: Future<Output = DrmaaResult<()>>,
    {
        let mut failures = Vec::new();
        for job in self.jobs() {
            if let Err(e) = op(job.clone()).await {
                failures.push((job.id().clone(), e));
            }
        }
        let attempted = self.jobs().len();
        tracing::debug!(
            array_id = %self.id(),
            verb,
            attempted,
            failed = failures.len(),
            "Group control finished"
        );
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DrmaaError::Partial {
                attempted,
                failures,
            })
        }
    }

    async fn control_all(&self, verb: JobControl) -> DrmaaResult<()> {
        self.each(&verb.to_string(), |job| async move { job.control(verb).await })
            .await
    }

    pub async fn suspend(&self) -> DrmaaResult<()> {
        self.control_all(JobControl::Suspend).await
    }

    pub async fn resume(&self) -> DrmaaResult<()> {
        self.control_all(JobControl::Resume).await
    }

    pub async fn hold(&self) -> DrmaaResult<()> {
        self.control_all(JobControl::Hold).await
    }

    pub async fn release(&self) -> DrmaaResult<()> {
        self.control_all(JobControl::Release).await
    }

    pub async fn terminate(&self) -> DrmaaResult<()> {
        self.control_all(JobControl::Terminate).await
    }

    /// Reap every member.
    pub async fn reap(&self) -> DrmaaResult<()> {
        self.each("reap", |job| async move { job.reap().await }).await
    }
}

impl std::fmt::Debug for JobArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobArray")
            .field("id", &self.inner.id)
            .field("session_name", &self.inner.session_name)
            .field("jobs", &self.inner.jobs)
            .finish_non_exhaustive()
    }
}
