//! The wait loop behind every blocking primitive.
//!
//! A waiter polls the backend for each job, then sleeps until either the
//! state board changes (a notification arrived, or another task polled) or
//! the poll interval elapses, whichever comes first. The deadline caps every
//! sleep, so a wait never overshoots its timeout by more than one backend
//! round-trip.

use super::Shared;
use super::job::Job;
use crate::error::{DrmaaError, DrmaaResult};
use crate::job::JobState;
use crate::timeout::Timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitCondition {
    Started,
    Terminated,
}

impl WaitCondition {
    fn is_met(self, state: JobState) -> bool {
        match self {
            WaitCondition::Started => state.is_started(),
            WaitCondition::Terminated => state.is_terminated(),
        }
    }
}

impl std::fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitCondition::Started => write!(f, "started"),
            WaitCondition::Terminated => write!(f, "terminated"),
        }
    }
}

/// Wait until any of `jobs` satisfies `condition` and return it.
pub(crate) async fn wait_any<'a>(
    shared: &Shared,
    jobs: &'a [Job],
    timeout: Timeout,
    condition: WaitCondition,
) -> DrmaaResult<&'a Job> {
    if jobs.is_empty() {
        return Err(DrmaaError::InvalidArgument("no jobs to wait for".into()));
    }
    // Subscribe before the first poll so no change in between is missed.
    let mut epoch = shared.board.subscribe();
    let deadline = timeout.deadline();
    let poll = shared.config.poll_interval();

    loop {
        epoch.borrow_and_update();
        for job in jobs {
            let (state, _) = job.refresh().await?;
            if condition.is_met(state) {
                return Ok(job);
            }
        }

        let Some(nap) = deadline.next_nap(poll) else {
            return Err(DrmaaError::Timeout(format!(
                "none of {} job(s) {condition} within {timeout:?}",
                jobs.len()
            )));
        };
        match tokio::time::timeout(nap, epoch.changed()).await {
            Ok(Ok(())) => tracing::trace!(%condition, "Wait woken by state change"),
            Ok(Err(_)) => {
                return Err(DrmaaError::Internal("job state board was dropped".into()));
            }
            Err(_) => tracing::trace!(%condition, "Wait poll interval elapsed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions_follow_state_groups() {
        for state in JobState::ALL {
            assert_eq!(WaitCondition::Started.is_met(state), state.is_started());
            assert_eq!(WaitCondition::Terminated.is_met(state), state.is_terminated());
        }
        assert!(!WaitCondition::Started.is_met(JobState::Requeued));
        assert!(WaitCondition::Started.is_met(JobState::Failed));
    }
}
