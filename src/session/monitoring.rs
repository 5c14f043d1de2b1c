use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::Shared;
use super::job::{Job, jobs_from_records};
use super::reservation::{Reservation, reservations_from_records};
use crate::error::{DrmaaError, DrmaaResult};
use crate::info::{JobInfo, MachineInfo, QueueInfo};

/// Read-only view of the whole cluster.
///
/// Listings are best effort: the DRM system may hide entries the caller
/// is not allowed to see.
pub struct MonitoringSession {
    shared: Arc<Shared>,
    contact: Option<String>,
    closed: AtomicBool,
}

impl MonitoringSession {
    pub(crate) fn new(shared: Arc<Shared>, contact: Option<String>) -> Self {
        Self {
            shared,
            contact,
            closed: AtomicBool::new(false),
        }
    }

    pub fn contact(&self) -> Option<&str> {
        self.contact.as_deref()
    }

    fn check(&self) -> DrmaaResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DrmaaError::InvalidSession(
                "monitoring session is closed".into(),
            ));
        }
        Ok(())
    }

    pub async fn get_all_reservations(&self) -> DrmaaResult<Vec<Reservation>> {
        self.check()?;
        let records = self.shared.backend.all_reservations().await?;
        Ok(reservations_from_records(&self.shared, records))
    }

    /// Every visible job matching `filter`, including jobs submitted outside
    /// any DRMAA session.
    pub async fn get_all_jobs(&self, filter: Option<&JobInfo>) -> DrmaaResult<Vec<Job>> {
        self.check()?;
        let records = self.shared.backend.all_jobs().await?;
        Ok(jobs_from_records(&self.shared, records, filter))
    }

    /// Queues, restricted to `names` when given.
    pub async fn get_all_queues(&self, names: Option<&[&str]>) -> DrmaaResult<Vec<QueueInfo>> {
        self.check()?;
        let queues = self.shared.backend.all_queues().await?;
        Ok(queues
            .into_iter()
            .filter(|q| name_selected(names, q.name.as_deref()))
            .collect())
    }

    /// Machines, restricted to `names` when given.
    pub async fn get_all_machines(&self, names: Option<&[&str]>) -> DrmaaResult<Vec<MachineInfo>> {
        self.check()?;
        let machines = self.shared.backend.all_machines().await?;
        Ok(machines
            .into_iter()
            .filter(|m| name_selected(names, m.name.as_deref()))
            .collect())
    }

    /// Release this handle. Closing twice is harmless.
    pub fn close(&self) -> DrmaaResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Monitoring session closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for MonitoringSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringSession")
            .field("contact", &self.contact)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn name_selected(names: Option<&[&str]>, name: Option<&str>) -> bool {
    match names {
        None => true,
        Some(names) => name.is_some_and(|name| names.contains(&name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_selection() {
        assert!(name_selected(None, None));
        assert!(name_selected(None, Some("q")));
        assert!(name_selected(Some(["q", "r"].as_slice()), Some("r")));
        assert!(!name_selected(Some(["q"].as_slice()), Some("r")));
        assert!(!name_selected(Some(["q"].as_slice()), None));
        assert!(!name_selected(Some(Vec::<&str>::new().as_slice()), Some("q")));
    }
}
