use std::sync::{Arc, PoisonError};

use super::Shared;
use super::registry::SessionHandle;
use crate::backend::{ReservationRecord, SessionRecord};
use crate::error::{DrmaaError, DrmaaResult};
use crate::info::{ReservationId, ReservationInfo};
use crate::template::ReservationTemplate;

/// A named container for advance reservations.
pub struct ReservationSession {
    shared: Arc<Shared>,
    handle: SessionHandle,
    record: SessionRecord,
}

impl ReservationSession {
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

    fn check(&self) -> DrmaaResult<()> {
        self.handle.check(&self.shared.registry)
    }

    /// Ask the DRM system for capacity described by `template`.
    pub async fn request_reservation(
        &self,
        template: &ReservationTemplate,
    ) -> DrmaaResult<Reservation> {
        self.check()?;
        template.validate(self.shared.capabilities())?;
        let record = self
            .shared
            .backend
            .request_reservation(self.session_name(), template)
            .await?;
        tracing::info!(
            reservation_id = %record.reservation_id,
            session = %self.session_name(),
            "Reservation granted"
        );
        Ok(Reservation::from_record(self.shared.clone(), record))
    }

    /// Look up a reservation of this session by id.
    pub async fn get_reservation(&self, id: &ReservationId) -> DrmaaResult<Reservation> {
        self.check()?;
        self.get_reservations()
            .await?
            .into_iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| {
                DrmaaError::InvalidArgument(format!(
                    "no reservation {id} in session {}",
                    self.session_name()
                ))
            })
    }

    /// Reservations of this session that have not been terminated.
    pub async fn get_reservations(&self) -> DrmaaResult<Vec<Reservation>> {
        self.check()?;
        let records = self
            .shared
            .backend
            .session_reservations(self.session_name())
            .await?;
        Ok(reservations_from_records(&self.shared, records))
    }

    /// Release this handle. Closing twice is harmless.
    pub fn close(&self) -> DrmaaResult<()> {
        if self.handle.close() {
            tracing::debug!(session = %self.session_name(), "Reservation session closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for ReservationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationSession")
            .field("handle", &self.handle)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

struct ReservationInner {
    id: ReservationId,
    session_name: String,
    template: ReservationTemplate,
    shared: Arc<Shared>,
}

/// Handle to one advance reservation.
#[derive(Clone)]
pub struct Reservation {
    inner: Arc<ReservationInner>,
}

impl Reservation {
    fn from_record(shared: Arc<Shared>, record: ReservationRecord) -> Self {
        Self {
            inner: Arc::new(ReservationInner {
                id: record.reservation_id,
                session_name: record.session_name,
                template: record.template,
                shared,
            }),
        }
    }

    pub fn id(&self) -> &ReservationId {
        &self.inner.id
    }

    pub fn session_name(&self) -> &str {
        &self.inner.session_name
    }

    pub fn template(&self) -> &ReservationTemplate {
        &self.inner.template
    }

    fn is_terminated(&self) -> bool {
        is_terminated(&self.inner.shared, self.id())
    }

    /// What the DRM system actually reserved.
    pub async fn get_info(&self) -> DrmaaResult<ReservationInfo> {
        if self.is_terminated() {
            return Err(DrmaaError::InvalidArgument(format!(
                "reservation {} was terminated",
                self.id()
            )));
        }
        self.inner.shared.backend.reservation_info(self.id()).await
    }

    /// Give the reserved capacity back. Terminating again succeeds without
    /// contacting the DRM system.
    pub async fn terminate(&self) -> DrmaaResult<()> {
        if self.is_terminated() {
            tracing::debug!(reservation_id = %self.id(), "Reservation already terminated");
            return Ok(());
        }
        let shared = &self.inner.shared;
        shared.backend.terminate_reservation(self.id()).await?;
        shared
            .terminated_reservations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.id().clone());
        tracing::info!(reservation_id = %self.id(), "Reservation terminated");
        Ok(())
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("id", &self.inner.id)
            .field("session_name", &self.inner.session_name)
            .finish_non_exhaustive()
    }
}

fn is_terminated(shared: &Shared, id: &ReservationId) -> bool {
    shared
        .terminated_reservations
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(id)
}

pub(crate) fn reservations_from_records(
    shared: &Arc<Shared>,
    records: Vec<ReservationRecord>,
) -> Vec<Reservation> {
    records
        .into_iter()
        .filter(|record| !is_terminated(shared, &record.reservation_id))
        .map(|record| Reservation::from_record(shared.clone(), record))
        .collect()
}
