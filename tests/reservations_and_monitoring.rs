use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use drmaa2::backend::mock::MockBackend;
use drmaa2::{
    Capabilities, Capability, DrmaaError, JobInfo, JobState, JobTemplate, MachineInfo,
    ReservationId, ReservationStart, ReservationTemplate, SessionManager, Version,
};

fn setup() -> (Arc<MockBackend>, SessionManager) {
    let backend = Arc::new(
        MockBackend::new()
            .with_queue("gpu")
            .with_machine(MachineInfo::named("mock-node-02")),
    );
    let manager = SessionManager::with_backend(backend.clone()).unwrap();
    (backend, manager)
}

fn one_hour_now(slots: u64) -> ReservationTemplate {
    ReservationTemplate {
        reservation_name: Some("maintenance".into()),
        start_time: Some(ReservationStart::Now),
        duration: Some(Duration::from_secs(3600)),
        min_slots: Some(1),
        max_slots: Some(slots),
        ..Default::default()
    }
}

#[tokio::test]
async fn reservation_lifecycle() {
    let (_, manager) = setup();
    let session = manager
        .create_reservation_session(Some("ar"), None)
        .await
        .unwrap();
    let reservation = session.request_reservation(&one_hour_now(4)).await.unwrap();
    assert_eq!(reservation.session_name(), "ar");

    let info = reservation.get_info().await.unwrap();
    assert_eq!(info.reservation_id.as_ref(), Some(reservation.id()));
    assert_eq!(info.reserved_slots, Some(4));
    assert_eq!(info.reservation_name.as_deref(), Some("maintenance"));
    let start = info.reserved_start_time.unwrap();
    let end = info.reserved_end_time.unwrap();
    assert_eq!(end - start, chrono::Duration::hours(1));

    let found = session.get_reservation(reservation.id()).await.unwrap();
    assert_eq!(found.template(), reservation.template());
    assert_eq!(session.get_reservations().await.unwrap().len(), 1);

    reservation.terminate().await.unwrap();
    // Terminating again leaves the session's bookkeeping intact.
    reservation.terminate().await.unwrap();
    assert!(matches!(
        reservation.get_info().await,
        Err(DrmaaError::InvalidArgument(_))
    ));
    assert!(session.get_reservations().await.unwrap().is_empty());
    assert!(matches!(
        session.get_reservation(reservation.id()).await,
        Err(DrmaaError::InvalidArgument(_))
    ));

    let again = session.request_reservation(&one_hour_now(2)).await.unwrap();
    assert_ne!(again.id(), reservation.id());
    assert_eq!(session.get_reservations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_reservation_bounds() {
    let (_, manager) = setup();
    let session = manager.create_reservation_session(None, None).await.unwrap();

    let mut inverted = one_hour_now(4);
    inverted.min_slots = Some(8);
    assert!(matches!(
        session.request_reservation(&inverted).await,
        Err(DrmaaError::InvalidArgument(_))
    ));

    let start = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
    let backwards = ReservationTemplate {
        start_time: Some(ReservationStart::At(start)),
        end_time: Some(start - chrono::Duration::minutes(5)),
        ..Default::default()
    };
    assert!(matches!(
        session.request_reservation(&backwards).await,
        Err(DrmaaError::InvalidArgument(_))
    ));

    let too_long = ReservationTemplate {
        start_time: Some(ReservationStart::At(start)),
        end_time: Some(start + chrono::Duration::minutes(30)),
        duration: Some(Duration::from_secs(3600)),
        ..Default::default()
    };
    assert!(matches!(
        session.request_reservation(&too_long).await,
        Err(DrmaaError::InvalidArgument(_))
    ));
    assert!(session.get_reservations().await.unwrap().is_empty());
}

#[tokio::test]
async fn reservation_fields_need_capabilities() {
    let backend = Arc::new(MockBackend::with_capabilities(
        Capabilities::full("mock", Version::new(1, 0)).without(Capability::RtStartnow),
    ));
    let manager = SessionManager::with_backend(backend).unwrap();
    let session = manager.create_reservation_session(None, None).await.unwrap();
    assert!(matches!(
        session.request_reservation(&one_hour_now(1)).await,
        Err(DrmaaError::UnsupportedAttribute(_))
    ));
}

#[tokio::test]
async fn closed_reservation_session_is_invalid() {
    let (_, manager) = setup();
    let session = manager.create_reservation_session(None, None).await.unwrap();
    session.close().unwrap();
    session.close().unwrap();
    assert!(matches!(
        session.request_reservation(&one_hour_now(1)).await,
        Err(DrmaaError::InvalidSession(_))
    ));
    assert!(matches!(
        session.get_reservation(&ReservationId::new("mock-ar-1")).await,
        Err(DrmaaError::InvalidSession(_))
    ));
    manager.destroy_session(session.session_name()).await.unwrap();
}

#[tokio::test]
async fn monitoring_sees_the_whole_cluster() {
    let (backend, manager) = setup();
    let session = manager.create_job_session(Some("mine"), None).await.unwrap();
    let mine = session.run_job(&JobTemplate::command("/bin/true")).await.unwrap();
    let foreign =
        backend.inject_foreign_job(&JobTemplate::command("/bin/false").with_name("legacy"));
    backend.advance(&foreign, JobState::Running).unwrap();

    let monitor = manager.open_monitoring_session(Some("mock://cluster"));
    assert_eq!(monitor.contact(), Some("mock://cluster"));

    let all = monitor.get_all_jobs(None).await.unwrap();
    let ids: Vec<_> = all.iter().map(|j| j.id().clone()).collect();
    assert_eq!(ids, [mine.id().clone(), foreign.clone()]);
    assert_eq!(all[1].session_name(), "");

    let running = monitor
        .get_all_jobs(Some(&JobInfo::with_state(JobState::Running)))
        .await
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id(), &foreign);

    // Session views stay scoped to the session.
    assert_eq!(session.get_jobs(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn monitoring_filters_queues_and_machines_by_name() {
    let (_, manager) = setup();
    let monitor = manager.open_monitoring_session(None);

    assert_eq!(monitor.get_all_queues(None).await.unwrap().len(), 2);
    let gpu = monitor.get_all_queues(Some(["gpu"].as_slice())).await.unwrap();
    assert_eq!(gpu.len(), 1);
    assert_eq!(gpu[0].name.as_deref(), Some("gpu"));

    assert_eq!(monitor.get_all_machines(None).await.unwrap().len(), 2);
    let node = monitor
        .get_all_machines(Some(["mock-node-01", "unknown"].as_slice()))
        .await
        .unwrap();
    assert_eq!(node.len(), 1);
    assert_eq!(node[0].sockets, Some(2));
}

#[tokio::test]
async fn monitoring_lists_live_reservations() {
    let (_, manager) = setup();
    let session = manager.create_reservation_session(None, None).await.unwrap();
    let kept = session.request_reservation(&one_hour_now(1)).await.unwrap();
    let dropped = session.request_reservation(&one_hour_now(1)).await.unwrap();
    dropped.terminate().await.unwrap();

    let monitor = manager.open_monitoring_session(None);
    let all = monitor.get_all_reservations().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id(), kept.id());
}

#[tokio::test]
async fn closed_monitoring_session_is_invalid() {
    let (_, manager) = setup();
    let monitor = manager.open_monitoring_session(None);
    monitor.close().unwrap();
    monitor.close().unwrap();
    assert!(matches!(
        monitor.get_all_jobs(None).await,
        Err(DrmaaError::InvalidSession(_))
    ));
    assert!(matches!(
        monitor.get_all_queues(None).await,
        Err(DrmaaError::InvalidSession(_))
    ));
}
