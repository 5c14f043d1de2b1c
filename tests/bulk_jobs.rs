use std::sync::Arc;

use drmaa2::backend::mock::MockBackend;
use drmaa2::{
    Capabilities, Capability, DrmaaError, JobArray, JobArrayId, JobSession, JobState, JobTemplate,
    PARAMETRIC_INDEX, SessionManager, Version,
};
use proptest::prelude::*;

async fn session() -> (Arc<MockBackend>, SessionManager, JobSession) {
    let backend = Arc::new(MockBackend::new());
    let manager = SessionManager::with_backend(backend.clone()).unwrap();
    let session = manager.create_job_session(None, None).await.unwrap();
    (backend, manager, session)
}

fn indexed() -> JobTemplate {
    JobTemplate::command("/usr/bin/render")
        .with_args([PARAMETRIC_INDEX])
        .with_output_path(format!("frame-{PARAMETRIC_INDEX}.log"))
}

fn member_indices(array: &JobArray) -> Vec<String> {
    array
        .jobs()
        .iter()
        .map(|job| job.template().args.as_ref().unwrap()[0].clone())
        .collect()
}

#[tokio::test]
async fn step_three_hits_the_end_index() {
    let (_, _m, session) = session().await;
    let array = session.run_bulk_jobs(&indexed(), 1, 10, 3, None).await.unwrap();
    assert_eq!(member_indices(&array), ["1", "4", "7", "10"]);
    assert_eq!(
        array.jobs()[3].template().output_path.as_deref(),
        Some("frame-10.log")
    );
    // The array keeps the unsubstituted template.
    assert_eq!(array.template(), &indexed());
}

#[tokio::test]
async fn step_four_stops_before_the_end_index() {
    let (_, _m, session) = session().await;
    let array = session.run_bulk_jobs(&indexed(), 1, 10, 4, None).await.unwrap();
    assert_eq!(member_indices(&array), ["1", "5", "9"]);
}

#[tokio::test]
async fn single_index_range() {
    let (_, _m, session) = session().await;
    let array = session.run_bulk_jobs(&indexed(), 7, 7, 100, None).await.unwrap();
    assert_eq!(member_indices(&array), ["7"]);
}

#[tokio::test]
async fn invalid_ranges_create_nothing() {
    let (_, _m, session) = session().await;
    for (begin, end, step) in [(5, 3, 1), (0, 10, 1), (1, 10, 0)] {
        assert!(matches!(
            session.run_bulk_jobs(&indexed(), begin, end, step, None).await,
            Err(DrmaaError::InvalidArgument(_))
        ));
    }
    assert!(matches!(
        session.run_bulk_jobs(&indexed(), 1, 10, 1, Some(0)).await,
        Err(DrmaaError::InvalidArgument(_))
    ));
    assert!(session.get_jobs(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn max_parallel_without_capability_is_ignored() {
    let backend = Arc::new(MockBackend::with_capabilities(
        Capabilities::full("mock", Version::new(1, 0)).without(Capability::BulkJobsMaxparallel),
    ));
    let manager = SessionManager::with_backend(backend).unwrap();
    let session = manager.create_job_session(None, None).await.unwrap();
    let array = session.run_bulk_jobs(&indexed(), 1, 4, 1, Some(2)).await.unwrap();
    assert_eq!(array.jobs().len(), 4);
}

#[tokio::test]
async fn array_is_found_by_id() {
    let (_, _m, session) = session().await;
    let array = session.run_bulk_jobs(&indexed(), 1, 3, 1, None).await.unwrap();
    let found = session.get_job_array(array.id()).await.unwrap();
    assert_eq!(found.id(), array.id());
    assert_eq!(found.session_name(), session.session_name());
    let ids: Vec<_> = found.jobs().iter().map(|j| j.id().clone()).collect();
    let expected: Vec<_> = array.jobs().iter().map(|j| j.id().clone()).collect();
    assert_eq!(ids, expected);

    assert!(matches!(
        session.get_job_array(&JobArrayId::new("mock-array-999")).await,
        Err(DrmaaError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn group_verbs_report_partial_failure_without_short_circuit() {
    let (backend, _m, session) = session().await;
    let array = session.run_bulk_jobs(&indexed(), 1, 3, 1, None).await.unwrap();
    let members = array.jobs();
    backend.advance(members[2].id(), JobState::Running).unwrap();

    match array.suspend().await {
        Err(DrmaaError::Partial {
            attempted,
            failures,
        }) => {
            assert_eq!(attempted, 3);
            let failed: Vec<_> = failures.iter().map(|(id, _)| id.clone()).collect();
            assert_eq!(failed, [members[0].id().clone(), members[1].id().clone()]);
            assert!(failures
                .iter()
                .all(|(_, e)| matches!(e, DrmaaError::InvalidState(_))));
        }
        other => panic!("expected a partial failure, got {other:?}"),
    }
    // The eligible member was still suspended.
    assert_eq!(members[2].get_state().await.unwrap().0, JobState::Suspended);
}

#[tokio::test]
async fn group_terminate_and_reap() {
    let (_, _m, session) = session().await;
    let array = session.run_bulk_jobs(&indexed(), 1, 3, 1, None).await.unwrap();
    array.hold().await.unwrap();
    array.release().await.unwrap();
    array.terminate().await.unwrap();
    for job in array.jobs() {
        assert_eq!(job.get_state().await.unwrap().0, JobState::Failed);
    }

    array.reap().await.unwrap();
    let err = array.reap().await.unwrap_err();
    assert!(matches!(
        err,
        DrmaaError::Partial { attempted: 3, ref failures } if failures.len() == 3
    ));
    assert!(session.get_jobs(None).await.unwrap().is_empty());
}

proptest! {
    #[test]
    fn prop_submitted_members_follow_range(begin in 1u64..20, span in 0u64..40, step in 1u64..9) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (_, _m, session) = session().await;
            let end = begin + span;
            let array = session.run_bulk_jobs(&indexed(), begin, end, step, None).await.unwrap();
            let n = (end - begin) / step;
            let expected: Vec<String> = (0..=n).map(|k| (begin + k * step).to_string()).collect();
            prop_assert_eq!(member_indices(&array), expected);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
