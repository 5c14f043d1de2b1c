//! Walk through a DRMAA2 session against the in-memory mock DRM.
//!
//! A background task plays the scheduler: it dispatches and finishes jobs
//! while the main task waits on them. Set `RUST_LOG=drmaa2=debug` to see
//! the client layer's own logging.

use std::sync::Arc;
use std::time::Duration;

use drmaa2::backend::mock::MockBackend;
use drmaa2::{
    Capability, JobId, JobState, JobTemplate, ManagerConfig, PARAMETRIC_INDEX, SessionManager,
    Timeout,
};
use tracing_subscriber::EnvFilter;

/// Dispatch each job, then finish it a little later.
fn schedule(backend: Arc<MockBackend>, jobs: Vec<JobId>) {
    tokio::spawn(async move {
        for job in jobs {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Err(e) = backend.advance(&job, JobState::Running) {
                tracing::warn!(job_id = %job, error = %e, "Scheduler could not dispatch job");
                continue;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Err(e) = backend.advance(&job, JobState::Done) {
                tracing::warn!(job_id = %job, error = %e, "Scheduler could not finish job");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let backend = Arc::new(MockBackend::new());
    let manager = SessionManager::new(
        backend.clone(),
        ManagerConfig::default().with_poll_interval(Duration::from_millis(100)),
    )?;

    println!("DRMS:  {} {}", manager.drms_name(), manager.drms_version());
    println!("DRMAA: {} {}", manager.drmaa_name(), manager.drmaa_version());
    for cap in Capability::ALL {
        println!("  {cap:<22} {}", manager.supports(cap));
    }
    println!();

    manager.register_event_notification(|n| {
        if let (Some(job), Some(state)) = (&n.job_id, n.job_state) {
            println!("  event: {job} -> {state}");
        }
    })?;

    let session = manager.create_job_session(Some("demo"), None).await?;

    // Single job
    let job = session
        .run_job(&JobTemplate::command("/bin/hostname").with_name("hello"))
        .await?;
    println!("Submitted {}", job.id());
    schedule(backend.clone(), vec![job.id().clone()]);

    job.wait_started(Timeout::from_secs(5)?).await?;
    job.wait_terminated(Timeout::INFINITE).await?;
    let info = job.get_info().await?;
    println!(
        "{} finished: state={:?} exit={:?} host={:?}",
        job.id(),
        info.job_state,
        info.exit_status,
        info.allocated_machines
    );
    job.reap().await?;

    // Job array
    let template = JobTemplate::command("/usr/bin/render")
        .with_args(["--frame", PARAMETRIC_INDEX])
        .with_output_path(format!("frame-{PARAMETRIC_INDEX}.log"));
    let array = session.run_bulk_jobs(&template, 1, 10, 3, Some(2)).await?;
    println!("\nArray {} has {} members:", array.id(), array.jobs().len());
    for member in array.jobs() {
        println!("  {} args={:?}", member.id(), member.template().args);
    }

    let ids = array.jobs().iter().map(|j| j.id().clone()).collect();
    schedule(backend.clone(), ids);

    let first = session
        .wait_any_terminated(array.jobs(), Timeout::from_secs(5)?)
        .await?;
    println!("First member done: {}", first.id());
    for member in array.jobs() {
        member.wait_terminated(Timeout::INFINITE).await?;
    }
    array.reap().await?;

    // Monitoring
    let monitor = manager.open_monitoring_session(None);
    let queues = monitor.get_all_queues(None).await?;
    let machines = monitor.get_all_machines(None).await?;
    println!(
        "\nQueues: {:?}",
        queues.iter().filter_map(|q| q.name.as_deref()).collect::<Vec<_>>()
    );
    println!(
        "Machines: {:?}",
        machines.iter().filter_map(|m| m.name.as_deref()).collect::<Vec<_>>()
    );
    println!("Jobs left: {}", monitor.get_all_jobs(None).await?.len());

    session.close()?;
    manager.destroy_session("demo").await?;
    Ok(())
}
