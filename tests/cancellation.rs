//! Cancelling a job while it is running on a worker stops it and the job
//! lands on Cancelled, never flipping to another terminal status
//! afterward even if the worker's future eventually resolves.

use attestor::JobStatus;
use std::time::Duration;

mod common;
use common::Script;

#[tokio::test]
async fn cancel_mid_run_lands_on_cancelled() {
    let harness = common::TestHarness::with_script(Script::Hang).await;

    let job_id = harness.submit_labeled("hangs-forever", 0).await;

    // Give the worker a moment to pick the job up and start running it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.engine.cancel_job(job_id).expect("running job is cancellable");

    let status = harness.wait_for_terminal(job_id, Duration::from_secs(2)).await;
    assert_eq!(status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cancel_pending_job_before_dispatch() {
    let harness = common::TestHarness::new_serial().await;
    // Occupy the single worker first so the next job stays Pending.
    harness.generator.set_script("blocker", Script::Hang);
    let _blocker = harness.submit_labeled("blocker", 10).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let pending = harness.submit_labeled("never-runs", 0).await;
    harness.engine.cancel_job(pending).expect("pending job is cancellable");

    let status = harness.engine.get_job_status(pending).expect("job is known");
    assert_eq!(status, JobStatus::Cancelled);
}
