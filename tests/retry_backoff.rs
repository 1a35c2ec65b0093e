//! A job failing with a transient ("temporary") error retries with
//! doubling backoff (~1s, ~2s, ~4s) before landing on a terminal status
//! once its retry cap is exhausted.

use attestor::JobStatus;
use std::time::Duration;

mod common;
use common::Script;

#[tokio::test]
async fn transient_failures_retry_then_exhaust_to_failed() {
    let harness = common::TestHarness::with_script(Script::AlwaysFail(
        "temporary: generator overloaded, try again".to_string(),
    ))
    .await;

    let job_id = harness.submit_labeled("retry-exhaust", 0).await;

    // retry_cap defaults to the callback config's retry cap (3): the job
    // is retried 3 times across backoffs of 1s, 2s, 4s before failing.
    let status = harness.wait_for_terminal(job_id, Duration::from_secs(15)).await;
    assert_eq!(status, JobStatus::Failed);

    let result = harness.engine.get_job_result(job_id).expect("terminal result stored");
    assert!(result
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("temporary"));
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let harness = common::TestHarness::with_script(Script::FailThenSucceed { fail_times: 2 }).await;

    let job_id = harness.submit_labeled("retry-recover", 0).await;
    let status = harness.wait_for_terminal(job_id, Duration::from_secs(15)).await;

    assert_eq!(status, JobStatus::Completed);
    let result = harness.engine.get_job_result(job_id).expect("terminal result stored");
    assert!(result.proof.is_some());
}
