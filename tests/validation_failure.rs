//! A generator error message beginning with "invalid input" is never
//! retried: the job fails on its first attempt regardless of retry cap.

use attestor::JobStatus;
use std::time::Duration;

mod common;
use common::Script;

#[tokio::test]
async fn invalid_input_message_fails_without_retry() {
    let harness =
        common::TestHarness::with_script(Script::AlwaysFail("invalid input: balance must not be negative".to_string()))
            .await;

    let job_id = harness.submit_labeled("negative-balance", 0).await;
    let status = harness.wait_for_terminal(job_id, Duration::from_secs(2)).await;

    assert_eq!(status, JobStatus::Failed);
    let result = harness.engine.get_job_result(job_id).expect("terminal result stored");
    assert_eq!(result.error.as_deref(), Some("invalid input: balance must not be negative"));
    assert_eq!(harness.generator.dispatch_order().len(), 1, "non-retryable failures dispatch exactly once");
}
