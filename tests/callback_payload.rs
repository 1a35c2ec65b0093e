//! A terminal result's callback payload never carries the "balance" key:
//! only the proof summary and status cross the sink boundary unless the
//! sink explicitly opts into raw proof bytes.

use attestor::{CallbackKind, CallbackSink};
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

#[tokio::test]
async fn callback_payload_excludes_private_input_keys() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let harness = common::TestHarness::new().await;
    let sink = CallbackSink {
        kind: CallbackKind::Webhook,
        address: server.uri(),
        timeout: Duration::from_secs(5),
        retry_cap: 1,
        headers: HashMap::new(),
        include_raw_proof: false,
    };

    let job_id = harness.submit_with_callbacks("with-callback", vec![sink]).await;
    let status = harness.wait_for_terminal(job_id, Duration::from_secs(5)).await;
    assert_eq!(status, attestor::JobStatus::Completed);

    // wiremock records every matched request; inspect the one delivered.
    // Job completion and callback delivery happen in sequence on the same
    // result-processing task, but delivery is a network round trip, so
    // poll briefly rather than assuming it landed the instant the job did.
    let mut requests = Vec::new();
    for _ in 0..50 {
        requests = server.received_requests().await.expect("recording enabled");
        if !requests.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = requests[0].body_json().expect("JSON payload");
    let body_text = body.to_string();
    assert!(!body_text.contains("balance"), "payload must not leak the private balance input: {}", body_text);
    assert!(body["proof"].is_object(), "payload must still carry the proof summary");
}
