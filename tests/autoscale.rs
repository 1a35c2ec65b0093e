//! With Min=2/Max=8 workers and a scale-up threshold of 3 extra jobs in
//! the backlog, flooding the queue with slow jobs should grow the pool
//! toward its ceiling over a few scale ticks.

use std::time::Duration;

mod common;
use common::Script;

#[tokio::test]
async fn pool_scales_up_toward_max_under_sustained_backlog() {
    let mut config = attestor::EngineConfig::default();
    config.pool.min_workers = 2;
    config.pool.max_workers = 8;
    config.scale.scale_interval = Duration::from_millis(150);
    config.scale.scale_up_threshold = 3;
    config.scale.scale_up_step = 2;

    let harness = common::TestHarness::with_config(config, Script::Hang).await;

    let initial = harness.engine.pool_stats().unwrap().worker_count;
    assert_eq!(initial, 2);

    for i in 0..20 {
        harness.submit_labeled(&format!("flood-{}", i), 0).await;
    }

    let mut saw_growth = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if harness.engine.pool_stats().unwrap().worker_count > initial {
            saw_growth = true;
            break;
        }
    }
    assert!(saw_growth, "pool should scale up under sustained backlog");

    let final_count = harness.engine.pool_stats().unwrap().worker_count;
    assert!(final_count <= 8, "pool must never exceed max_workers");
}
