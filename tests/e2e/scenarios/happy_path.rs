use crate::harness::{Assertion, Scenario};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);

#[test]
fn test_record_propagates() {
    let result = Scenario::new("record_propagates")
        .submit("device-1", "online")
        .assert_accepted("device-1")
        .assert_not_visible("device-1")
        .await_value("device-1", "online", TIMEOUT)
        .assert_visible("device-1")
        .run();

    // Latency 3s: probes at 1s (absent) and 3s (visible)
    assert_eq!(result.virtual_elapsed, Duration::from_secs(3));
    result.expect("scenario should pass");
}

#[test]
fn test_multiple_records() {
    Scenario::new("multiple_records")
        .submit("tenant-a", "ACTIVE")
        .submit("tenant-b", "ACTIVE")
        .await_value("tenant-a", "ACTIVE", TIMEOUT)
        .await_value("tenant-b", "ACTIVE", TIMEOUT)
        .run()
        .unwrap();
}

#[test]
fn test_visible_after_waiting() {
    Scenario::new("visible_after_waiting")
        .with_latency(Duration::from_secs(5))
        .submit("user-1", "LOCAL")
        .wait(Duration::from_secs(5))
        .assert_visible("user-1")
        .assert(Assertion::ValueEquals {
            key: "user-1".into(),
            value: "LOCAL".into(),
        })
        .run()
        .unwrap();
}

#[test]
fn test_immediate_assertion_before_propagation_fails() {
    Scenario::new("immediate_before_propagation")
        .submit("device-2", "online")
        .assert_visible("device-2")
        .run()
        .expect_failure(1, "not visible");
}

#[test]
fn test_every_step_is_a_phase() {
    Scenario::new("phase_count")
        .submit("device-3", "online")
        .await_visible("device-3", TIMEOUT)
        .assert(Assertion::PhaseCount(2))
        .run()
        .unwrap();
}

#[test]
fn test_fast_pipeline_with_tight_polling() {
    let result = Scenario::new("fast_pipeline")
        .with_latency(Duration::from_millis(250))
        .with_polling(Duration::from_millis(100), Duration::ZERO)
        .submit("metric-1", "42")
        .await_value("metric-1", "42", Duration::from_secs(1))
        .run();

    // probes at 0, 100, 200, 300ms
    assert_eq!(result.virtual_elapsed, Duration::from_millis(300));
    result.unwrap();
}
