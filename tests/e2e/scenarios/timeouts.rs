use crate::harness::Scenario;
use std::time::Duration;

#[test]
fn test_missing_record_times_out_at_deadline() {
    let result = Scenario::new("missing_record")
        .expect_timeout("ghost", Duration::from_secs(10))
        .run();

    assert!(result.virtual_elapsed >= Duration::from_secs(10));
    assert!(result.virtual_elapsed < Duration::from_secs(12));
    result.unwrap();
}

#[test]
fn test_timeout_names_the_condition() {
    Scenario::new("timeout_message")
        .await_visible("ghost", Duration::from_secs(6))
        .run()
        .expect_failure(0, "ghost reaches the store");
}

#[test]
fn test_timeout_reports_duration() {
    Scenario::new("timeout_duration")
        .await_visible("ghost", Duration::from_secs(6))
        .run()
        .expect_failure(0, "not satisfied within 6s");
}

#[test]
fn test_wrong_value_fails_after_propagation() {
    Scenario::new("wrong_value")
        .submit("tenant-1", "SUSPENDED")
        .await_value("tenant-1", "ACTIVE", Duration::from_secs(30))
        .run()
        .expect_failure(1, "expected \"ACTIVE\"");
}
