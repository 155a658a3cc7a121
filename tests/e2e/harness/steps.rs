use std::time::Duration;

use super::assertions::Assertion;

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Arrange
    SetLatency {
        latency: Duration,
    },
    StoreOutage {
        reads: u32,
    },
    SetContext {
        key: String,
        value: String,
    },
    RememberUser {
        key: String,
    },

    // Act
    Submit {
        key: String,
        value: String,
    },

    // Time control
    Wait {
        duration: Duration,
    },

    // Eventual assertions
    AwaitVisible {
        key: String,
        expected: Option<String>,
        timeout: Duration,
    },
    ExpectTimeout {
        key: String,
        timeout: Duration,
    },

    // Immediate assertions (can be interspersed)
    Assert {
        assertion: Assertion,
    },
}
