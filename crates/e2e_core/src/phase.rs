//! Phase execution with uniform instrumentation.
//!
//! Every unit of test work runs as a named phase (arrange, act, assert,
//! cleanup). The executor logs the phase before and after it runs, attaches
//! the stringified result or failure message to the test report, and turns
//! any failure into [`E2eError::PhaseFailed`]. It never retries.

use crate::attachments::{Attachment, AttachmentSink};
use crate::clock::Clock;
use crate::error::{BoxError, E2eError, PanicError, Result};
use crate::poller::{ConditionPoller, ConditionRecord, PollSchedule};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tracing::{error, info, info_span};

/// Kind of work a phase performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Arrange,
    Act,
    Assert,
    Cleanup,
}

impl Phase {
    /// Upper-case label used in logs and attachment names.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Arrange => "ARRANGE",
            Self::Act => "ACT",
            Self::Assert => "ASSERT",
            Self::Cleanup => "CLEANUP",
        }
    }

    /// What the phase is for.
    pub fn purpose(&self) -> &'static str {
        match self {
            Self::Arrange => "Setting up test data",
            Self::Act => "Executing action",
            Self::Assert => "Verifying outcome",
            Self::Cleanup => "Cleaning up test data",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a phase ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseOutcome {
    /// Stringified value returned by the action.
    Success(String),
    /// Message of the failure cause.
    Failure(String),
}

/// One executed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub description: String,
    pub started_at: SystemTime,
    pub duration: Duration,
    pub outcome: PhaseOutcome,
}

/// Runs phases for one test and keeps their history.
pub struct PhaseExecutor {
    test_id: String,
    sink: Arc<dyn AttachmentSink>,
    poller: ConditionPoller,
    records: Mutex<Vec<PhaseRecord>>,
}

impl fmt::Debug for PhaseExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseExecutor")
            .field("test_id", &self.test_id)
            .finish_non_exhaustive()
    }
}

impl PhaseExecutor {
    /// Executor for `test_id` polling on the system clock.
    pub fn new(test_id: impl Into<String>, sink: Arc<dyn AttachmentSink>) -> Self {
        Self {
            test_id: test_id.into(),
            sink,
            poller: ConditionPoller::new(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Replace the clock used by eventual assertions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.poller = ConditionPoller::with_clock(clock);
        self
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// The underlying poller, for waits that should not be reported as a phase.
    pub fn poller(&self) -> &ConditionPoller {
        &self.poller
    }

    /// Attach a diagnostic payload to this test's report.
    pub fn attach(&self, name: impl Into<String>, payload: impl Into<String>) {
        self.sink.attach(Attachment {
            test_id: self.test_id.clone(),
            name: name.into(),
            payload: payload.into(),
        });
    }

    /// Phases executed so far, oldest first.
    pub fn records(&self) -> Vec<PhaseRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Run `action` as `phase` and return its value unchanged.
    ///
    /// An error or panic from the action becomes [`E2eError::PhaseFailed`]
    /// wrapping the original cause.
    pub fn execute_phase<T, E, F>(&self, phase: Phase, description: &str, action: F) -> Result<T>
    where
        T: fmt::Debug,
        E: Into<BoxError>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.instrument(phase, description, action, |value| format!("{:?}", value))
    }

    /// Side-effect-only variant of [`execute_phase`](Self::execute_phase).
    pub fn run_phase<E, F>(&self, phase: Phase, description: &str, action: F) -> Result<()>
    where
        E: Into<BoxError>,
        F: FnOnce() -> std::result::Result<(), E>,
    {
        self.instrument(phase, description, action, |_| "none".to_string())
    }

    /// Assertion that must hold right now, reported as `"<description> (immediate)"`.
    pub fn assert_immediate<T, E, F>(&self, description: &str, action: F) -> Result<T>
    where
        T: fmt::Debug,
        E: Into<BoxError>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.execute_phase(Phase::Assert, &format!("{} (immediate)", description), action)
    }

    /// Wait for `probe` to yield a value, reported as `"<description> (eventual)"`.
    ///
    /// A timeout surfaces as a phase failure whose cause is the condition
    /// timeout; see [`E2eError::as_condition_timeout`].
    pub fn await_condition<T, E, P>(
        &self,
        description: &str,
        schedule: &PollSchedule,
        probe: P,
    ) -> Result<T>
    where
        T: fmt::Debug,
        E: fmt::Display,
        P: FnMut() -> std::result::Result<Option<T>, E>,
    {
        self.execute_phase(Phase::Assert, &format!("{} (eventual)", description), || {
            self.poller.await_condition(description, schedule, probe)
        })
    }

    /// Like [`await_condition`](Self::await_condition), also returning the poll record.
    pub fn poll_condition<T, E, P>(
        &self,
        description: &str,
        schedule: &PollSchedule,
        probe: P,
    ) -> Result<(T, ConditionRecord)>
    where
        T: fmt::Debug,
        E: fmt::Display,
        P: FnMut() -> std::result::Result<Option<T>, E>,
    {
        self.execute_phase(Phase::Assert, &format!("{} (eventual)", description), || {
            match self.poller.poll(description, schedule, probe) {
                (record, Some(value)) => Ok((value, record)),
                (record, None) => Err(record.into_timeout_error()),
            }
        })
    }

    /// Boolean variant of [`await_condition`](Self::await_condition).
    pub fn await_boolean_condition<E, P>(
        &self,
        description: &str,
        schedule: &PollSchedule,
        probe: P,
    ) -> Result<()>
    where
        E: fmt::Display,
        P: FnMut() -> std::result::Result<bool, E>,
    {
        self.run_phase(Phase::Assert, &format!("{} (eventual)", description), || {
            self.poller.await_boolean_condition(description, schedule, probe)
        })
    }

    fn instrument<T, E, F, R>(
        &self,
        phase: Phase,
        description: &str,
        action: F,
        render: R,
    ) -> Result<T>
    where
        E: Into<BoxError>,
        F: FnOnce() -> std::result::Result<T, E>,
        R: FnOnce(&T) -> String,
    {
        let _span = info_span!("phase", test_id = %self.test_id, phase = phase.label()).entered();
        info!("[{}] {}", phase, description);

        let started_at = SystemTime::now();
        let started = Instant::now();
        let result: std::result::Result<T, BoxError> =
            match panic::catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(err.into()),
                Err(payload) => Err(Box::new(PanicError::from_payload(payload))),
            };
        let duration = started.elapsed();

        match result {
            Ok(value) => {
                let rendered = render(&value);
                info!(duration_ms = duration.as_millis() as u64, "[{}] {} succeeded", phase, description);
                self.attach(format!("{} Result", phase.label()), rendered.clone());
                self.record(phase, description, started_at, duration, PhaseOutcome::Success(rendered));
                Ok(value)
            }
            Err(cause) => {
                let message = cause.to_string();
                error!(duration_ms = duration.as_millis() as u64, "[{}] {} failed: {}", phase, description, message);
                self.attach(format!("{} Error", phase.label()), message.clone());
                self.record(phase, description, started_at, duration, PhaseOutcome::Failure(message));
                Err(E2eError::PhaseFailed {
                    phase,
                    description: description.to_string(),
                    source: cause,
                })
            }
        }
    }

    fn record(
        &self,
        phase: Phase,
        description: &str,
        started_at: SystemTime,
        duration: Duration,
        outcome: PhaseOutcome,
    ) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PhaseRecord {
                phase,
                description: description.to_string(),
                started_at,
                duration,
                outcome,
            });
    }
}
