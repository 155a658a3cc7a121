//! Condition polling for eventually-consistent pipelines.
//!
//! A probe is called on a fixed schedule until it yields a value or the
//! timeout elapses:
//!
//! ```text
//! WaitingDelay --delay--> Polling --value--> Succeeded
//!                          |  ^
//!       absent / error     |  |  sleep(interval)
//!                          +--+
//!                          |
//!                          +--deadline--> TimedOut
//! ```
//!
//! Probe errors (and panics) never abort the wait; they are logged at debug
//! level and the last one is kept for the timeout diagnostic.

use crate::clock::{Clock, SystemClock};
use crate::error::{E2eError, PanicError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Timing of one condition wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSchedule {
    /// Upper bound on the whole wait, measured from the call.
    pub timeout: Duration,
    /// Pause between unsuccessful probe invocations.
    pub poll_interval: Duration,
    /// Pause before the first probe invocation.
    pub poll_delay: Duration,
}

impl PollSchedule {
    /// Default pause between probe invocations.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
    /// Default pause before the first probe invocation.
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

    /// Schedule with the default interval and delay.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Self::DEFAULT_INTERVAL,
            poll_delay: Self::DEFAULT_DELAY,
        }
    }

    /// Override the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the poll delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }
}

/// How a condition wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOutcome {
    Succeeded,
    TimedOut,
}

/// Diagnostic summary of one condition wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRecord {
    pub description: String,
    pub schedule: PollSchedule,
    /// Number of probe invocations made.
    pub attempts: u32,
    /// Time from the call to the end of the wait.
    pub elapsed: Duration,
    /// Last suppressed probe error, if any.
    pub last_error: Option<String>,
    pub outcome: ConditionOutcome,
}

impl ConditionRecord {
    /// Converts a timed-out record into the error surfaced to callers.
    pub fn into_timeout_error(self) -> E2eError {
        E2eError::ConditionTimeout {
            description: self.description,
            timeout: self.schedule.timeout,
            attempts: self.attempts,
            last_error: self.last_error,
        }
    }
}

enum PollState<T> {
    WaitingDelay,
    Polling,
    Succeeded(T),
    TimedOut,
}

/// Sequential, bounded condition poller.
///
/// One probe is in flight at a time and the calling worker blocks for at
/// most the schedule's timeout. A sleeping poll cannot be interrupted.
#[derive(Clone)]
pub struct ConditionPoller {
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ConditionPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionPoller").finish_non_exhaustive()
    }
}

impl Default for ConditionPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionPoller {
    /// Poller driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Poller driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Wait until `probe` returns `Ok(Some(value))` and return that value.
    ///
    /// `Ok(None)`, `Err(_)` and panics from the probe all mean "not yet".
    /// Fails with [`E2eError::ConditionTimeout`] once the timeout elapses.
    pub fn await_condition<T, E, P>(
        &self,
        description: &str,
        schedule: &PollSchedule,
        probe: P,
    ) -> Result<T>
    where
        E: fmt::Display,
        P: FnMut() -> std::result::Result<Option<T>, E>,
    {
        match self.poll(description, schedule, probe) {
            (_, Some(value)) => Ok(value),
            (record, None) => Err(record.into_timeout_error()),
        }
    }

    /// Boolean variant: `Ok(true)` is success, `Ok(false)` and errors mean "not yet".
    pub fn await_boolean_condition<E, P>(
        &self,
        description: &str,
        schedule: &PollSchedule,
        mut probe: P,
    ) -> Result<()>
    where
        E: fmt::Display,
        P: FnMut() -> std::result::Result<bool, E>,
    {
        self.await_condition(description, schedule, || {
            probe().map(|satisfied| satisfied.then_some(()))
        })
    }

    /// Run the polling state machine and return its record with the value, if any.
    ///
    /// The probe is invoked at least once, even when the delay already
    /// consumed the whole timeout.
    pub fn poll<T, E, P>(
        &self,
        description: &str,
        schedule: &PollSchedule,
        mut probe: P,
    ) -> (ConditionRecord, Option<T>)
    where
        E: fmt::Display,
        P: FnMut() -> std::result::Result<Option<T>, E>,
    {
        let start = self.clock.now();
        // a timeout past the clock's range means no deadline
        let deadline = start.checked_add(schedule.timeout);
        let mut attempts: u32 = 0;
        let mut last_error: Option<String> = None;

        debug!(
            condition = description,
            timeout_ms = schedule.timeout.as_millis() as u64,
            "awaiting condition"
        );

        let mut state = PollState::WaitingDelay;
        let value = loop {
            state = match state {
                PollState::WaitingDelay => {
                    self.sleep_bounded(schedule.poll_delay, deadline);
                    PollState::Polling
                }
                PollState::Polling => {
                    if attempts > 0 && deadline.is_some_and(|d| self.clock.now() >= d) {
                        PollState::TimedOut
                    } else {
                        attempts += 1;
                        match invoke(&mut probe) {
                            Ok(Some(value)) => PollState::Succeeded(value),
                            Ok(None) => {
                                debug!(condition = description, attempt = attempts, "not yet satisfied");
                                self.sleep_bounded(schedule.poll_interval, deadline);
                                PollState::Polling
                            }
                            Err(err) => {
                                debug!(condition = description, attempt = attempts, "probe error suppressed: {}", err);
                                last_error = Some(err);
                                self.sleep_bounded(schedule.poll_interval, deadline);
                                PollState::Polling
                            }
                        }
                    }
                }
                PollState::Succeeded(value) => break Some(value),
                PollState::TimedOut => break None,
            };
        };

        let elapsed = self.clock.now().saturating_duration_since(start);
        let outcome = if value.is_some() {
            debug!(condition = description, attempts, elapsed_ms = elapsed.as_millis() as u64, "condition satisfied");
            ConditionOutcome::Succeeded
        } else {
            warn!(
                condition = description,
                attempts,
                timeout_ms = schedule.timeout.as_millis() as u64,
                last_error = last_error.as_deref().unwrap_or("none"),
                "condition timed out"
            );
            ConditionOutcome::TimedOut
        };

        let record = ConditionRecord {
            description: description.to_string(),
            schedule: *schedule,
            attempts,
            elapsed,
            last_error,
            outcome,
        };
        (record, value)
    }

    fn sleep_bounded(&self, duration: Duration, deadline: Option<Instant>) {
        let pause = match deadline {
            Some(deadline) => duration.min(deadline.saturating_duration_since(self.clock.now())),
            None => duration,
        };
        if !pause.is_zero() {
            self.clock.sleep(pause);
        }
    }
}

fn invoke<T, E, P>(probe: &mut P) -> std::result::Result<Option<T>, String>
where
    E: fmt::Display,
    P: FnMut() -> std::result::Result<Option<T>, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| probe())) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(PanicError::from_payload(payload).to_string()),
    }
}
