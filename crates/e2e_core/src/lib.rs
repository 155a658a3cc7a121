//! E2E Core Library
//!
//! Test-execution and condition-polling runtime for end-to-end suites that
//! exercise eventually-consistent pipelines:
//! - Per-worker execution context with process-wide unique ids
//! - Instrumented phases (arrange, act, assert, cleanup)
//! - Bounded condition polling with suppressed probe errors
//! - Test lifecycle with run-level and per-test identities
//!
//! # Quick Start
//!
//! ```
//! use e2e_core::{MemoryAttachments, Phase, PollSchedule, TestRun, Config};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let run = TestRun::new(Config::default(), Arc::new(MemoryAttachments::new()));
//! let case = run.start_test("registers a tenant");
//!
//! let id = case
//!     .execute_phase(Phase::Act, "register tenant", || Ok::<_, String>(7))
//!     .unwrap();
//!
//! let schedule = PollSchedule::new(Duration::from_millis(200))
//!     .with_interval(Duration::from_millis(10))
//!     .with_delay(Duration::ZERO);
//! let stored = case
//!     .await_condition("tenant stored", &schedule, || Ok::<_, String>(Some(id)))
//!     .unwrap();
//! assert_eq!(stored, 7);
//! case.finish();
//! ```
//!
//! # Execution context
//!
//! Scratch state is keyed by the calling worker, so helpers need no handle:
//!
//! ```
//! use e2e_core::context;
//!
//! let user = context::create_unique_user("alice");
//! assert!(user.starts_with("alice_"));
//! assert_eq!(context::current_user(), Some(user));
//!
//! context::cleanup();
//! assert_eq!(context::current_user(), None);
//! ```

mod attachments;
mod clock;
mod config;
pub mod context;
mod error;
mod lifecycle;
mod phase;
mod poller;

pub use attachments::{
    Attachment, AttachmentSink, JsonLinesAttachments, MemoryAttachments, NullAttachments,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, LoggingConfig, PollingConfig, RunConfig, CONFIG_ENV, DEFAULT_CONFIG_FILE};
pub use error::{BoxError, E2eError, PanicError, Result};
pub use lifecycle::{run_id, TestCase, TestRun};
pub use phase::{Phase, PhaseExecutor, PhaseOutcome, PhaseRecord};
pub use poller::{ConditionOutcome, ConditionPoller, ConditionRecord, PollSchedule};
