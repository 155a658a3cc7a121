//! Test lifecycle: identities, per-test setup and run-level teardown.
//!
//! A [`TestRun`] is shared by every test in the process. Each test obtains a
//! [`TestCase`] from it, which assigns a unique test identity under the
//! run's identity, seeds a per-test actor identity in the execution context
//! and logs completion when it is finished or dropped.

use crate::attachments::{AttachmentSink, JsonLinesAttachments, NullAttachments};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::context::{self, keys};
use crate::error::Result;
use crate::phase::PhaseExecutor;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

static RUN_ID: OnceLock<String> = OnceLock::new();
static GLOBAL_RUN: OnceLock<TestRun> = OnceLock::new();

/// Identity shared by every test in this process.
pub fn run_id() -> &'static str {
    RUN_ID.get_or_init(|| Uuid::new_v4().to_string())
}

/// Coordinates the tests of one process.
pub struct TestRun {
    config: Config,
    sink: Arc<dyn AttachmentSink>,
    clock: Arc<dyn Clock>,
    started: AtomicUsize,
    finished: AtomicUsize,
    completed: AtomicBool,
}

impl TestRun {
    pub fn new(config: Config, sink: Arc<dyn AttachmentSink>) -> Self {
        Self {
            config,
            sink,
            clock: Arc::new(SystemClock),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
        }
    }

    /// Build a run whose attachment sink follows `config.run.attachments_path`.
    pub fn from_config(config: Config) -> Result<Self> {
        let sink: Arc<dyn AttachmentSink> = match &config.run.attachments_path {
            Some(path) => Arc::new(JsonLinesAttachments::open(path)?),
            None => Arc::new(NullAttachments),
        };
        Ok(Self::new(config, sink))
    }

    /// Replace the clock used for eventual assertions and latency metrics.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The process-wide run, configured from the environment on first use.
    ///
    /// An unusable configuration falls back to defaults with a warning.
    pub fn global() -> &'static TestRun {
        GLOBAL_RUN.get_or_init(|| {
            let config = Config::from_env().unwrap_or_else(|e| {
                warn!("using default configuration: {}", e);
                Config::default()
            });
            Self::from_config(config.clone()).unwrap_or_else(|e| {
                warn!("attachments disabled: {}", e);
                Self::new(config, Arc::new(NullAttachments))
            })
        })
    }

    pub fn run_id(&self) -> &'static str {
        run_id()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tests started so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Tests finished so far.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Whether the after-all cleanup has run.
    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Before-each: assign identities and seed the execution context.
    pub fn start_test(&self, name: &str) -> TestCase<'_> {
        let suffix = Uuid::new_v4().simple().to_string();
        let test_id = format!("test-{}-{}", self.run_id(), &suffix[..8]);
        let correlation_id = format!("corr-{}", test_id);

        info!(test = name, test_id = %test_id, "starting test");

        let executor = PhaseExecutor::new(test_id.clone(), Arc::clone(&self.sink))
            .with_clock(Arc::clone(&self.clock));
        executor.attach("Test ID", test_id.clone());

        context::set_data(keys::TEST_ID, test_id.clone());
        context::set_data(keys::CORRELATION_ID, correlation_id.clone());
        let user = context::create_unique_user(&self.config.run.user_prefix);

        self.started.fetch_add(1, Ordering::SeqCst);

        TestCase {
            run: self,
            name: name.to_string(),
            test_id,
            correlation_id,
            user,
            executor,
            finished: false,
        }
    }

    /// After-all: clear the calling worker's context. Runs once; later calls return `false`.
    pub fn complete(&self) -> bool {
        if self.completed.swap(true, Ordering::SeqCst) {
            return false;
        }
        context::cleanup();
        info!(
            run_id = self.run_id(),
            started = self.started(),
            finished = self.finished(),
            "all tests completed, context cleaned up"
        );
        true
    }

    fn test_finished(&self) {
        let finished = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        if self.config.run.expected_tests == Some(finished) {
            self.complete();
        }
    }
}

/// One running test. Logs completion when finished or dropped.
///
/// Dereferences to its [`PhaseExecutor`], so phases read as `case.execute_phase(..)`.
pub struct TestCase<'a> {
    run: &'a TestRun,
    name: String,
    test_id: String,
    correlation_id: String,
    user: String,
    executor: PhaseExecutor,
    finished: bool,
}

impl<'a> TestCase<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Actor identity created for this test.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn run(&self) -> &'a TestRun {
        self.run
    }

    /// Hostname unique to this test.
    pub fn unique_hostname(&self) -> String {
        format!("host-{}", self.test_id)
    }

    /// Log and attach the latency of a pipeline operation started at `started`.
    ///
    /// Warns when the latency exceeds the configured pipeline budget.
    pub fn log_pipeline_latency(&self, operation: &str, started: Instant) -> Duration {
        let latency = self.run.clock.now().saturating_duration_since(started);
        let latency_ms = latency.as_millis() as u64;
        info!(test_id = %self.test_id, operation, latency_ms, "pipeline operation completed");
        self.executor.attach("Pipeline Latency", format!("{}ms", latency_ms));

        let budget = self.run.config.polling.pipeline_timeout();
        if latency > budget {
            warn!(
                test_id = %self.test_id,
                operation,
                latency_ms,
                budget_ms = budget.as_millis() as u64,
                "pipeline operation exceeded budget"
            );
        }
        latency
    }

    /// After-each: log completion. The execution context is left intact.
    pub fn finish(mut self) {
        self.complete_once();
    }

    fn complete_once(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if std::thread::panicking() {
            warn!(test = %self.name, test_id = %self.test_id, "test aborted");
        } else {
            info!(test = %self.name, test_id = %self.test_id, "completed test");
        }
        self.run.test_finished();
    }
}

impl Deref for TestCase<'_> {
    type Target = PhaseExecutor;

    fn deref(&self) -> &PhaseExecutor {
        &self.executor
    }
}

impl Drop for TestCase<'_> {
    fn drop(&mut self) {
        self.complete_once();
    }
}
