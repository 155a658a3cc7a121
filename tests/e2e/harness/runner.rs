use super::assertions::Assertion;
use super::pipeline::SimulatedPipeline;
use super::steps::ScenarioStep;
use anyhow::{anyhow, Context, Result};
use e2e_core::{
    context, Clock, Config, MemoryAttachments, Phase, PollSchedule, TestCase, TestRun,
};
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

/// Executes scenarios against a simulated pipeline on virtual time
pub struct ScenarioRunner {
    run: TestRun,
    pipeline: SimulatedPipeline,
    attachments: MemoryAttachments,
    interval: Duration,
    delay: Duration,
    current_step: Cell<usize>,
}

impl ScenarioRunner {
    /// Create a runner whose pipeline propagates writes after `latency`
    pub fn new(latency: Duration, interval: Duration, delay: Duration) -> Self {
        let pipeline = SimulatedPipeline::new(Default::default(), latency);
        let attachments = MemoryAttachments::new();
        let run = TestRun::new(Config::default(), Arc::new(attachments.clone()))
            .with_clock(Arc::new(pipeline.clock().clone()));

        Self {
            run,
            pipeline,
            attachments,
            interval,
            delay,
            current_step: Cell::new(0),
        }
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step.get()
    }

    pub fn pipeline(&self) -> &SimulatedPipeline {
        &self.pipeline
    }

    pub fn attachments(&self) -> &MemoryAttachments {
        &self.attachments
    }

    /// Execute all steps in sequence as one test
    pub fn execute(&self, name: &str, steps: &[ScenarioStep]) -> Result<()> {
        let case = self.run.start_test(name);
        for (i, step) in steps.iter().enumerate() {
            self.current_step.set(i);
            self.execute_step(&case, step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        case.finish();
        Ok(())
    }

    fn schedule(&self, timeout: Duration) -> PollSchedule {
        PollSchedule::new(timeout)
            .with_interval(self.interval)
            .with_delay(self.delay)
    }

    /// Execute a single step
    fn execute_step(&self, case: &TestCase<'_>, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::SetLatency { latency } => case.run_phase(
                Phase::Arrange,
                &format!("pipeline latency {:?}", latency),
                || {
                    self.pipeline.set_latency(*latency);
                    Ok::<_, anyhow::Error>(())
                },
            )?,
            ScenarioStep::StoreOutage { reads } => case.run_phase(
                Phase::Arrange,
                &format!("store unreachable for {} reads", reads),
                || {
                    self.pipeline.fail_next_reads(*reads);
                    Ok::<_, anyhow::Error>(())
                },
            )?,
            ScenarioStep::SetContext { key, value } => {
                case.run_phase(Phase::Arrange, &format!("context {} = {}", key, value), || {
                    context::set_data(key.clone(), value.clone());
                    Ok::<_, anyhow::Error>(())
                })?
            }
            ScenarioStep::RememberUser { key } => {
                let user = case.user().to_string();
                case.run_phase(Phase::Arrange, &format!("remember user as {}", key), || {
                    context::set_data(key.clone(), user);
                    Ok::<_, anyhow::Error>(())
                })?
            }

            ScenarioStep::Submit { key, value } => {
                case.run_phase(Phase::Act, &format!("submit {}", key), || {
                    self.pipeline.submit(key, value);
                    Ok::<_, anyhow::Error>(())
                })?
            }

            ScenarioStep::Wait { duration } => self.pipeline.clock().advance(*duration),

            ScenarioStep::AwaitVisible {
                key,
                expected,
                timeout,
            } => self.handle_await_visible(case, key, expected.as_deref(), *timeout)?,
            ScenarioStep::ExpectTimeout { key, timeout } => {
                self.handle_expect_timeout(case, key, *timeout)?
            }

            ScenarioStep::Assert { assertion } => {
                case.assert_immediate(&format!("{:?}", assertion), || {
                    self.handle_assertion(case, assertion)
                })?
            }
        }
        Ok(())
    }

    // ===== Eventual assertions =====

    fn handle_await_visible(
        &self,
        case: &TestCase<'_>,
        key: &str,
        expected: Option<&str>,
        timeout: Duration,
    ) -> Result<()> {
        let started = self.pipeline.clock().now();
        let value = case.await_condition(
            &format!("{} reaches the store", key),
            &self.schedule(timeout),
            || self.pipeline.lookup(key),
        )?;
        case.log_pipeline_latency(&format!("propagate {}", key), started);

        if let Some(expected) = expected {
            if value != expected {
                return Err(anyhow!(
                    "{} propagated as {:?}, expected {:?}",
                    key,
                    value,
                    expected
                ));
            }
        }
        Ok(())
    }

    fn handle_expect_timeout(&self, case: &TestCase<'_>, key: &str, timeout: Duration) -> Result<()> {
        let description = format!("{} reaches the store", key);
        match case.await_condition(&description, &self.schedule(timeout), || {
            self.pipeline.lookup(key)
        }) {
            Ok(value) => Err(anyhow!("expected timeout, but {} became {:?}", key, value)),
            Err(err) if err.is_timeout() => {
                if !err.to_string().contains(&description) {
                    return Err(anyhow!("timeout does not name the condition: {}", err));
                }
                Ok(())
            }
            Err(err) => Err(anyhow!("expected timeout, got: {}", err)),
        }
    }

    // ===== Immediate assertions =====

    fn handle_assertion(&self, case: &TestCase<'_>, assertion: &Assertion) -> Result<()> {
        match assertion {
            Assertion::Visible { key } => {
                if self.pipeline.lookup(key)?.is_none() {
                    return Err(anyhow!("{} is not visible in the store", key));
                }
            }
            Assertion::NotVisible { key } => {
                if let Some(value) = self.pipeline.lookup(key)? {
                    return Err(anyhow!("{} is already visible as {:?}", key, value));
                }
            }
            Assertion::ValueEquals { key, value } => {
                let actual = self.pipeline.lookup(key)?;
                if actual.as_deref() != Some(value.as_str()) {
                    return Err(anyhow!("{}: expected {:?}, found {:?}", key, value, actual));
                }
            }
            Assertion::ReadsAtLeast(min) => {
                let reads = self.pipeline.reads();
                if reads < *min {
                    return Err(anyhow!("expected at least {} store reads, got {}", min, reads));
                }
            }
            Assertion::Accepted { key } => {
                if !self.pipeline.accepted(key) {
                    return Err(anyhow!("{} was never accepted by the API", key));
                }
            }
            Assertion::ContextEquals { key, value } => {
                let actual = context::get_data::<String>(key);
                if actual.as_deref() != Some(value.as_str()) {
                    return Err(anyhow!("context {}: expected {:?}, found {:?}", key, value, actual));
                }
            }
            Assertion::ContextHoldsUser { key } => {
                let actual = context::get_data::<String>(key);
                if actual.as_deref() != Some(case.user()) {
                    return Err(anyhow!("context {}: expected {:?}, found {:?}", key, case.user(), actual));
                }
            }
            Assertion::CurrentUserStartsWith(prefix) => {
                let user = context::current_user().ok_or_else(|| anyhow!("no current user"))?;
                if !user.starts_with(prefix.as_str()) || user != case.user() {
                    return Err(anyhow!("unexpected current user {:?}", user));
                }
            }
            Assertion::PhaseCount(n) => {
                let count = case.records().len();
                if count != *n {
                    return Err(anyhow!("expected {} recorded phases, got {}", n, count));
                }
            }
            Assertion::Custom(check) => check(&self.pipeline)?,
        }
        Ok(())
    }
}
