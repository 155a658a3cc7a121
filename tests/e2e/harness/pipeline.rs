use anyhow::{bail, Result};
use e2e_core::{Clock, ManualClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// In-process stand-in for an API whose effects land in a separate store later.
///
/// `submit` plays the API call: it returns at once and the record becomes
/// readable from the store only after `latency` has passed on the clock.
/// The store can be made unreachable for a number of reads to imitate a
/// backend that is still coming up.
#[derive(Clone)]
pub struct SimulatedPipeline {
    clock: ManualClock,
    state: Arc<Mutex<PipelineState>>,
}

struct PipelineState {
    latency: Duration,
    records: HashMap<String, PendingRecord>,
    failing_reads: u32,
    reads: u32,
}

struct PendingRecord {
    value: String,
    visible_at: Instant,
}

impl SimulatedPipeline {
    /// Create a pipeline with the given propagation latency.
    pub fn new(clock: ManualClock, latency: Duration) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(PipelineState {
                latency,
                records: HashMap::new(),
                failing_reads: 0,
                reads: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Change the latency applied to later submissions.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// API call: accept a record that will reach the store after the latency.
    pub fn submit(&self, key: &str, value: &str) {
        let now = self.clock.now();
        let mut state = self.state();
        let visible_at = now + state.latency;
        state.records.insert(
            key.to_string(),
            PendingRecord {
                value: value.to_string(),
                visible_at,
            },
        );
    }

    /// Make the next `reads` store reads fail.
    pub fn fail_next_reads(&self, reads: u32) {
        self.state().failing_reads = reads;
    }

    /// Store read: the value once it has propagated, `None` before.
    pub fn lookup(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut state = self.state();
        state.reads += 1;
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            bail!("store unreachable");
        }
        Ok(state
            .records
            .get(key)
            .filter(|record| record.visible_at <= now)
            .map(|record| record.value.clone()))
    }

    /// Whether the key has been submitted, visible or not.
    pub fn accepted(&self, key: &str) -> bool {
        self.state().records.contains_key(key)
    }

    /// Number of store reads so far, failed ones included.
    pub fn reads(&self) -> u32 {
        self.state().reads
    }
}
