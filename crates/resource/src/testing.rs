//! Testing utilities for pools and lifecycle coordination
//!
//! [`MockFactory`] hands out numbered [`MockConnection`]s and records every
//! call the pool makes into it; failures can be injected per call.
//! [`RecordingComponent`] writes its lifecycle calls into a shared
//! [`EventLog`] so ordering can be asserted.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::lifecycle::Component;

/// Handle produced by [`MockFactory`].
#[derive(Debug)]
pub struct MockConnection {
    /// 1-based creation order within the factory.
    pub serial: u64,
    quiesced: AtomicBool,
}

impl MockConnection {
    /// Whether the pool quiesced this connection.
    #[must_use]
    pub fn is_quiesced(&self) -> bool {
        self.quiesced.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_serial: AtomicU64,
    created: AtomicUsize,
    quiesce_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    destroyed: Mutex<Vec<u64>>,
    fail_next_create: AtomicBool,
    creates_before_failure: Mutex<Option<usize>>,
    fail_destroy: Mutex<HashSet<u64>>,
    fail_resets: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
    destroy_delay: Mutex<Option<Duration>>,
}

/// Factory that records calls and fails on demand.
///
/// Clones share their counters, so a test can keep one clone while the pool
/// owns another.
#[derive(Debug, Clone)]
pub struct MockFactory {
    id: String,
    state: Arc<MockState>,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFactory {
    /// A factory with id `"mock"`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id("mock")
    }

    /// A factory with a custom id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(MockState::default()),
        }
    }

    /// Make every `create` sleep first.
    #[must_use]
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *self.state.create_delay.lock() = Some(delay);
        self
    }

    /// Make every `destroy` sleep before it takes effect.
    #[must_use]
    pub fn with_destroy_delay(self, delay: Duration) -> Self {
        *self.state.destroy_delay.lock() = Some(delay);
        self
    }

    /// Fail the next `create` call only.
    pub fn fail_next_create(&self) {
        self.state.fail_next_create.store(true, Ordering::Release);
    }

    /// Let `n` more creates succeed, then fail all following ones.
    pub fn fail_creates_after(&self, n: usize) {
        *self.state.creates_before_failure.lock() = Some(n);
    }

    /// Make `destroy` fail for the connection with this serial.
    pub fn fail_destroy_of(&self, serial: u64) {
        self.state.fail_destroy.lock().insert(serial);
    }

    /// Toggle failure of the reset hook.
    pub fn fail_resets(&self, fail: bool) {
        self.state.fail_resets.store(fail, Ordering::Release);
    }

    /// Drop every injected failure.
    pub fn clear_failures(&self) {
        self.state.fail_next_create.store(false, Ordering::Release);
        *self.state.creates_before_failure.lock() = None;
        self.state.fail_destroy.lock().clear();
        self.state.fail_resets.store(false, Ordering::Release);
    }

    /// Number of successful `create` calls.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.state.created.load(Ordering::Acquire)
    }

    /// Number of `destroy` calls, failed ones included.
    #[must_use]
    pub fn destroy_calls(&self) -> usize {
        self.state.destroyed.lock().len()
    }

    /// Serials passed to `destroy`, in ascending order.
    #[must_use]
    pub fn destroyed_serials(&self) -> Vec<u64> {
        let mut serials = self.state.destroyed.lock().clone();
        serials.sort_unstable();
        serials
    }

    /// Connections created and not yet destroyed.
    #[must_use]
    pub fn live(&self) -> usize {
        self.created_count().saturating_sub(self.destroy_calls())
    }

    /// Number of `quiesce` calls.
    #[must_use]
    pub fn quiesce_calls(&self) -> usize {
        self.state.quiesce_calls.load(Ordering::Acquire)
    }

    /// Number of `reset` calls.
    #[must_use]
    pub fn reset_calls(&self) -> usize {
        self.state.reset_calls.load(Ordering::Acquire)
    }

    fn should_fail_create(&self) -> bool {
        if self.state.fail_next_create.swap(false, Ordering::AcqRel) {
            return true;
        }
        let mut budget = self.state.creates_before_failure.lock();
        match budget.as_mut() {
            Some(0) => true,
            Some(left) => {
                *left -= 1;
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl Factory for MockFactory {
    type Handle = MockConnection;

    fn id(&self) -> &str {
        &self.id
    }

    async fn create(&self) -> Result<MockConnection> {
        let delay = *self.state.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail_create() {
            return Err(Error::create(&self.id, "injected create failure"));
        }
        self.state.created.fetch_add(1, Ordering::AcqRel);
        Ok(MockConnection {
            serial: self.state.next_serial.fetch_add(1, Ordering::AcqRel) + 1,
            quiesced: AtomicBool::new(false),
        })
    }

    async fn quiesce(&self, handle: &MockConnection) {
        handle.quiesced.store(true, Ordering::Release);
        self.state.quiesce_calls.fetch_add(1, Ordering::AcqRel);
    }

    async fn reset(&self, _handle: &MockConnection) -> Result<()> {
        self.state.reset_calls.fetch_add(1, Ordering::AcqRel);
        if self.state.fail_resets.load(Ordering::Acquire) {
            return Err(Error::destroy(&self.id, "injected reset failure"));
        }
        Ok(())
    }

    async fn destroy(&self, handle: &MockConnection) -> Result<()> {
        let delay = *self.state.destroy_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.destroyed.lock().push(handle.serial);
        if self.state.fail_destroy.lock().contains(&handle.serial) {
            return Err(Error::destroy(&self.id, "injected destroy failure"));
        }
        Ok(())
    }
}

/// Shared, ordered record of lifecycle calls.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    /// Append an event.
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    /// Snapshot of all events so far.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Component that logs `start:<name>`, `quiesce:<name>` and `stop:<name>`.
#[derive(Debug)]
pub struct RecordingComponent {
    name: String,
    priority: i32,
    fail_start: bool,
    log: EventLog,
}

impl RecordingComponent {
    /// A component with priority 1 writing into `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &EventLog) -> Self {
        Self {
            name: name.into(),
            priority: 1,
            fail_start: false,
            log: log.clone(),
        }
    }

    /// Builder-style priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Make `start` fail after logging the attempt.
    #[must_use]
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

#[async_trait]
impl Component for RecordingComponent {
    fn priority(&self) -> i32 {
        self.priority
    }

    async fn start(&self) -> Result<()> {
        self.log.push(format!("start:{}", self.name));
        if self.fail_start {
            return Err(Error::configuration(format!("{} refused to start", self.name)));
        }
        Ok(())
    }

    async fn quiesce(&self) {
        self.log.push(format!("quiesce:{}", self.name));
    }

    async fn stop(&self) {
        self.log.push(format!("stop:{}", self.name));
    }
}
