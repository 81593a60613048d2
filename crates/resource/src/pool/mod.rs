//! Resource pool — bounded, lazily growing pool over a [`Factory`].
//!
//! `Pool<F>` calls `F::create`, `F::quiesce`, `F::reset` and `F::destroy`
//! directly. All bookkeeping lives in one mutex-guarded [`State`] that is
//! never held across an `.await`; suspended acquirers wait in a FIFO queue and
//! are handed released handles directly.

pub mod config;
mod lease;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::Instrument;

use crate::error::{DestroyFailure, Error, Result};
use crate::factory::Factory;

pub use config::PoolConfig;
pub use lease::Lease;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Identifier assigned to every handle a pool creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A created handle plus the pool's bookkeeping for it.
pub(crate) struct Slot<H> {
    pub(crate) id: HandleId,
    pub(crate) handle: H,
    pub(crate) created_at: DateTime<Utc>,
    leased: watch::Sender<bool>,
    destroyed: AtomicBool,
}

impl<H> Slot<H> {
    fn new(id: HandleId, handle: H) -> Self {
        let (leased, _) = watch::channel(false);
        Self {
            id,
            handle,
            created_at: Utc::now(),
            leased,
            destroyed: AtomicBool::new(false),
        }
    }

    fn set_leased(&self, leased: bool) {
        self.leased.send_replace(leased);
    }

    /// Resolves once the handle is back from its current lease.
    async fn returned(&self) {
        let mut rx = self.leased.subscribe();
        let _ = rx.wait_for(|leased| !*leased).await;
    }

    /// Returns `true` for the first caller only.
    fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, Ordering::AcqRel)
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Pool state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Running,
    Draining,
    Drained,
    Closed,
}

impl Phase {
    fn is_shutting_down(self) -> bool {
        matches!(self, Self::Draining | Self::Drained | Self::Closed)
    }
}

/// What a suspended acquirer is woken with.
enum Grant<F: Factory> {
    /// A released handle, already leased to the waiter.
    Lease(Lease<F>),
    /// A freed slot, still counted in `created`, for the waiter to fill.
    Vacancy(Vacancy<F>),
}

/// Ownership of a freed slot in transit to a waiter.
///
/// Dropped unclaimed (the waiter gave up), it is passed on to the next one.
struct Vacancy<F: Factory> {
    pool: Pool<F>,
    armed: bool,
}

impl<F: Factory> Vacancy<F> {
    fn claim(mut self) {
        self.armed = false;
    }
}

impl<F: Factory> Drop for Vacancy<F> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.vacate();
        }
    }
}

struct State<F: Factory> {
    phase: Phase,
    created: usize,
    registry: HashMap<HandleId, Arc<Slot<F::Handle>>>,
    idle: VecDeque<Arc<Slot<F::Handle>>>,
    leased: HashSet<HandleId>,
    waiters: VecDeque<oneshot::Sender<Grant<F>>>,
}

impl<F: Factory> State<F> {
    fn new(max_size: usize) -> Self {
        Self {
            phase: Phase::Uninitialized,
            created: 0,
            registry: HashMap::with_capacity(max_size),
            idle: VecDeque::with_capacity(max_size),
            leased: HashSet::with_capacity(max_size),
            waiters: VecDeque::new(),
        }
    }

    fn ensure_open(&self, resource_id: &str) -> Result<()> {
        match self.phase {
            Phase::Running => Ok(()),
            Phase::Uninitialized => Err(Error::not_initialized(resource_id)),
            Phase::Draining | Phase::Drained | Phase::Closed => Err(Error::closed(resource_id)),
        }
    }

    /// Pops the oldest waiter that is still listening.
    fn next_waiter(&mut self) -> Option<oneshot::Sender<Grant<F>>> {
        while let Some(tx) = self.waiters.pop_front() {
            if !tx.is_closed() {
                return Some(tx);
            }
        }
        None
    }

    fn reset(&mut self) {
        self.created = 0;
        self.registry.clear();
        self.idle.clear();
        self.leased.clear();
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles currently counted against `max_size` (including reservations).
    pub created: usize,
    /// Handles waiting in the idle queue.
    pub idle: usize,
    /// Handles currently leased to callers.
    pub leased: usize,
    /// Callers suspended in `acquire`.
    pub waiters: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Total successful acquisitions.
    pub total_acquisitions: u64,
    /// Total leases returned to the pool.
    pub total_releases: u64,
    /// Total destroy calls issued to the factory.
    pub destroyed: u64,
    /// `init` completed and the pool has not been closed since.
    pub initialized: bool,
    /// Quiesce has started.
    pub draining: bool,
    /// Close has started.
    pub closed: bool,
}

struct PoolInner<F: Factory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<State<F>>,
    /// Serializes `init`, `quiesce` and `close`.
    transition: Arc<tokio::sync::Mutex<()>>,
    /// Factory `create` calls in flight from `grow`.
    creating: watch::Sender<usize>,
    next_id: AtomicU64,
    acquisitions: AtomicU64,
    releases: AtomicU64,
    destroyed: AtomicU64,
}

impl<F: Factory> PoolInner<F> {
    fn next_id(&self) -> HandleId {
        HandleId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn destroy_slot(&self, slot: &Slot<F::Handle>) -> Result<()> {
        if !slot.mark_destroyed() {
            return Ok(());
        }
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        self.factory.destroy(&slot.handle).await
    }

    async fn creations_settled(&self) {
        let mut rx = self.creating.subscribe();
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }
}

/// One factory `create` in flight, counted until it resolves or is dropped.
struct Creating<'a>(&'a watch::Sender<usize>);

impl<'a> Creating<'a> {
    fn enter(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|pending| *pending += 1);
        Self(counter)
    }
}

impl Drop for Creating<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|pending| *pending = pending.saturating_sub(1));
    }
}

/// Capacity counted in `created` for a handle that does not exist yet.
///
/// Dropping it unconsumed (factory failure, cancelled acquire) gives the
/// slot back.
struct Reservation<'a, F: Factory> {
    pool: &'a Pool<F>,
    armed: bool,
}

impl<'a, F: Factory> Reservation<'a, F> {
    fn new(pool: &'a Pool<F>) -> Self {
        Self { pool, armed: true }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl<F: Factory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.vacate();
        }
    }
}

enum Step<F: Factory> {
    Ready(Arc<Slot<F::Handle>>),
    Grow,
    Wait(oneshot::Receiver<Grant<F>>),
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Pool<F>
// ---------------------------------------------------------------------------

/// Generic resource pool.
///
/// Manages a bounded set of `F::Handle` objects, creating them lazily up to
/// `max_size` and tearing them down in two phases on shutdown. Cloning is
/// cheap and every clone refers to the same pool.
pub struct Pool<F: Factory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: Factory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Factory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("resource_id", &self.inner.factory.id())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: Factory> Pool<F> {
    /// Create a new, uninitialized pool.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `config` is invalid.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let max = config.max_size;
        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                config,
                state: Mutex::new(State::new(max)),
                transition: Arc::new(tokio::sync::Mutex::new(())),
                creating: watch::Sender::new(0),
                next_id: AtomicU64::new(0),
                acquisitions: AtomicU64::new(0),
                releases: AtomicU64::new(0),
                destroyed: AtomicU64::new(0),
            }),
        })
    }

    /// The factory's identifier.
    pub fn id(&self) -> &str {
        self.inner.factory.id()
    }

    /// The pool's configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The backend factory.
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Run a lifecycle transition to completion on its own task.
    ///
    /// The task owns the transition lock, so dropping the caller's future
    /// neither abandons the work half way nor lets another transition start
    /// before it has finished.
    async fn exclusive<T: Send + 'static>(
        &self,
        work: impl Future<Output = Result<T>> + Send + 'static,
    ) -> Result<T> {
        let guard = Arc::clone(&self.inner.transition).lock_owned().await;
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                work.await
            }
            .in_current_span(),
        );
        match task.await {
            Ok(result) => result,
            Err(err) => match err.try_into_panic() {
                Ok(panic) => std::panic::resume_unwind(panic),
                Err(_) => Err(Error::Cancelled {
                    resource_id: self.id().to_string(),
                }),
            },
        }
    }

    /// Eagerly create `min_size` handles.
    ///
    /// A no-op on an initialized pool. If the factory fails part way, every
    /// handle created by this call is destroyed again before the error is
    /// returned, and the pool stays uninitialized. Dropping the returned
    /// future does not stop initialization; it completes in the background.
    pub async fn init(&self) -> Result<()> {
        let pool = self.clone();
        self.exclusive(async move { pool.init_locked().await }).await
    }

    async fn init_locked(&self) -> Result<()> {
        let inner = &self.inner;
        let phase = inner.state.lock().phase;
        match phase {
            Phase::Uninitialized => {}
            Phase::Closed => return Err(Error::closed(self.id())),
            Phase::Running | Phase::Draining | Phase::Drained => return Ok(()),
        }

        let wanted = inner.config.min_size;
        let mut slots: Vec<Arc<Slot<F::Handle>>> = Vec::with_capacity(wanted);
        let mut reservations = Vec::with_capacity(wanted);

        for _ in 0..wanted {
            inner.state.lock().created += 1;
            let reservation = Reservation::new(self);
            match inner.factory.create().await {
                Ok(handle) => {
                    slots.push(Arc::new(Slot::new(inner.next_id(), handle)));
                    reservations.push(reservation);
                }
                Err(err) => {
                    drop(reservation);
                    tracing::warn!(
                        resource_id = self.id(),
                        created = slots.len(),
                        wanted,
                        error = %err,
                        "Pool initialization failed, rolling back"
                    );
                    for slot in &slots {
                        if let Err(destroy_err) = inner.destroy_slot(slot).await {
                            tracing::warn!(
                                resource_id = self.id(),
                                handle = %slot.id,
                                error = %destroy_err,
                                "Failed to destroy handle during init rollback"
                            );
                        }
                    }
                    drop(reservations);
                    return Err(Error::initialization(self.id(), err));
                }
            }
        }

        {
            let mut state = inner.state.lock();
            for slot in slots {
                state.registry.insert(slot.id, Arc::clone(&slot));
                state.idle.push_back(slot);
            }
            state.phase = Phase::Running;
        }
        reservations.into_iter().for_each(Reservation::commit);

        tracing::info!(
            resource_id = self.id(),
            min_size = wanted,
            max_size = inner.config.max_size,
            "Pool initialized"
        );
        Ok(())
    }

    /// Acquire a handle.
    ///
    /// `timeout` overrides [`PoolConfig::acquire_timeout`]; with neither set
    /// the call waits until a handle is released. On expiry no handle or slot
    /// is consumed.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<Lease<F>> {
        let result = match timeout.or(self.inner.config.acquire_timeout) {
            Some(limit) => match tokio::time::timeout(limit, self.checkout()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(
                        resource_id = self.id(),
                        timeout_ms = millis(limit),
                        "Acquire timed out"
                    );
                    Err(Error::timeout(self.id(), limit, "acquire"))
                }
            },
            None => self.checkout().await,
        };

        if result.is_ok() {
            self.inner.acquisitions.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn checkout(&self) -> Result<Lease<F>> {
        let inner = &self.inner;
        loop {
            let step = {
                let mut state = inner.state.lock();
                state.ensure_open(self.id())?;
                if let Some(slot) = state.idle.pop_front() {
                    state.leased.insert(slot.id);
                    slot.set_leased(true);
                    Step::Ready(slot)
                } else if state.created < inner.config.max_size {
                    state.created += 1;
                    Step::Grow
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Step::Wait(rx)
                }
            };

            match step {
                Step::Ready(slot) => return Ok(Lease::new(self.clone(), slot)),
                Step::Grow => return self.grow(Reservation::new(self)).await,
                Step::Wait(rx) => match rx.await {
                    Ok(Grant::Lease(lease)) => return Ok(lease),
                    Ok(Grant::Vacancy(vacancy)) => {
                        vacancy.claim();
                        return self.grow(Reservation::new(self)).await;
                    }
                    Err(_) => return Err(Error::closed(self.id())),
                },
            }
        }
    }

    /// Create a handle for an already reserved slot.
    async fn grow(&self, reservation: Reservation<'_, F>) -> Result<Lease<F>> {
        let inner = &self.inner;
        let _creating = Creating::enter(&inner.creating);
        inner.state.lock().ensure_open(self.id())?;
        let handle = inner.factory.create().await.inspect_err(|err| {
            tracing::warn!(
                resource_id = self.id(),
                error = %err,
                "Failed to grow pool"
            );
        })?;

        let slot = Arc::new(Slot::new(inner.next_id(), handle));
        slot.set_leased(true);

        let admitted = {
            let mut state = inner.state.lock();
            if state.phase == Phase::Running {
                state.registry.insert(slot.id, Arc::clone(&slot));
                state.leased.insert(slot.id);
                true
            } else {
                false
            }
        };

        if !admitted {
            // Shutdown began while the factory was connecting.
            drop(reservation);
            slot.set_leased(false);
            if let Err(err) = inner.destroy_slot(&slot).await {
                tracing::warn!(
                    resource_id = self.id(),
                    handle = %slot.id,
                    error = %err,
                    "Failed to destroy handle created during shutdown"
                );
            }
            return Err(Error::closed(self.id()));
        }

        reservation.commit();
        tracing::debug!(resource_id = self.id(), handle = %slot.id, "Pool grew");
        Ok(Lease::new(self.clone(), slot))
    }

    /// Return a lease, running the factory's reset hook first.
    ///
    /// Never fails: misuse (a lease from another pool, a handle that is not
    /// checked out) is logged and rejected, and releasing into a pool that is
    /// shutting down is a logged no-op.
    pub async fn release(&self, lease: Lease<F>) {
        if !lease.belongs_to(self) {
            tracing::warn!(
                resource_id = self.id(),
                handle = %lease.id(),
                "Rejected release of a lease from a different pool"
            );
            return;
        }

        let shutting_down = self.inner.state.lock().phase.is_shutting_down();
        if shutting_down {
            drop(lease);
            return;
        }

        if let Err(err) = self.inner.factory.reset(&lease).await {
            tracing::warn!(
                resource_id = self.id(),
                handle = %lease.id(),
                error = %err,
                "Reset failed, retiring handle"
            );
            self.retire(lease.into_slot()).await;
            return;
        }

        drop(lease);
    }

    /// Acquire a handle, run `f` with it, and release it.
    ///
    /// The handle goes back to the pool on every exit path; if the returned
    /// future is dropped mid-way the lease returns itself.
    pub async fn with_resource<T>(
        &self,
        timeout: Option<Duration>,
        f: impl AsyncFnOnce(&F::Handle) -> T,
    ) -> Result<T> {
        let lease = self.acquire(timeout).await?;
        let output = f(&*lease).await;
        self.release(lease).await;
        Ok(output)
    }

    /// Phase 1 of shutdown: stop admitting leases and wait in-flight work out.
    ///
    /// New acquires fail with [`Error::Closed`] from here on and suspended
    /// acquirers are woken with the same error. Every handle is quiesced
    /// concurrently; each one is then given up to
    /// [`PoolConfig::drain_timeout`] to come back from its lease. Dropping
    /// the returned future does not interrupt the drain.
    pub async fn quiesce(&self) -> Result<()> {
        let pool = self.clone();
        self.exclusive(async move { pool.quiesce_locked().await }).await
    }

    async fn quiesce_locked(&self) -> Result<()> {
        let phase = self.inner.state.lock().phase;
        match phase {
            Phase::Uninitialized => return Err(Error::not_initialized(self.id())),
            Phase::Drained | Phase::Closed => return Ok(()),
            Phase::Running | Phase::Draining => {}
        }
        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        let inner = &self.inner;
        let (waiters, slots) = {
            let mut state = inner.state.lock();
            state.phase = Phase::Draining;
            let waiters = std::mem::take(&mut state.waiters);
            let slots: Vec<_> = state.registry.values().cloned().collect();
            (waiters, slots)
        };
        drop(waiters);

        tracing::info!(
            resource_id = self.id(),
            handles = slots.len(),
            "Quiescing pool"
        );

        let drain_timeout = inner.config.drain_timeout;
        join_all(slots.iter().map(|slot| async move {
            inner.factory.quiesce(&slot.handle).await;
            if tokio::time::timeout(drain_timeout, slot.returned())
                .await
                .is_err()
            {
                tracing::warn!(
                    resource_id = self.id(),
                    handle = %slot.id,
                    timeout_ms = millis(drain_timeout),
                    "Handle still leased after drain timeout"
                );
            }
        }))
        .await;

        inner.state.lock().phase = Phase::Drained;
    }

    /// Phase 2 of shutdown: destroy every handle.
    ///
    /// Runs [`quiesce`](Self::quiesce) first if it has not run yet. Handles
    /// are destroyed concurrently and exactly once; individual failures are
    /// collected into [`Error::Close`] without stopping the rest. Handles
    /// still being created by concurrent acquires are waited for (up to
    /// [`PoolConfig::drain_timeout`]) and destroyed before this returns.
    /// Afterwards the pool is empty and closed for good.
    ///
    /// Teardown runs on its own task: dropping the returned future does not
    /// stop it, and a repeated `close` waits for it to finish.
    pub async fn close(&self) -> Result<()> {
        let pool = self.clone();
        self.exclusive(async move { pool.close_locked().await }).await
    }

    async fn close_locked(&self) -> Result<()> {
        let inner = &self.inner;
        let phase = inner.state.lock().phase;
        match phase {
            Phase::Closed => return Ok(()),
            Phase::Uninitialized => return Err(Error::not_initialized(self.id())),
            Phase::Running | Phase::Draining => self.drain().await,
            Phase::Drained => {}
        }

        if tokio::time::timeout(inner.config.drain_timeout, inner.creations_settled())
            .await
            .is_err()
        {
            tracing::warn!(
                resource_id = self.id(),
                timeout_ms = millis(inner.config.drain_timeout),
                "Handle creation still pending after drain timeout"
            );
        }

        let (waiters, slots) = {
            let mut state = inner.state.lock();
            state.phase = Phase::Closed;
            let waiters = std::mem::take(&mut state.waiters);
            let slots: Vec<_> = state.registry.values().cloned().collect();
            (waiters, slots)
        };
        drop(waiters);

        let failures: Vec<DestroyFailure> = join_all(slots.iter().map(|slot| async move {
            inner
                .destroy_slot(slot)
                .await
                .err()
                .map(|error| DestroyFailure {
                    handle: slot.id,
                    error,
                })
        }))
        .await
        .into_iter()
        .flatten()
        .collect();

        inner.state.lock().reset();

        if failures.is_empty() {
            tracing::info!(resource_id = self.id(), handles = slots.len(), "Pool closed");
            Ok(())
        } else {
            for failure in &failures {
                tracing::error!(
                    resource_id = self.id(),
                    handle = %failure.handle,
                    error = %failure.error,
                    "Failed to destroy handle"
                );
            }
            Err(Error::Close {
                resource_id: self.id().to_string(),
                failures,
            })
        }
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let inner = &self.inner;
        let state = inner.state.lock();
        PoolStats {
            created: state.created,
            idle: state.idle.len(),
            leased: state.leased.len(),
            waiters: state.waiters.iter().filter(|tx| !tx.is_closed()).count(),
            max_size: inner.config.max_size,
            total_acquisitions: inner.acquisitions.load(Ordering::Relaxed),
            total_releases: inner.releases.load(Ordering::Relaxed),
            destroyed: inner.destroyed.load(Ordering::Relaxed),
            initialized: !matches!(state.phase, Phase::Uninitialized | Phase::Closed),
            draining: state.phase.is_shutting_down(),
            closed: state.phase == Phase::Closed,
        }
    }

    /// Take a handle back from a dropped lease.
    ///
    /// Hands it straight to the oldest live waiter, or queues it idle.
    pub(crate) fn give_back(&self, slot: Arc<Slot<F::Handle>>) {
        let inner = &self.inner;
        let mut slot = slot;
        let mut counted = false;
        loop {
            let waiter = {
                let mut state = inner.state.lock();
                if state.phase.is_shutting_down() || slot.is_destroyed() {
                    let was_leased = state.leased.remove(&slot.id);
                    drop(state);
                    slot.set_leased(false);
                    if was_leased && !counted {
                        inner.releases.fetch_add(1, Ordering::Relaxed);
                    }
                    tracing::debug!(
                        resource_id = self.id(),
                        handle = %slot.id,
                        "Handle returned during shutdown"
                    );
                    return;
                }
                if !state.leased.contains(&slot.id) {
                    drop(state);
                    tracing::warn!(
                        resource_id = self.id(),
                        handle = %slot.id,
                        "Rejected release of a handle that is not checked out"
                    );
                    return;
                }
                if !counted {
                    inner.releases.fetch_add(1, Ordering::Relaxed);
                    counted = true;
                }
                match state.next_waiter() {
                    Some(tx) => tx,
                    None => {
                        state.leased.remove(&slot.id);
                        state.idle.push_back(Arc::clone(&slot));
                        drop(state);
                        slot.set_leased(false);
                        return;
                    }
                }
            };

            match waiter.send(Grant::Lease(Lease::new(self.clone(), slot))) {
                Ok(()) => return,
                Err(Grant::Lease(lease)) => slot = lease.into_slot(),
                Err(Grant::Vacancy(_)) => return,
            }
        }
    }

    /// Free one slot counted in `created`.
    ///
    /// Ownership passes to the oldest live waiter, which fills it by growing;
    /// with nobody waiting the count drops.
    fn vacate(&self) {
        let mut state = self.inner.state.lock();
        if !state.phase.is_shutting_down()
            && let Some(tx) = state.next_waiter()
        {
            drop(state);
            let vacancy = Vacancy {
                pool: self.clone(),
                armed: true,
            };
            // On a lost race the returned vacancy drops and vacates again.
            let _ = tx.send(Grant::Vacancy(vacancy));
            return;
        }
        state.created = state.created.saturating_sub(1);
    }

    /// Remove a handle from the pool for good and free its slot.
    async fn retire(&self, slot: Arc<Slot<F::Handle>>) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            state.leased.remove(&slot.id);
            state.registry.remove(&slot.id);
        }
        slot.set_leased(false);
        inner.releases.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = inner.destroy_slot(&slot).await {
            tracing::warn!(
                resource_id = self.id(),
                handle = %slot.id,
                error = %err,
                "Failed to destroy retired handle"
            );
        }
        self.vacate();
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
