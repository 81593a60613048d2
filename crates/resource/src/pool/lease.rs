//! RAII lease over a pooled handle.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::{HandleId, Pool, Slot};
use crate::factory::Factory;

/// Exclusive access to one pooled handle.
///
/// Dereferences to `F::Handle`. Dropping the lease returns the handle to the
/// pool without running the reset hook; [`Pool::release`] runs it first.
#[must_use = "dropping a lease returns the handle immediately"]
pub struct Lease<F: Factory> {
    pool: Pool<F>,
    slot: Arc<Slot<F::Handle>>,
    acquired_at: Instant,
    armed: bool,
}

impl<F: Factory> Lease<F> {
    pub(super) fn new(pool: Pool<F>, slot: Arc<Slot<F::Handle>>) -> Self {
        Self {
            pool,
            slot,
            acquired_at: Instant::now(),
            armed: true,
        }
    }

    /// Identifier of the leased handle.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.slot.id
    }

    /// When the pool created the handle.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.slot.created_at
    }

    /// How long this lease has been held.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Consume the lease without returning the handle.
    pub(super) fn into_slot(mut self) -> Arc<Slot<F::Handle>> {
        self.armed = false;
        Arc::clone(&self.slot)
    }

    pub(super) fn belongs_to(&self, pool: &Pool<F>) -> bool {
        self.pool.ptr_eq(pool)
    }
}

impl<F: Factory> Deref for Lease<F> {
    type Target = F::Handle;

    fn deref(&self) -> &Self::Target {
        &self.slot.handle
    }
}

impl<F: Factory> fmt::Debug for Lease<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("resource_id", &self.pool.id())
            .field("handle", &self.slot.id)
            .field("held_for", &self.held_for())
            .finish()
    }
}

impl<F: Factory> Drop for Lease<F> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.give_back(Arc::clone(&self.slot));
        }
    }
}
