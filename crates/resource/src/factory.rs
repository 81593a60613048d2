//! The backend contract consumed by [`Pool`](crate::pool::Pool).
//!
//! A `Factory` knows how to open, quiesce, reset and close one kind of
//! connection (a broker channel, a database session, a cache client). The
//! pool treats the produced handle as opaque and only ever calls it through
//! this trait.

use async_trait::async_trait;

use crate::error::Result;

/// Creates and tears down pooled handles.
///
/// Retry policy belongs here, not in the pool: a factory that wants to ride
/// out broker restarts drives a [`Reconnector`](crate::reconnect::Reconnector)
/// inside `create` and reports the final outcome.
#[async_trait]
pub trait Factory: Send + Sync + 'static {
    /// The handle type produced by this factory.
    type Handle: Send + Sync + 'static;

    /// Identifier used in errors and log fields (e.g. "amqp", "postgres").
    fn id(&self) -> &str;

    /// Open a new handle.
    ///
    /// Failures should be reported as [`Error::Create`](crate::Error::Create);
    /// the pool frees the reserved slot and passes the error to the caller.
    async fn create(&self) -> Result<Self::Handle>;

    /// Stop accepting new long-running work on `handle` and wait for work
    /// already in flight on it (e.g. stop consuming, finish publishing).
    async fn quiesce(&self, _handle: &Self::Handle) {}

    /// Reset hook run by [`Pool::release`](crate::pool::Pool::release)
    /// before the handle goes back to the idle queue.
    ///
    /// An error retires the handle: it is destroyed and its slot freed.
    async fn reset(&self, _handle: &Self::Handle) -> Result<()> {
        Ok(())
    }

    /// Close `handle`. Called at most once per handle.
    async fn destroy(&self, handle: &Self::Handle) -> Result<()>;
}
