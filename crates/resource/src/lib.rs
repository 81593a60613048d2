//! # Moorage Resource Pooling
//!
//! Bounded, lazily growing pools of backend handles (broker channels,
//! database sessions, cache clients) with two-phase graceful shutdown, and a
//! coordinator that starts and stops such components in priority order.
//!
//! ```no_run
//! use moorage_resource::{Pool, PoolConfig, testing::MockFactory};
//!
//! # async fn demo() -> moorage_resource::Result<()> {
//! let pool = Pool::new(MockFactory::new(), PoolConfig::sized(1, 4))?;
//! pool.init().await?;
//! let lease = pool.acquire(None).await?;
//! pool.release(lease).await;
//! pool.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod pool;
pub mod reconnect;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{BoxError, DestroyFailure, Error, Result};
pub use factory::Factory;
pub use lifecycle::{Component, Coordinator};
pub use pool::{HandleId, Lease, Pool, PoolConfig, PoolStats};
pub use reconnect::{LinkState, ReconnectPolicy, Reconnector};
