//! # Moorage Logging
//!
//! One call sets up the process-wide `tracing` subscriber: an `EnvFilter`
//! from the configured level, a pretty, compact or JSON `fmt` layer on
//! stderr, and an optional root span naming the service for the caller to
//! instrument its top-level future with.
//!
//! ```no_run
//! use tracing::Instrument;
//!
//! # async fn demo() -> Result<(), moorage_log::LogError> {
//! let guard = moorage_log::init_with(moorage_log::Config::development().with_service("moorage"))?;
//! async {
//!     tracing::info!(resource_id = "amqp", "pool ready");
//! }
//! .instrument(guard.root_span().clone())
//! .await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, Format};
pub use error::{LogError, LogResult};

/// Initialize logging from `MOORAGE_LOG` / `RUST_LOG` and `MOORAGE_LOG_FORMAT`.
///
/// # Errors
/// See [`init_with`].
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::from_env())
}

/// Initialize logging with an explicit configuration.
///
/// Keep the returned guard alive for the lifetime of the process.
///
/// # Errors
/// [`LogError::Filter`] if the level is not a valid filter directive,
/// [`LogError::Init`] if a global subscriber is already installed.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
