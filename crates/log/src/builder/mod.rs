//! Logger builder implementation

#[macro_use]
mod format;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by [`LoggerBuilder::build`]
///
/// Carries the root span naming the service. Spans are per task, so attach
/// it to the top-level future with `tracing::Instrument` (and spawn with
/// `in_current_span`) for events on every worker thread to carry it.
#[derive(Debug)]
pub struct LoggerGuard {
    root_span: tracing::Span,
}

impl LoggerGuard {
    /// The `app` span, or a disabled span when no service is configured.
    #[must_use]
    pub fn root_span(&self) -> &tracing::Span {
        &self.root_span
    }
}

macro_rules! try_init_subscriber {
    ($filter:expr, $layer:expr) => {
        Registry::default()
            .with($filter)
            .with($layer)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))
    };
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already set
    pub fn build(self) -> LogResult<LoggerGuard> {
        let config = self.config;
        let filter = EnvFilter::try_new(&config.level)
            .map_err(|e| LogError::Filter(format!("{}: {}", config.level, e)))?;

        match config.format {
            Format::Pretty => try_init_subscriber!(filter, create_fmt_layer!(pretty, config))?,
            Format::Compact => try_init_subscriber!(filter, create_fmt_layer!(compact, config))?,
            Format::Json => try_init_subscriber!(filter, create_json_layer!(config))?,
        }

        let root_span = config
            .service
            .as_deref()
            .map_or_else(tracing::Span::none, |service| {
                tracing::info_span!("app", service)
            });

        tracing::debug!(level = %config.level, format = %config.format, "Logger initialized");
        Ok(LoggerGuard { root_span })
    }
}
