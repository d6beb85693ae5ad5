//! Tracing subscriber setup for hosts embedding the negotiator
//!
//! The library itself only emits `tracing` events. Hosts without a subscriber
//! of their own can install one here.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "permit=info";

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable multi-line output.
    Pretty,

    /// Single-line output.
    Compact,

    /// JSON lines, for log shippers.
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter.
    ///
    /// If None, uses RUST_LOG or falls back to [`DEFAULT_FILTER`].
    pub level: Option<tracing::Level>,

    /// Output format.
    pub format: TracingFormat,

    /// Include timestamps in output.
    pub timestamps: bool,

    /// Include target module names in output.
    pub target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Compact,
            timestamps: true,
            target: true,
        }
    }
}

impl TracingConfig {
    fn filter(&self) -> EnvFilter {
        match self.level {
            Some(level) => EnvFilter::new(level.to_string()),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        }
    }
}

/// Error returned when a global subscriber is already installed
pub type InitError = tracing_subscriber::util::TryInitError;

/// Install a subscriber with default settings.
///
/// # Environment Variables
///
/// - `RUST_LOG=permit=debug` - Show denied-subset and classification details
/// - `RUST_LOG=permit=trace` - Everything
pub fn init_subscriber() -> Result<(), InitError> {
    init_subscriber_with_config(TracingConfig::default())
}

/// Install a subscriber with custom configuration.
///
/// # Example
///
/// ```ignore
/// use permit::tracing_support::{init_subscriber_with_config, TracingConfig, TracingFormat};
///
/// init_subscriber_with_config(TracingConfig {
///     format: TracingFormat::Json,
///     ..Default::default()
/// })?;
/// ```
pub fn init_subscriber_with_config(config: TracingConfig) -> Result<(), InitError> {
    let filter = config.filter();
    let registry = tracing_subscriber::registry().with(filter);
    let fmt = tracing_subscriber::fmt::layer().with_target(config.target);

    match (config.format, config.timestamps) {
        (TracingFormat::Pretty, true) => registry.with(fmt.pretty()).try_init(),
        (TracingFormat::Pretty, false) => registry.with(fmt.pretty().without_time()).try_init(),
        (TracingFormat::Compact, true) => registry.with(fmt.compact()).try_init(),
        (TracingFormat::Compact, false) => registry.with(fmt.compact().without_time()).try_init(),
        (TracingFormat::Json, true) => registry.with(fmt.json()).try_init(),
        (TracingFormat::Json, false) => registry.with(fmt.json().without_time()).try_init(),
    }
}
