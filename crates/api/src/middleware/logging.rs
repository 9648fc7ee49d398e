//! Logging initialization and configuration.

use thiserror::Error;
use tracing_subscriber::{
    filter::ParseError,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Crates whose events follow `logging.level`. Everything else logs at `warn`.
const REGISTRY_TARGETS: &[&str] = &[
    "code_registry",
    "code_registry_api",
    "domain",
    "persistence",
    "shared",
    "tower_http",
];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {directives:?}: {source}")]
    InvalidFilter {
        directives: String,
        #[source]
        source: ParseError,
    },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Expand a bare level such as `debug` into per-crate directives.
///
/// Anything that already names a target (`sqlx=debug,info`) is used verbatim.
pub fn default_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }

    let mut directives = vec!["warn".to_string()];
    directives.extend(REGISTRY_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Build the filter from `RUST_LOG` when set, else from the configured level.
fn filter_from(rust_log: Option<&str>, level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = match rust_log.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => default_directives(level),
    };

    EnvFilter::try_new(&directives)
        .map_err(|source| LoggingError::InvalidFilter { directives, source })
}

/// Initializes the logging subsystem based on configuration.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter_from(rust_log.as_deref(), &config.level)?;

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true);
            subscriber.with(json_layer).try_init()?;
        }
        _ => {
            let pretty_layer = fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true);
            subscriber.with(pretty_layer).try_init()?;
        }
    }

    Ok(())
}
