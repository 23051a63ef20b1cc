//! Logging setup for the relay binary.
//!
//! Everything is written to stderr; stdout carries the stdio bus and must
//! only ever see NDJSON lines.

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

use crate::error::{Error, Result};

/// Shape of emitted log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines with ANSI colours.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Build the event filter.
///
/// `RUST_LOG` (passed in as `rust_log`) takes precedence over
/// `default_filter`. A bad directive is a config error rather than being
/// silently dropped.
pub fn build_filter(default_filter: &str, rust_log: Option<&str>) -> Result<EnvFilter> {
    let directives = rust_log
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(default_filter);
    EnvFilter::try_new(directives)
        .map_err(|e| Error::Config(format!("Invalid log filter {directives:?}: {e}")))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(default_filter, rust_log.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| Error::Config(format!("Tracing already initialised: {e}")))
}
