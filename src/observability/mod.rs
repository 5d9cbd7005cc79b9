// Observability infrastructure using tracing crate
// Structured logging for shutdown rounds

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Initialize the global subscriber
/// RUST_LOG takes precedence over the configured filter
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .context("Failed to create tracing filter")?;

    let fmt_layer = if config.json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Span covering one shutdown round of a coordinator
#[inline]
pub fn round_span(coordinator: &str, outstanding: usize) -> tracing::Span {
    tracing::info_span!(
        "shutdown_round",
        coordinator = coordinator,
        outstanding = outstanding,
    )
}
