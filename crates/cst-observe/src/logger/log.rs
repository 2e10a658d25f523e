use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Registry with the filter and exactly one output layer enabled.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = cfg.filter()?;

    let text = (cfg.format == LoggerFormat::Text).then(|| {
        fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(local_timer())
    });
    let json = (cfg.format == LoggerFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(cfg.with_targets)
            .with_timer(local_timer())
    });
    let journald = journald_layer(cfg.format)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(journald)
        .try_init()
        .map_err(classify)
}

fn local_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald_layer(format: LoggerFormat) -> Result<Option<tracing_journald::Layer>, LoggerError> {
    if format != LoggerFormat::Journald {
        return Ok(None);
    }
    tracing_journald::layer()
        .map(Some)
        .map_err(|e| LoggerError::Install(format!("journald: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald_layer(format: LoggerFormat) -> Result<Option<tracing_subscriber::layer::Identity>, LoggerError> {
    match format {
        LoggerFormat::Journald => Err(LoggerError::JournaldUnavailable),
        _ => Ok(None),
    }
}

fn classify(e: impl std::fmt::Display) -> LoggerError {
    let msg = e.to_string();
    if msg.contains("global default trace dispatcher")
        || msg.contains("SetGlobalDefaultError")
        || msg.contains("logging system was already initialized")
    {
        LoggerError::AlreadyInstalled
    } else {
        LoggerError::Install(msg)
    }
}
