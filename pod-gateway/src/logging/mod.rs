//! Logging setup with a filter that can be changed at runtime.
//!
//! Console output always; JSON instead of plain text when requested; a daily
//! rolling file when a log directory is configured. Timestamps use the local
//! timezone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::config::LogSettings;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "pod_gateway=info,tower_http=info,reqwest=warn";

/// File name prefix for rolling log files.
const LOG_FILE_PREFIX: &str = "pod-gateway.log";

/// Formats timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Runtime view of the installed subscriber.
pub struct LoggingConfig {
    handle: FilterHandle,
    log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    fn new(handle: FilterHandle, log_dir: Option<PathBuf>) -> Self {
        Self { handle, log_dir }
    }

    /// Current filter directive string.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the filter, e.g. `"pod_gateway=debug,tower_http=warn"`.
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::Other(format!("Invalid filter directive: {}", e)))?;

        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the lifetime of the process, otherwise
/// buffered file output is lost.
pub fn init_logging(settings: &LogSettings) -> crate::Result<(Arc<LoggingConfig>, Option<WorkerGuard>)> {
    let initial_filter = match settings.filter.as_deref() {
        Some(directive) => EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::config(format!("Invalid log filter: {}", e)))?,
        None => EnvFilter::new(DEFAULT_LOG_FILTER),
    };
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    let (file_layer, guard) = match &settings.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = settings
        .json
        .then(|| fmt::layer().json().with_timer(LocalTimer));
    let text_layer = (!settings.json).then(|| fmt::layer().with_ansi(true).with_timer(LocalTimer));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    let config = Arc::new(LoggingConfig::new(filter_handle, settings.dir.clone()));
    Ok((config, guard))
}

#[cfg(test)]
pub(crate) fn detached_config(directive: &str) -> (Arc<LoggingConfig>, impl Sized) {
    // The reload handle only works while its layer is alive, so hand it back.
    let (layer, handle) = reload::Layer::<EnvFilter, tracing_subscriber::Registry>::new(
        EnvFilter::new(directive),
    );
    let subscriber = tracing_subscriber::registry().with(layer);
    (Arc::new(LoggingConfig::new(handle, None)), subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("pod_gateway=info"));
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_set_filter_round_trip() {
        let (config, _subscriber) = detached_config("info");
        assert_eq!(config.get_filter().to_lowercase(), "info");

        config.set_filter("pod_gateway=debug").unwrap();
        assert_eq!(config.get_filter().to_lowercase(), "pod_gateway=debug");
    }

    #[test]
    fn test_invalid_directive_keeps_current_filter() {
        let (config, _subscriber) = detached_config("warn");

        assert!(config.set_filter("pod_gateway=loud").is_err());
        assert_eq!(config.get_filter().to_lowercase(), "warn");
    }
}
