//! Console and rolling-file logging, plus structured per-candidate events.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Daily log files are written here when set
    pub directory: Option<PathBuf>,
    pub retain_days: usize,
    pub show_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            retain_days: 14,
            show_targets: false,
        }
    }
}

/// Per-user data directory for log files, `./logs` if none can be determined
pub fn default_log_directory() -> PathBuf {
    directories::ProjectDirs::from("it", "catalog-sync", "catalog-sync")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Daily-rolling appender writing `catalog-sync.<date>.log` into `directory`
pub fn file_appender(directory: &Path, retain_days: usize) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(directory)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("catalog-sync")
        .filename_suffix("log")
        .max_log_files(retain_days.max(1))
        .build(directory)?;

    Ok(appender)
}

/// Install the global subscriber: console always, file when a directory is configured.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer()
        .with_target(config.show_targets)
        .with_writer(std::io::stderr)
        .boxed();

    let file = match &config.directory {
        Some(directory) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(file_appender(directory, config.retain_days)?)
                .boxed(),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    if let Some(directory) = &config.directory {
        info!("Writing logs to {}", directory.display());
    }

    Ok(())
}

/// Fields attached to one structured sync event
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogContext {
    pub component: &'static str,
    pub operation: &'static str,
    pub source: Option<String>,
    pub url: Option<String>,
    /// 1-based index of the candidate within the run
    pub position: Option<usize>,
    pub record_id: Option<String>,
    pub status: Option<&'static str>,
    pub error_category: Option<&'static str>,
    pub duration_ms: Option<u64>,
}

impl LogContext {
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn at_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_record(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: &'static str) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_error_category(mut self, category: &'static str) -> Self {
        self.error_category = Some(category);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }
}

/// Emit an event at `$level` carrying every [`LogContext`] field
#[macro_export]
macro_rules! log_event {
    ($level:expr, $context:expr, $($arg:tt)+) => {{
        let context = &$context;
        tracing::event!(
            $level,
            component = context.component,
            operation = context.operation,
            source = ?context.source,
            url = ?context.url,
            position = ?context.position,
            record_id = ?context.record_id,
            status = ?context.status,
            error_category = ?context.error_category,
            duration_ms = ?context.duration_ms,
            $($arg)+
        );
    }};
}

#[macro_export]
macro_rules! log_info {
    ($context:expr, $($arg:tt)+) => {
        $crate::log_event!(tracing::Level::INFO, $context, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($context:expr, $($arg:tt)+) => {
        $crate::log_event!(tracing::Level::WARN, $context, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_error {
    ($context:expr, $($arg:tt)+) => {
        $crate::log_event!(tracing::Level::ERROR, $context, $($arg)+)
    };
}

/// Wall-clock timer for a whole run; logs one closing event with the elapsed time.
pub struct RunTimer {
    context: LogContext,
    started: Instant,
}

impl RunTimer {
    pub fn start(context: LogContext) -> Self {
        Self {
            context,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(self, message: &str, status: &'static str) {
        let context = self.context.with_duration(self.started.elapsed()).with_status(status);
        crate::log_info!(context, "{}", message);
    }

    pub fn fail(self, message: &str, error: &crate::error::SyncError) {
        let context = self
            .context
            .with_duration(self.started.elapsed())
            .with_status("error")
            .with_error_category(error.category());
        crate::log_error!(context, "{}: {}", message, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_builder() {
        let context = LogContext::new("pipeline", "candidate")
            .with_source("ktm")
            .with_url("https://www.ktm.com/it-it/models/motocross/450-sx-f.html")
            .at_position(3)
            .with_record("motorcycle-7")
            .with_status("created");

        assert_eq!(context.component, "pipeline");
        assert_eq!(context.source.as_deref(), Some("ktm"));
        assert_eq!(context.position, Some(3));
        assert_eq!(context.record_id.as_deref(), Some("motorcycle-7"));
        assert_eq!(context.status, Some("created"));
        assert_eq!(context.error_category, None);
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let directory = dir.path().join("nested").join("logs");

        assert!(file_appender(&directory, 7).is_ok());
        assert!(directory.is_dir());
    }

    #[test]
    fn test_file_logging_is_off_by_default() {
        assert!(LoggingConfig::default().directory.is_none());
    }

    #[test]
    fn test_macros_accept_format_arguments() {
        let context = LogContext::new("test", "macros").with_status("ok");
        crate::log_info!(context, "processed {} candidates", 3);
        crate::log_warn!(context, "skipping {}", "item");
        crate::log_error!(context, "plain message");
    }
}
