use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};
use warden_config::{LogFormat, LogLevel, LoggingConfig};

type FilterHandle = reload::Handle<EnvFilter, Registry>;
type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;

static INSTALLED: OnceCell<FilterHandle> = OnceCell::new();

/// Handle on the installed subscriber's filter
#[derive(Clone)]
pub struct LogHandle {
    filter: FilterHandle,
    directives: Option<String>,
}

impl LogHandle {
    /// Replace the base level, keeping per-target directives
    pub fn set_level(&self, level: LogLevel) -> Result<()> {
        self.set_level_filter(LevelFilter::from(level_to_tracing(level)))
    }

    /// Replace the base level with an arbitrary filter, `OFF` silences warden
    pub fn set_level_filter(&self, level: LevelFilter) -> Result<()> {
        let filter = build_filter(&level.to_string().to_lowercase(), self.directives.as_deref());
        self.filter
            .reload(filter)
            .context("Failed to update log filter")
    }

    /// Currently active filter directives
    pub fn current_filter(&self) -> Option<String> {
        self.filter.with_current(|f| f.to_string()).ok()
    }
}

/// Filter directive string for a base level plus extra `target=level` directives
pub fn filter_directives(level: &str, extra: Option<&str>) -> String {
    match extra.map(str::trim).filter(|d| !d.is_empty()) {
        Some(extra) => format!("{},{}", level, extra),
        None => level.to_string(),
    }
}

/// Initialize logging from configuration.
///
/// Logs go to stderr so the engine's own stdout stays untouched. Only the
/// first call installs a subscriber; later calls get a handle on that one.
pub fn init_logging(config: &LoggingConfig) -> Result<LogHandle> {
    let directives = config.directives.clone();

    if let Some(filter) = INSTALLED.get() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
        return Ok(LogHandle {
            filter: filter.clone(),
            directives,
        });
    }

    let env_filter = build_filter(config.level.as_str(), directives.as_deref());
    let (filter_layer, filter) = reload::Layer::new(env_filter);
    let location = config.include_location;

    let fmt_layer: Box<dyn Layer<FilteredRegistry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_file(location)
            .with_line_number(location)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_file(location)
            .with_line_number(location)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_file(location)
            .with_line_number(location)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_file(location)
            .with_line_number(location)
            .boxed(),
    };

    // Use try_init to avoid panic if global subscriber already set
    if tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber installed elsewhere, filter updates have no effect");
    } else {
        let _ = INSTALLED.set(filter.clone());
    }

    Ok(LogHandle { filter, directives })
}

fn build_filter(level: &str, directives: Option<&str>) -> EnvFilter {
    EnvFilter::try_new(filter_directives(level, directives))
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn level_to_tracing(level: LogLevel) -> tracing::Level {
    match level {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert_eq!(filter_directives("info", None), "info");
        assert_eq!(filter_directives("info", Some("  ")), "info");
        assert_eq!(
            filter_directives("warn", Some("warden_ipc=trace")),
            "warn,warden_ipc=trace"
        );
    }

    #[test]
    fn test_init_then_adjust_level() {
        let config = LoggingConfig {
            level: LogLevel::Info,
            directives: Some("warden_execution=trace".to_string()),
            ..Default::default()
        };
        let handle = init_logging(&config).unwrap();
        let again = init_logging(&config).unwrap();

        handle.set_level(LogLevel::Warn).unwrap();
        let current = again.current_filter().unwrap().to_lowercase();
        assert!(current.contains("warn"));
        assert!(current.contains("warden_execution=trace"));

        handle.set_level_filter(LevelFilter::OFF).unwrap();
        assert!(handle.current_filter().unwrap().to_lowercase().contains("off"));
    }
}
