// ABOUTME: tracing-subscriber setup: env filter, human or JSON stdout, optional daily log file
// ABOUTME: Returns the appender guard that must live until the process exits

use anyhow::{Context, Result};
use herald_core::config::LoggingConfig;
use herald_core::paths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default to info, but keep teloxide's polling chatter out of the logs
const DEFAULT_FILTER: &str = "info,teloxide=warn";

/// File name prefix of the rotated log files in `paths::log_dir()`
const LOG_FILE_PREFIX: &str = "herald.log";

/// Filter directive used when RUST_LOG is not set
pub fn default_directive(config: &LoggingConfig) -> &str {
    config
        .filter
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_FILTER)
}

/// Run `f` with a temporary stderr subscriber installed on this thread.
/// Used while loading the config, before `init` can know the logging settings.
pub fn with_bootstrap<T>(f: impl FnOnce() -> T) -> T {
    tracing::subscriber::with_default(bootstrap_subscriber(std::io::stderr), f)
}

fn bootstrap_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let (file_layer, guard) = if config.file {
        let dir = paths::log_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    let json_layer = config.json.then(|| fmt::layer().json());
    let plain_layer = (!config.json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
