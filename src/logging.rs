use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub const LOG_FILE_PREFIX: &str = "amcpserver.log";

/// Flushes the file log on drop; hold it for the life of the process.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "amcp=debug,info"
    } else {
        "info"
    }
}

/// Console logging on stderr, plus a daily-rolling file in `log_dir` when
/// given. `RUST_LOG` overrides the level chosen by `verbose`.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<LoggingGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)))
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter())
        .boxed();
    let mut layers = vec![console_layer];

    let mut file_guard = None;
    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(filter())
                .boxed(),
        );
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        log_dir: log_dir.map(Path::to_path_buf),
    })
}
