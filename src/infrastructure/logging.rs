//! Logging system configuration and initialization
//!
//! Console output plus an optional daily-rolling file written through a
//! non-blocking appender. The returned `LoggingGuard` owns the appender's
//! worker; dropping it flushes and stops file logging.

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub use crate::infrastructure::config::LoggingConfig;

/// Dependencies that are noisy below `warn` unless tracing is requested
const QUIET_TARGETS: &[&str] = &["sqlx", "hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Keeps the file writer alive for the lifetime of the host
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Builds the filter: `RUST_LOG` wins; otherwise the configured level with
/// dependency noise suppressed and per-module overrides applied.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    if !config.level.eq_ignore_ascii_case("trace") {
        for target in QUIET_TARGETS {
            filter = filter.add_directive(format!("{target}=warn").parse::<Directive>()?);
        }
    }

    for (module, level) in &config.module_filters {
        let directive = format!("{module}={level}")
            .parse::<Directive>()
            .with_context(|| format!("Invalid module filter {module}={level}"))?;
        filter = filter.add_directive(directive);
    }

    Ok(filter)
}

/// Initialize the logging system with the given configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<LoggingGuard> {
    if !config.console_output && !config.file_output {
        anyhow::bail!("No logging output configured");
    }

    let filter = build_env_filter(config)?;

    let console_layer = config.console_output.then(|| {
        if config.json_format {
            fmt::layer()
                .json()
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(false)
                .boxed()
        }
    });

    let mut file_guard = None;
    let file_layer = if config.file_output {
        let log_dir = config.log_directory();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let (writer, guard) = non_blocking(rolling::daily(&log_dir, &config.file_prefix));
        file_guard = Some(guard);

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(true)
                .with_ansi(false)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    info!(
        level = %config.level,
        json = config.json_format,
        file = config.file_output,
        "Logging system initialized"
    );
    if config.file_output {
        info!("Log directory: {}", config.log_directory().display());
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
