//! Logging setup.
//!
//! Gateway events go to a rolling file under the configured log
//! directory and, in text mode, are mirrored to stdout with color. JSON
//! mode writes structured records to the file only, for log shippers.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// The notification sinks' HTTP clients log every request at debug
/// level; quieted unless tracing is explicitly enabled.
const QUIET_TARGETS: &[&str] = &["hyper", "reqwest", "rustls"];

/// Install the global subscriber. The returned guard flushes the file
/// writer on drop and must be held for the life of the process.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(file_appender(config));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_directives(&config.log_level, config.enable_tracing))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(writer)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}

fn file_appender(config: &AppConfig) -> RollingFileAppender {
    match config.rotation.as_str() {
        "hourly" => rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => rolling::daily(&config.log_dir, &config.log_file),
        _ => rolling::never(&config.log_dir, &config.log_file),
    }
}

/// Filter directives when RUST_LOG is unset: the configured level for
/// the gateway, with the noisy HTTP targets capped at warn.
fn default_directives(level: &str, enable_tracing: bool) -> String {
    let mut directives = level.to_string();
    if !enable_tracing {
        for target in QUIET_TARGETS {
            directives.push_str(&format!(",{}=warn", target));
        }
    }
    directives
}
