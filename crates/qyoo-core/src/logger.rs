//! Minimal stderr logger for the detector binaries and examples.
//!
//! Records from the `qyoo*` crates are printed at the requested level,
//! everything else (dependencies) only at `Warn` and above. Each line is
//! prefixed with the time elapsed since installation and the record's module.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const OWN_PREFIX: &str = "qyoo";

struct StageLogger {
    level: LevelFilter,
    started: Instant,
}

impl StageLogger {
    fn threshold_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_PREFIX) {
            self.level
        } else {
            self.level.min(LevelFilter::Warn)
        }
    }
}

impl Log for StageLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.threshold_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:8.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            record_label(record),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Full target for warnings and errors, last module path segment otherwise.
fn record_label<'a>(record: &Record<'a>) -> &'a str {
    if record.level() <= Level::Warn {
        return record.target();
    }
    record
        .module_path()
        .and_then(|m| m.rsplit("::").next())
        .unwrap_or_else(|| record.target())
}

static LOGGER: OnceLock<StageLogger> = OnceLock::new();

/// Install the stage logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StageLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber.
///
/// `level` sets the default `qyoo=<level>` directive; `RUST_LOG`, when set,
/// replaces it.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, level: LevelFilter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(feature = "tracing")]
fn default_directive(level: LevelFilter) -> String {
    format!("{OWN_PREFIX}={}", level.as_str().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_targets_are_capped_at_warn() {
        let logger = StageLogger {
            level: LevelFilter::Debug,
            started: Instant::now(),
        };
        assert_eq!(logger.threshold_for("qyoo_marker::matcher"), LevelFilter::Debug);
        assert_eq!(logger.threshold_for("nalgebra"), LevelFilter::Warn);

        let quiet = StageLogger {
            level: LevelFilter::Error,
            started: Instant::now(),
        };
        assert_eq!(quiet.threshold_for("serde_json"), LevelFilter::Error);
    }

    #[test]
    fn label_is_module_below_warn_and_target_above() {
        let label = |level| {
            record_label(
                &Record::builder()
                    .level(level)
                    .target("qyoo_marker::detector::pipeline")
                    .module_path(Some("qyoo_marker::detector::pipeline"))
                    .build(),
            )
        };
        assert_eq!(label(Level::Debug), "pipeline");
        assert_eq!(label(Level::Info), "pipeline");
        assert_eq!(label(Level::Warn), "qyoo_marker::detector::pipeline");

        let bare = Record::builder()
            .level(Level::Debug)
            .target("custom")
            .build();
        assert_eq!(record_label(&bare), "custom");
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn tracing_default_follows_level() {
        assert_eq!(default_directive(LevelFilter::Debug), "qyoo=debug");
        assert_eq!(default_directive(LevelFilter::Warn), "qyoo=warn");
    }
}
