//! Minimal stderr logger for the binaries.

use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

struct StderrLogger {
    level: LevelFilter,
}

impl StderrLogger {
    fn for_verbosity(verbose: bool) -> Self {
        let level = if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        Self { level }
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

/// One log line, without the trailing newline.
fn format_line(record: &Record, since_epoch: Duration) -> String {
    format!(
        "{}.{:03} {} {}: {}",
        since_epoch.as_secs(),
        since_epoch.subsec_millis(),
        level_tag(record.level()),
        record.target(),
        record.args()
    )
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let _ = writeln!(std::io::stderr().lock(), "{}", format_line(record, now));
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install the logger: `info` by default, `debug` when verbose.
/// A second call is a no-op.
pub fn init(verbose: bool) {
    let logger = StderrLogger::for_verbosity(verbose);
    let level = logger.level;
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(logger: &StderrLogger, level: Level) -> bool {
        logger.enabled(&Metadata::builder().level(level).target("devlink").build())
    }

    #[test]
    fn test_default_level_is_info() {
        let logger = StderrLogger::for_verbosity(false);
        assert!(enabled(&logger, Level::Error));
        assert!(enabled(&logger, Level::Warn));
        assert!(enabled(&logger, Level::Info));
        assert!(!enabled(&logger, Level::Debug));
        assert!(!enabled(&logger, Level::Trace));
    }

    #[test]
    fn test_verbose_enables_debug() {
        let logger = StderrLogger::for_verbosity(true);
        assert!(enabled(&logger, Level::Debug));
        assert!(!enabled(&logger, Level::Trace));
    }

    #[test]
    fn test_line_format() {
        let line = format_line(
            &Record::builder()
                .level(Level::Warn)
                .target("devlink::network")
                .args(format_args!("session {} closed", 3))
                .build(),
            Duration::from_millis(1_700_000_000_042),
        );
        assert_eq!(line, "1700000000.042 WARN  devlink::network: session 3 closed");
    }
}
