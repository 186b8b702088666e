//! Tracing setup: console output plus one log file per session

use crate::config::LOG_DIR_NAME;
use crate::types::SyncError;
use crate::ui::ConsoleWriter;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file name for a session started at `started`
pub fn session_log_name(started: DateTime<Local>) -> String {
    format!("sync_monitor_{}.log", started.format("%Y%m%d_%H%M%S"))
}

/// Filter level for `-v`/`-q`
///
/// `quiet` wins over any number of `-v`.
pub fn level_for(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber
///
/// Everything at the chosen level goes to the console (through `console`,
/// so progress bars are not torn) and, without ANSI colors,
/// to `<local_root>/logs/sync_monitor_YYYYmmdd_HHMMSS.log`. `RUST_LOG`
/// overrides the level. The returned guard flushes the file on drop and
/// must live as long as the session.
pub fn init_logging(
    local_root: &Path,
    verbosity: u8,
    quiet: bool,
    console: ConsoleWriter,
) -> Result<(WorkerGuard, PathBuf), SyncError> {
    let log_dir = local_root.join(LOG_DIR_NAME);
    fs::create_dir_all(&log_dir).map_err(|source| SyncError::Local {
        path: log_dir.clone(),
        source,
    })?;

    let file_name = session_log_name(Local::now());
    let log_path = log_dir.join(&file_name);
    let appender = tracing_appender::rolling::never(&log_dir, &file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let level = level_for(verbosity, quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mirrorwatch={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(console)
                .with_target(verbosity >= 2),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| SyncError::Config(format!("Logging already initialized: {}", e)))?;

    Ok((guard, log_path))
}

/// Console-only subscriber for commands that have no local folder
pub fn init_console_logging(verbosity: u8, quiet: bool) -> Result<(), SyncError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mirrorwatch={}", level_for(verbosity, quiet))));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| SyncError::Config(format!("Logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_log_name_format() {
        let started = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .expect("valid local time");
        assert_eq!(session_log_name(started), "sync_monitor_20240309_070501.log");
    }

    #[test]
    fn test_level_for_flags() {
        assert_eq!(level_for(0, false), "info");
        assert_eq!(level_for(1, false), "debug");
        assert_eq!(level_for(3, false), "trace");
        assert_eq!(level_for(2, true), "warn");
    }
}
