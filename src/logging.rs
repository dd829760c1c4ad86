//! Tracing setup shared by the server and the sync runner.
//!
//! Every process logs to a console stream and, unless `LOG_FILE=off`, to a file. The server
//! logs to stdout; the sync runner logs to stderr because its stdout carries the final status
//! document. Filtering follows `RUST_LOG` and defaults to `info`.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::config::Config;

/// Directory used for daily log files when `LOG_FILE` is unset.
pub const DEFAULT_LOG_DIR: &str = "logs";
/// File name prefix of the daily log files.
pub const DAILY_LOG_PREFIX: &str = "rustycache.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Stream receiving human-readable log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Where file logs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFile {
    /// No file layer.
    Disabled,
    /// Append to a single file.
    Append(PathBuf),
    /// Roll daily inside a directory.
    Daily(PathBuf),
}

impl LogFile {
    /// Interpret the `LOG_FILE` setting: unset rolls daily under `logs/`, `off` disables.
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting.map(str::trim) {
            None | Some("") => LogFile::Daily(PathBuf::from(DEFAULT_LOG_DIR)),
            Some(value) if value.eq_ignore_ascii_case("off") => LogFile::Disabled,
            Some(value) => LogFile::Append(PathBuf::from(value)),
        }
    }

    fn writer(&self) -> Option<NonBlocking> {
        let (writer, guard) = match self {
            LogFile::Disabled => return None,
            LogFile::Append(path) => match open_append(path) {
                Ok(file) => tracing_appender::non_blocking(file),
                Err(err) => {
                    eprintln!("Failed to open log file {}: {err}", path.display());
                    return None;
                }
            },
            LogFile::Daily(dir) => {
                if let Err(err) = std::fs::create_dir_all(dir) {
                    eprintln!("Failed to create log directory {}: {err}", dir.display());
                    return None;
                }
                tracing_appender::non_blocking(tracing_appender::rolling::daily(
                    dir,
                    DAILY_LOG_PREFIX,
                ))
            }
        };
        // A second initialization keeps the first guard; its writer is simply unused.
        let _ = FILE_GUARD.set(guard);
        Some(writer)
    }
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

/// Install the global subscriber for `console` plus the file layer selected by `config`.
pub fn init_tracing(config: &Config, console: Console) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = match console {
        Console::Stdout => fmt::layer().with_target(false).compact().boxed(),
        Console::Stderr => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed(),
    };
    let file_layer = LogFile::from_setting(config.log_file.as_deref())
        .writer()
        .map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact()
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_setting_rolls_daily_under_logs() {
        assert_eq!(
            LogFile::from_setting(None),
            LogFile::Daily(PathBuf::from(DEFAULT_LOG_DIR))
        );
        assert_eq!(
            LogFile::from_setting(Some("  ")),
            LogFile::Daily(PathBuf::from(DEFAULT_LOG_DIR))
        );
    }

    #[test]
    fn off_disables_file_logging() {
        assert_eq!(LogFile::from_setting(Some("OFF")), LogFile::Disabled);
        assert!(LogFile::Disabled.writer().is_none());
    }

    #[test]
    fn explicit_path_appends_and_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/sync.log");
        let setting = path.to_string_lossy().into_owned();

        let target = LogFile::from_setting(Some(&setting));
        assert_eq!(target, LogFile::Append(path.clone()));
        assert!(target.writer().is_some());
        assert!(path.exists());
    }
}
