//! File logging. The terminal belongs to the UI, so nothing is written to
//! stdout or stderr while it runs.

use std::fs;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};

use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, LeaveAlternateScreen};
use tracing::error;
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024; // 10MB
const LATEST_LOG: &str = "latest.log";
const PREVIOUS_LOG: &str = "previous.log";

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub log_dir: PathBuf,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Keeps the background writer alive; dropping it flushes pending lines.
pub struct LogSystem {
    latest_log: PathBuf,
    _guard: WorkerGuard,
}

impl LogSystem {
    pub fn init(options: LogOptions) -> Result<Self, LogError> {
        fs::create_dir_all(&options.log_dir)?;
        let latest_log = options.log_dir.join(LATEST_LOG);
        rotate_if_large(&latest_log, &options.log_dir, MAX_LOG_BYTES)?;

        let file_appender = rolling::never(&options.log_dir, LATEST_LOG);
        let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
            .lossy(false)
            .finish(file_appender);

        let level = if options.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };

        let file_layer = fmt::layer()
            .with_target(false)
            .with_level(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(level);

        tracing_subscriber::registry()
            .with(file_layer)
            .try_init()
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("global subscriber") || msg.contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        install_panic_hook();

        Ok(Self {
            latest_log,
            _guard: guard,
        })
    }

    pub fn path(&self) -> &Path {
        &self.latest_log
    }
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        // Leave raw mode first so the panic message is readable.
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);

        if let Some(location) = info.location() {
            error!("panic at {}:{}: {}", location.file(), location.line(), info);
        } else {
            error!("panic: {info}");
        }
        previous(info);
    }));
}

fn rotate_if_large(latest_log: &Path, logs_dir: &Path, limit: u64) -> Result<(), LogError> {
    if let Ok(meta) = fs::metadata(latest_log) {
        if meta.len() >= limit {
            fs::rename(latest_log, logs_dir.join(PREVIOUS_LOG))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_rotate_large_log() {
        let dir = tempdir().unwrap();
        let latest = dir.path().join(LATEST_LOG);
        fs::write(&latest, vec![b'x'; 64]).unwrap();

        rotate_if_large(&latest, dir.path(), 1024).unwrap();
        assert!(latest.exists());

        rotate_if_large(&latest, dir.path(), 64).unwrap();
        assert!(!latest.exists());
        assert_eq!(fs::read(dir.path().join(PREVIOUS_LOG)).unwrap().len(), 64);
    }

    #[test]
    fn test_rotate_without_log_is_noop() {
        let dir = tempdir().unwrap();
        rotate_if_large(&dir.path().join(LATEST_LOG), dir.path(), 1).unwrap();
        assert!(!dir.path().join(PREVIOUS_LOG).exists());
    }
}
