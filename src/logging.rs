//! Log routing for the CLI.
//!
//! stdout carries command results, so events are written to stderr. When [`LogSettings::file`] is
//! set, a plain-text copy is appended to that file from a background writer thread.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, util::TryInitError};

use crate::config::Config;

/// Filter directives used when `RUST_LOG` is unset or blank.
pub const DEFAULT_FILTER: &str = "info";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Failures while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file could not be opened for appending.
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        /// Requested log file.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// `RUST_LOG` held directives that do not parse.
    #[error("invalid log filter '{directives}': {message}")]
    Filter {
        /// Directives as given.
        directives: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber was installed first.
    #[error(transparent)]
    AlreadyInstalled(#[from] TryInitError),
}

/// Where events go and which ones are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directives; [`DEFAULT_FILTER`] when `None`.
    pub filter: Option<String>,
    /// File that receives a copy of every event.
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Read `RUST_LOG` and take the log file from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            filter: std::env::var(EnvFilter::DEFAULT_ENV)
                .ok()
                .filter(|directives| !directives.trim().is_empty()),
            file: config.log_file.clone(),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        let directives = self.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directives).map_err(|error| LoggingError::Filter {
            directives: directives.to_string(),
            message: error.to_string(),
        })
    }
}

/// Install the global subscriber described by `settings`.
///
/// The file writer's guard is kept for the life of the process so buffered events are flushed
/// on exit.
pub fn init_tracing(settings: &LogSettings) -> Result<(), LoggingError> {
    let (dispatch, guard) = build_dispatch(settings)?;
    dispatch.try_init()?;
    if let Some(guard) = guard {
        let _ = FILE_GUARD.set(guard);
    }
    Ok(())
}

fn build_dispatch(settings: &LogSettings) -> Result<(Dispatch, Option<WorkerGuard>), LoggingError> {
    let filter = settings.env_filter()?;
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    let (file_layer, guard) = match &settings.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_append(path)?);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer);
    Ok((Dispatch::new(subscriber), guard))
}

fn open_append(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_layer_appends_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("papersum.log");
        std::fs::write(&path, "earlier run\n").expect("seed log");

        let settings = LogSettings {
            filter: Some("debug".into()),
            file: Some(path.clone()),
        };
        let (dispatch, guard) = build_dispatch(&settings).expect("subscriber");
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!(pages = 3, "rendered document");
        });
        drop(guard);

        let written = std::fs::read_to_string(&path).expect("log contents");
        assert!(written.starts_with("earlier run\n"));
        assert!(written.contains("rendered document"));
        assert!(written.contains("pages=3"));
    }

    #[test]
    fn filter_defaults_to_info() {
        let filter = LogSettings::default().env_filter().expect("filter");
        assert!(filter.to_string().contains(DEFAULT_FILTER));
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let settings = LogSettings {
            filter: None,
            file: Some(PathBuf::from("/definitely/not/a/dir/papersum.log")),
        };
        let error = build_dispatch(&settings).err().expect("log file error");
        assert!(matches!(error, LoggingError::LogFile { path, .. } if path.ends_with("papersum.log")));
    }
}
