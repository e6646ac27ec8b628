// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging setup with hot-swappable level and sink.
//!
//! The configuration may change `log_level` and `log_path` at runtime, so
//! the subscriber is built around a reloadable filter and a writer whose
//! target (stdout or a file) can be swapped without re-initializing
//! tracing.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file {0}: {1}")]
    OpenSink(String, io::Error),

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Handle for runtime logging reconfiguration. `noop` handles (tests) make
/// both operations do nothing.
#[derive(Clone)]
pub struct LogHandle {
    inner: Option<Inner>,
}

#[derive(Clone)]
struct Inner {
    filter: reload::Handle<EnvFilter, Registry>,
    target: SwapTarget,
}

impl LogHandle {
    /// Inert handle for tests and tooling paths that never log.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Swap the subscriber's level filter. Callers validate the level first;
    /// an unparseable level leaves the filter untouched.
    pub fn set_level(&self, level: &str) {
        let Some(inner) = &self.inner else { return };
        match level.parse::<EnvFilter>() {
            Ok(filter) => {
                if let Err(e) = inner.filter.reload(filter) {
                    error!("failed to update log level: {e}");
                }
            }
            Err(e) => error!("unusable log level {level:?}: {e}"),
        }
    }

    /// Redirect log output to `path` (append). The previous target keeps
    /// working if the file cannot be opened.
    pub fn set_path(&self, path: &str) {
        let Some(inner) = &self.inner else { return };
        match open_sink(Path::new(path)) {
            Ok(file) => {
                *inner.target.inner.write() = Target::File(file);
                info!(path, "log sink switched");
            }
            Err(e) => error!("failed to switch log sink to {path:?}: {e}"),
        }
    }
}

enum Target {
    Stdout,
    File(File),
}

/// `io::Write` whose destination can be swapped at runtime.
#[derive(Clone)]
struct SwapTarget {
    inner: Arc<RwLock<Target>>,
}

impl io::Write for SwapTarget {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &*self.inner.read() {
            Target::Stdout => io::stdout().lock().write(buf),
            Target::File(file) => {
                let mut file = file;
                file.write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &*self.inner.read() {
            Target::Stdout => io::stdout().lock().flush(),
            Target::File(file) => {
                let mut file = file;
                file.flush()
            }
        }
    }
}

fn open_sink(path: &Path) -> io::Result<File> {
    File::options().create(true).append(true).open(path)
}

/// Initialize tracing. Returns the reconfiguration handle and the guard for
/// the non-blocking writer; the guard must live for the whole process.
///
/// Target selection: a non-empty `log_path` other than `"stdout"` logs to
/// that file (rotated at startup when oversized); everything else logs to
/// stdout, which daemonization has already redirected to `./stdout.log`.
pub fn init(
    log_level: &str,
    log_path: &str,
) -> Result<(LogHandle, tracing_appender::non_blocking::WorkerGuard), LoggingError> {
    let target = if !log_path.is_empty() && log_path != "stdout" {
        rotate_log_if_needed(Path::new(log_path));
        let file = open_sink(Path::new(log_path))
            .map_err(|e| LoggingError::OpenSink(log_path.to_string(), e))?;
        Target::File(file)
    } else {
        Target::Stdout
    };
    let target = SwapTarget {
        inner: Arc::new(RwLock::new(target)),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(target.clone());

    let level = if log_level.is_empty() { "info" } else { log_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (filter_layer, filter_handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok((
        LogHandle {
            inner: Some(Inner {
                filter: filter_handle,
                target,
            }),
        },
        guard,
    ))
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Shift `<log>` -> `<log>.1` -> `<log>.2` -> `<log>.3` when the current
/// file exceeds [`MAX_LOG_SIZE`], deleting the oldest. Best-effort.
fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
