// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: bootstrap (PID lock, daemonization, signal mask),
//! the running supervisor state, and graceful shutdown.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};
use nix::sys::stat::{umask, Mode};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};
use wm_core::{Event, ManagerConfig};

use crate::config_store::{ApplyOutcome, ConfigStore};
use crate::control::{ControlClient, ControlDeps};
use crate::event_bus::{EventBus, EventReader};
use crate::http::HttpServer;
use crate::logging::LogHandle;
use crate::supervisor::{ProcessTable, Reconciler};

/// Fixed PID file name, created in the startup working directory.
pub const PID_FILE: &str = "watchermen.pid";

/// How long shutdown waits for signaled children to be reaped.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Config(#[from] wm_core::ConfigError),

    #[error("pid file is locked by another instance")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to daemonize: {0}")]
    Daemonize(nix::Error),

    #[error("failed to adjust signal mask: {0}")]
    Signal(nix::Error),

    #[error(transparent)]
    Logging(#[from] crate::logging::LoggingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Create and exclusively lock the PID file. A second instance fails fast.
///
/// The file is opened without truncation so a losing contender does not
/// wipe the winner's recorded pid; truncation happens once the lock is held.
pub fn create_pid_file(path: &Path) -> Result<File, LifecycleError> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    let mut file = file;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

/// Detach from the controlling terminal: new session via `daemon(3)`,
/// permissive umask. Stdio stays open until [`redirect_stdio`] runs so the
/// PID file can still report errors to the invoking shell.
pub fn daemonize() -> Result<(), LifecycleError> {
    nix::unistd::daemon(true, true).map_err(LifecycleError::Daemonize)?;
    umask(Mode::empty());
    Ok(())
}

/// Point stdout at `./stdout.log`, stderr at `./stderr.log`, stdin at
/// `/dev/null`. Runs in the detached child, before chdir to `/`.
pub fn redirect_stdio() -> Result<(), LifecycleError> {
    use std::os::unix::io::AsRawFd;

    let stdout_log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("./stdout.log")?;
    let stderr_log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("./stderr.log")?;
    let dev_null = File::open("/dev/null")?;

    nix::unistd::dup2(stdout_log.as_raw_fd(), std::io::stdout().as_raw_fd())
        .map_err(LifecycleError::Daemonize)?;
    nix::unistd::dup2(stderr_log.as_raw_fd(), std::io::stderr().as_raw_fd())
        .map_err(LifecycleError::Daemonize)?;
    nix::unistd::dup2(dev_null.as_raw_fd(), std::io::stdin().as_raw_fd())
        .map_err(LifecycleError::Daemonize)?;
    Ok(())
}

/// Remove the signals children are expected to receive from the blocked
/// set, so a mask inherited from the invoking environment does not leak
/// into every child.
pub fn unblock_child_signals() -> Result<(), LifecycleError> {
    let mut set = SigSet::empty();
    for signal in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGUSR1,
        Signal::SIGUSR2,
    ] {
        set.add(signal);
    }
    sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&set), None).map_err(LifecycleError::Signal)
}

pub struct StartupArgs {
    pub config_path: PathBuf,
    pub initial: ManagerConfig,
    pub lock_file: File,
    pub pid_path: PathBuf,
    pub log: LogHandle,
    pub bus: EventBus,
    pub control_enabled: bool,
}

/// The running supervisor: every mutable piece the loop owns.
pub struct DaemonState {
    pub config: Arc<ConfigStore>,
    pub reconciler: Reconciler,
    pub client: Option<ControlClient>,
    pub http: HttpServer,
    // NOTE(lifetime): Held to maintain the exclusive pid lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pid_path: PathBuf,
}

/// Bring the supervisor up: start the pool, bind introspection, and kick
/// off the control client when enabled and configured.
pub async fn startup(args: StartupArgs) -> Result<DaemonState, LifecycleError> {
    let config = Arc::new(ConfigStore::new(args.config_path, args.initial, args.log));
    let table = Arc::new(Mutex::new(ProcessTable::new()));
    let reconciler = Reconciler::new(
        Arc::clone(&config),
        Arc::clone(&table),
        args.bus.clone(),
        crate::env::cgroup_root(),
    );

    reconciler.start_all();

    let mut http = HttpServer::new(table);
    let http_config = config.snapshot().http_server;
    if let Err(e) = http.start(&http_config).await {
        error!("http introspection unavailable: {e}");
    }

    let client = if !args.control_enabled {
        info!("control-plane client disabled by flag");
        None
    } else {
        match config.server_address() {
            Some(address) => {
                let mut client =
                    ControlClient::new(address, &config.snapshot(), args.bus.clone());
                let deps = ControlDeps {
                    config: config.as_ref(),
                    reconciler: &reconciler,
                };
                client.start(&deps);
                Some(client)
            }
            None => {
                error!("no control-plane address configured, running standalone");
                None
            }
        }
    };

    info!("supervisor started");
    Ok(DaemonState {
        config,
        reconciler,
        client,
        http,
        lock_file: args.lock_file,
        pid_path: args.pid_path,
    })
}

impl DaemonState {
    /// Handle one loop event to completion before the next is picked up.
    pub async fn process_event(&mut self, event: Event) {
        match event {
            Event::ConfigFileChanged => {
                info!("local configuration changed, reloading");
                match self.config.reload_from_file() {
                    Ok(outcome) => self.apply_outcome(outcome).await,
                    Err(e) => error!("reload failed, keeping previous configuration: {e}"),
                }
            }

            Event::ProcessExited { name, pid, code } => {
                self.reconciler.on_process_exited(&name, pid, code);
            }

            Event::RegisterCompleted { result } => {
                let deps = ControlDeps {
                    config: self.config.as_ref(),
                    reconciler: &self.reconciler,
                };
                if let Some(client) = self.client.as_mut() {
                    client.on_register_completed(result, &deps);
                }
            }

            Event::HeartbeatCompleted { result } => {
                let deps = ControlDeps {
                    config: self.config.as_ref(),
                    reconciler: &self.reconciler,
                };
                if let Some(client) = self.client.as_mut() {
                    client.on_heartbeat_completed(result, &deps);
                }
            }

            Event::GetConfigCompleted { result } => {
                let outcome = {
                    let deps = ControlDeps {
                        config: self.config.as_ref(),
                        reconciler: &self.reconciler,
                    };
                    self.client
                        .as_mut()
                        .and_then(|client| client.on_get_config_completed(result, &deps))
                };
                if let Some(outcome) = outcome {
                    self.apply_outcome(outcome).await;
                }
            }

            Event::OperateCommand {
                generation,
                message,
            } => {
                let deps = ControlDeps {
                    config: self.config.as_ref(),
                    reconciler: &self.reconciler,
                };
                if let Some(client) = self.client.as_mut() {
                    client.on_operate_command(generation, message, &deps);
                }
            }

            Event::OperateClosed { generation } => {
                let deps = ControlDeps {
                    config: self.config.as_ref(),
                    reconciler: &self.reconciler,
                };
                if let Some(client) = self.client.as_mut() {
                    client.on_operate_closed(generation, &deps);
                }
            }
        }
    }

    /// Poll the client's timers.
    pub fn tick(&mut self, now: Instant) {
        let Some(client) = self.client.as_mut() else {
            return;
        };
        let deps = ControlDeps {
            config: self.config.as_ref(),
            reconciler: &self.reconciler,
        };
        for id in client.fired_timers(now) {
            client.on_timer(id, &deps);
        }
    }

    /// Apply a configuration outcome to the pool and the HTTP server.
    pub async fn apply_outcome(&mut self, outcome: ApplyOutcome) {
        if outcome.is_noop() {
            return;
        }

        if outcome.full_restart {
            info!("global cgroup policy changed, restarting process pool");
            self.reconciler.restart_all();
        } else {
            if !outcome.removed.is_empty() {
                self.reconciler.apply_remove(&outcome.removed);
            }
            if !outcome.added.is_empty() {
                self.reconciler.apply_add(&outcome.added);
            }
        }

        if outcome.http_restart {
            let http_config = self.config.snapshot().http_server;
            if let Err(e) = self.http.restart(&http_config).await {
                error!("http restart failed: {e}");
            }
        }
    }

    /// Graceful shutdown: unregister, stop introspection, stop children and
    /// drain their exits for a bounded time, then drop the PID file.
    pub async fn shutdown(&mut self, reader: &mut EventReader) {
        info!("shutting down");

        if let Some(client) = self.client.as_mut() {
            client.shutdown().await;
        }

        self.http.stop().await;

        self.reconciler.stop_all();
        let deadline = Instant::now() + SHUTDOWN_DRAIN;
        while self.reconciler.has_live_children() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("children did not exit in time, abandoning them");
                break;
            }
            match tokio::time::timeout(remaining, reader.recv()).await {
                Ok(Some(Event::ProcessExited { name, pid, code })) => {
                    self.reconciler.on_process_exited(&name, pid, code);
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }

        if let Err(e) = std::fs::remove_file(&self.pid_path) {
            warn!("failed to remove pid file: {e}");
        }
        info!("supervisor shutdown complete");
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
