// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! watchermen: host-local process supervisor.
//!
//! Launches the configured process pool, keeps it reconciled with the
//! local configuration file and the remote control plane, and exposes a
//! small introspection HTTP surface.
//!
//! Architecture:
//! - Supervisor loop: single task processing events sequentially from the
//!   event bus; sole mutator of the process table and client state
//! - Off-loop work (file watcher, per-child wait tasks, RPC completions)
//!   communicates with the loop only through the bus

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config_store;
mod control;
mod env;
mod event_bus;
mod http;
mod lifecycle;
mod logging;
mod netif;
mod supervisor;
mod watcher;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use wm_core::ManagerConfig;

use crate::event_bus::EventBus;
use crate::lifecycle::LifecycleError;
use crate::logging::LogHandle;

#[derive(Parser)]
#[command(name = "watchermen", disable_version_flag = true)]
struct Flags {
    /// Path to the configuration file
    #[arg(short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Echo a command and exit (diagnostic)
    #[arg(short = 'e', value_name = "CMD")]
    execute: Option<String>,

    /// Pass "no" to run without the control-plane client
    #[arg(short = 'n', value_name = "VALUE")]
    network: Option<String>,

    /// Print version information and exit
    #[arg(short = 'v')]
    version: bool,
}

fn main() {
    let flags = Flags::parse();

    if flags.version {
        println!(
            "version: {}, build: {}, {} version",
            env!("CARGO_PKG_VERSION"),
            env!("BUILD_GIT_HASH"),
            env!("BUILD_TYPE"),
        );
        return;
    }

    if let Some(command) = flags.execute.as_deref() {
        println!("Execute command: {command}");
        return;
    }

    let Some(config_path) = flags.config else {
        eprintln!("the configuration file cannot be empty");
        std::process::exit(1);
    };
    let control_enabled = flags.network.as_deref() != Some("no");

    match bootstrap(&config_path, control_enabled) {
        Ok(()) => {}
        Err(LifecycleError::LockFailed(_)) => {
            // another instance holds the lock; report it like a human would
            // want to read it instead of a raw debug error
            let pid = std::fs::read_to_string(lifecycle::PID_FILE)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("watchermen is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("failed to start watchermen: {e}");
            std::process::exit(1);
        }
    }
}

/// Synchronous bootstrap: everything that must happen before the async
/// runtime exists, daemonization in particular.
fn bootstrap(config_path: &Path, control_enabled: bool) -> Result<(), LifecycleError> {
    // resolve before any chdir
    let config_path = std::fs::canonicalize(config_path)?;
    let initial = config_store::read_config(&config_path)?;

    if initial.daemon {
        lifecycle::daemonize()?;
    }

    let pid_path = std::env::current_dir()?.join(lifecycle::PID_FILE);
    let lock_file = lifecycle::create_pid_file(&pid_path)?;

    if initial.daemon {
        lifecycle::redirect_stdio()?;
        std::env::set_current_dir("/")?;
    }

    let (log, _log_guard) = logging::init(&initial.log_level, &initial.log_path)?;
    lifecycle::unblock_child_signals()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(
        config_path,
        initial,
        lock_file,
        pid_path,
        log,
        control_enabled,
    ))
}

async fn run(
    config_path: PathBuf,
    initial: ManagerConfig,
    lock_file: File,
    pid_path: PathBuf,
    log: LogHandle,
    control_enabled: bool,
) -> Result<(), LifecycleError> {
    let (bus, mut reader) = EventBus::new();

    let mut daemon = lifecycle::startup(lifecycle::StartupArgs {
        config_path: config_path.clone(),
        initial,
        lock_file,
        pid_path,
        log,
        bus: bus.clone(),
        control_enabled,
    })
    .await?;

    let _watcher = match watcher::watch(&config_path, bus) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            error!("config watcher unavailable, file edits need a restart: {e}");
            None
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    // NOTE: created outside the loop - select! re-evaluates branches on
    // each iteration, so a sleep() inside would reset on every event
    let mut timer_check = tokio::time::interval(env::timer_check_interval());

    info!("watchermen ready");

    loop {
        tokio::select! {
            maybe_event = reader.recv() => match maybe_event {
                Some(event) => daemon.process_event(event).await,
                None => {
                    info!("event bus closed, shutting down");
                    break;
                }
            },

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }

            _ = timer_check.tick() => daemon.tick(Instant::now()),
        }
    }

    daemon.shutdown(&mut reader).await;
    info!("watchermen stopped");
    Ok(())
}
