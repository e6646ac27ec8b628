// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use wm_core::ProcessConfig;

fn svc(name: &str, command: &str) -> ProcessConfig {
    ProcessConfig {
        process_name: name.to_string(),
        command: command.to_string(),
        ..Default::default()
    }
}

#[test]
fn pid_file_records_this_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(PID_FILE);

    let _lock = create_pid_file(&path).unwrap();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        format!("{}\n", std::process::id())
    );
}

#[test]
fn second_instance_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(PID_FILE);

    let first = create_pid_file(&path).unwrap();
    assert!(matches!(
        create_pid_file(&path),
        Err(LifecycleError::LockFailed(_))
    ));

    // the losing contender must not wipe the winner's pid
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        format!("{}\n", std::process::id())
    );

    drop(first);
    assert!(create_pid_file(&path).is_ok(), "lock released on drop");
}

#[test]
fn unblocking_child_signals_succeeds() {
    unblock_child_signals().unwrap();
}

async fn startup_in(dir: &Path, config: ManagerConfig, bus: EventBus) -> DaemonState {
    let config_path = dir.join("watchermen.json");
    std::fs::write(&config_path, config.serialize().unwrap()).unwrap();
    let pid_path = dir.join(PID_FILE);
    let lock_file = create_pid_file(&pid_path).unwrap();

    startup(StartupArgs {
        config_path,
        initial: config,
        lock_file,
        pid_path,
        log: LogHandle::noop(),
        bus,
        control_enabled: false,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn startup_launches_pool_and_shutdown_reaps_it() {
    let dir = tempfile::tempdir().unwrap();
    let (bus, mut reader) = EventBus::new();

    let mut daemon = startup_in(
        dir.path(),
        ManagerConfig {
            service: vec![svc("a", "sleep 3600")],
            ..Default::default()
        },
        bus,
    )
    .await;

    assert_eq!(daemon.reconciler.heartbeat_snapshot().len(), 1);
    assert!(daemon.client.is_none(), "client disabled by flag");

    daemon.shutdown(&mut reader).await;
    assert!(!daemon.reconciler.has_live_children());
    assert!(!dir.path().join(PID_FILE).exists(), "pid file removed");
}

#[tokio::test]
async fn config_file_change_event_reconciles_pool() {
    let dir = tempfile::tempdir().unwrap();
    let (bus, mut reader) = EventBus::new();

    let mut daemon = startup_in(
        dir.path(),
        ManagerConfig {
            service: vec![svc("a", "sleep 3600")],
            ..Default::default()
        },
        bus,
    )
    .await;

    let updated = ManagerConfig {
        service: vec![svc("a", "sleep 3600"), svc("b", "sleep 3600")],
        ..Default::default()
    };
    std::fs::write(daemon.config.path(), updated.serialize().unwrap()).unwrap();

    daemon.process_event(Event::ConfigFileChanged).await;
    assert_eq!(daemon.reconciler.heartbeat_snapshot().len(), 2);

    daemon.shutdown(&mut reader).await;
}
