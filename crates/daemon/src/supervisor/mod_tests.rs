// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use std::time::Duration;

use tokio::time::timeout;
use wm_core::ManagerConfig;

use crate::config_store::ConfigStore;
use crate::event_bus::EventReader;
use crate::logging::LogHandle;

fn svc(name: &str, command: &str) -> ProcessConfig {
    ProcessConfig {
        process_name: name.to_string(),
        command: command.to_string(),
        ..Default::default()
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    config: Arc<ConfigStore>,
    table: Arc<Mutex<ProcessTable>>,
    reconciler: Reconciler,
    reader: EventReader,
}

fn harness(config: ManagerConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watchermen.json");
    std::fs::write(&path, config.serialize().unwrap()).unwrap();

    let store = Arc::new(ConfigStore::new(path, config, LogHandle::noop()));
    let table = Arc::new(Mutex::new(ProcessTable::new()));
    let (bus, reader) = EventBus::new();
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&table),
        bus,
        dir.path().join("cgroup"),
    );

    Harness {
        _dir: dir,
        config: store,
        table,
        reconciler,
        reader,
    }
}

impl Harness {
    fn status(&self, name: &str) -> Option<ProcessStatus> {
        self.table.lock().get(name).map(|i| i.status)
    }

    fn pid(&self, name: &str) -> Option<u32> {
        self.table.lock().get(name).and_then(|i| i.pid)
    }

    /// Route exit events through the reconciler until `name` is reaped.
    async fn settle_exit(&mut self, name: &str) {
        self.settle_exits(&[name]).await;
    }

    /// Route exit events through the reconciler until every named process
    /// has been reaped, in whatever order the children die.
    async fn settle_exits(&mut self, names: &[&str]) {
        let mut remaining: std::collections::BTreeSet<&str> = names.iter().copied().collect();
        while !remaining.is_empty() {
            let event = timeout(Duration::from_secs(5), self.reader.recv())
                .await
                .expect("no exit event within 5s")
                .expect("bus closed");
            let Event::ProcessExited {
                name: exited,
                pid,
                code,
            } = event
            else {
                continue;
            };
            self.reconciler.on_process_exited(&exited, pid, code);
            remaining.remove(exited.as_str());
        }
    }
}

#[tokio::test]
async fn cold_start_tracks_fast_exit_and_long_runner() {
    let mut h = harness(ManagerConfig {
        service: vec![svc("a", "/bin/true"), svc("b", "sleep 3600")],
        ..Default::default()
    });

    h.reconciler.start_all();
    assert_eq!(h.status("a"), Some(ProcessStatus::Running));
    assert_eq!(h.status("b"), Some(ProcessStatus::Running));

    h.settle_exit("a").await;
    assert_eq!(h.status("a"), Some(ProcessStatus::Exited));
    assert_eq!(h.status("b"), Some(ProcessStatus::Running));
    assert!(h.pid("b").is_some());

    h.reconciler.stop_all();
    assert_eq!(h.status("b"), Some(ProcessStatus::Stopping));
    h.settle_exit("b").await;
    assert_eq!(h.status("b"), Some(ProcessStatus::Stopped));
}

#[tokio::test]
async fn add_then_remove_leaves_unchanged_service_untouched() {
    let mut h = harness(ManagerConfig {
        service: vec![svc("a", "sleep 3600")],
        ..Default::default()
    });
    h.reconciler.start_all();
    let pid_a = h.pid("a").expect("a running");

    h.reconciler
        .apply_add(&service_map(&[svc("b", "sleep 3600")]));
    assert_eq!(h.pid("a"), Some(pid_a), "untouched service keeps its pid");
    assert_eq!(h.status("b"), Some(ProcessStatus::Running));
    let pid_b = h.pid("b").expect("b running");

    h.reconciler
        .apply_remove(&service_map(&[svc("a", "sleep 3600")]));
    assert_eq!(h.status("a"), Some(ProcessStatus::Deleting));
    h.settle_exit("a").await;
    assert!(h.status("a").is_none(), "deleted instance leaves the table");
    assert_eq!(h.pid("b"), Some(pid_b));

    h.reconciler.stop_all();
    h.settle_exit("b").await;
}

#[tokio::test]
async fn changed_command_reloads_in_place() {
    let mut h = harness(ManagerConfig {
        service: vec![svc("a", "sleep 3600")],
        ..Default::default()
    });
    h.reconciler.start_all();
    let old_pid = h.pid("a").expect("a running");

    h.reconciler
        .apply_add(&service_map(&[svc("a", "sleep 1800")]));
    assert_eq!(h.status("a"), Some(ProcessStatus::Reloading));

    h.settle_exit("a").await;
    assert_eq!(h.status("a"), Some(ProcessStatus::Running));
    let new_pid = h.pid("a").expect("a respawned");
    assert_ne!(new_pid, old_pid);
    assert_eq!(
        h.table.lock().get("a").map(|i| i.config.command.clone()),
        Some("sleep 1800".to_string())
    );

    h.reconciler.stop_all();
    h.settle_exit("a").await;
}

#[tokio::test]
async fn global_cgroup_change_restarts_every_service() {
    let cgroup = CgroupPolicy {
        enabled: true,
        name: "pool".to_string(),
        cpu_rate: 50,
        ..Default::default()
    };
    let mut h = harness(ManagerConfig {
        cgroup: cgroup.clone(),
        service: vec![svc("a", "sleep 3600"), svc("b", "sleep 3600")],
        ..Default::default()
    });
    h.reconciler.start_all();
    let old_a = h.pid("a").expect("a running");
    let old_b = h.pid("b").expect("b running");

    let mut pushed = h.config.snapshot();
    pushed.cgroup.cpu_rate = 80;
    let outcome = h
        .config
        .on_server_config(&pushed.serialize().unwrap())
        .unwrap();
    assert!(outcome.full_restart);

    h.reconciler.restart_all();
    h.settle_exits(&["a", "b"]).await;

    assert_eq!(h.status("a"), Some(ProcessStatus::Running));
    assert_eq!(h.status("b"), Some(ProcessStatus::Running));
    assert_ne!(h.pid("a"), Some(old_a), "a restarted with a fresh pid");
    assert_ne!(h.pid("b"), Some(old_b), "b restarted with a fresh pid");

    let cpu_max = h._dir.path().join("cgroup/pool/cpu.max");
    assert_eq!(
        std::fs::read_to_string(cpu_max).unwrap(),
        "80000 100000\n",
        "new limits written to the recreated group"
    );

    h.reconciler.stop_all();
    h.settle_exits(&["a", "b"]).await;
}

#[tokio::test]
async fn operator_start_and_stop_by_name() {
    let mut h = harness(ManagerConfig {
        service: vec![svc("c", "sleep 3600")],
        ..Default::default()
    });

    // configured but not yet in the table
    h.reconciler.start_one("c");
    assert_eq!(h.status("c"), Some(ProcessStatus::Running));

    // already running: coalesced
    let pid = h.pid("c");
    h.reconciler.start_one("c");
    assert_eq!(h.pid("c"), pid);

    h.reconciler.stop_one("c");
    h.settle_exit("c").await;
    assert_eq!(h.status("c"), Some(ProcessStatus::Stopped));

    // stopped instances restart on demand
    h.reconciler.start_one("c");
    assert_eq!(h.status("c"), Some(ProcessStatus::Running));
    h.reconciler.stop_one("c");
    h.settle_exit("c").await;
}

#[tokio::test]
async fn start_one_ignores_unknown_names() {
    let h = harness(ManagerConfig::default());
    h.reconciler.start_one("ghost");
    assert!(h.table.lock().is_empty());
}

#[tokio::test]
async fn failed_command_marks_instance_exited() {
    let mut h = harness(ManagerConfig {
        service: vec![svc("bad", "exec /nonexistent-binary-for-test")],
        ..Default::default()
    });
    h.reconciler.start_all();
    h.settle_exit("bad").await;

    assert_eq!(h.status("bad"), Some(ProcessStatus::Exited));
    let snapshot = h.reconciler.heartbeat_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, wm_core::HeartbeatState::Stopped);
}

#[tokio::test]
async fn stale_exit_events_are_ignored() {
    let mut h = harness(ManagerConfig {
        service: vec![svc("a", "sleep 3600")],
        ..Default::default()
    });
    h.reconciler.start_all();
    let pid = h.pid("a").expect("running");

    // an exit for a pid the table no longer tracks must not disturb state
    h.reconciler.on_process_exited("a", pid + 1, Some(0));
    assert_eq!(h.status("a"), Some(ProcessStatus::Running));
    assert_eq!(h.pid("a"), Some(pid));

    h.reconciler.stop_all();
    h.settle_exit("a").await;
}
