// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process pool reconciliation: diffs from the config store become
//! start/stop/reload work against the live table.
//!
//! All methods are invoked from the supervisor loop; the table mutex exists
//! only so HTTP handlers can take read snapshots. Children are `sh -c`
//! processes; each spawn hands the child to a wait task that posts
//! `ProcessExited` back to the loop, which routes it through
//! `on_process_exited` for the status-dependent transition (stop, delete,
//! reload-respawn, or unexpected-exit marking).

mod cgroup;
mod table;

pub use cgroup::Cgroup;
pub use table::{ProcessInstance, ProcessTable};

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use wm_core::{
    service_map, CgroupPolicy, Event, HeartbeatProcess, ProcessConfig, ProcessStatus, ServiceMap,
};

use crate::config_store::ConfigStore;
use crate::event_bus::EventBus;

pub struct Reconciler {
    config: Arc<ConfigStore>,
    table: Arc<Mutex<ProcessTable>>,
    bus: EventBus,
    cgroup_root: PathBuf,
    /// Shared cgroup for the currently active global policy.
    global_cgroup: Mutex<Option<(CgroupPolicy, Arc<Cgroup>)>>,
}

impl Reconciler {
    pub fn new(
        config: Arc<ConfigStore>,
        table: Arc<Mutex<ProcessTable>>,
        bus: EventBus,
        cgroup_root: PathBuf,
    ) -> Self {
        Self {
            config,
            table,
            bus,
            cgroup_root,
            global_cgroup: Mutex::new(None),
        }
    }

    /// Start every configured service. Used at boot, on an empty table.
    pub fn start_all(&self) {
        let config = self.config.snapshot();
        self.refresh_global_cgroup(&config.cgroup);

        let mut table = self.table.lock();
        for service in &config.service {
            if !service.is_diffable() {
                continue;
            }
            table.insert(self.spawn(service.clone(), &config.cgroup));
        }
        info!(count = table.len(), "process pool started");
    }

    /// Signal every live child to stop.
    pub fn stop_all(&self) {
        let mut table = self.table.lock();
        for instance in table.iter_mut() {
            if instance.status.has_live_child() {
                Self::transition_and_signal(instance, ProcessStatus::Stopping);
            }
        }
    }

    /// The global cgroup policy changed: every service restarts.
    ///
    /// Instances absent from the new list are deleted; everything in the
    /// list goes through the reload path so each child comes back with a
    /// fresh pid under the new policy.
    pub fn restart_all(&self) {
        let config = self.config.snapshot();
        *self.global_cgroup.lock() = None;
        self.refresh_global_cgroup(&config.cgroup);

        let desired = service_map(&config.service);
        let absent: Vec<String> = {
            let table = self.table.lock();
            table
                .names()
                .filter(|name| !desired.contains_key(*name))
                .cloned()
                .collect()
        };
        self.remove_names(&absent);
        self.apply_add(&desired);
    }

    /// Start new services and reload changed ones.
    pub fn apply_add(&self, services: &ServiceMap) {
        let config = self.config.snapshot();
        self.refresh_global_cgroup(&config.cgroup);

        let mut table = self.table.lock();
        for (name, service) in services {
            let live = match table.get_mut(name) {
                Some(instance) if instance.status.has_live_child() => {
                    // reload: adopt the new config now, respawn on reap
                    instance.config = service.clone();
                    instance.status = ProcessStatus::Reload;
                    Self::transition_and_signal(instance, ProcessStatus::Reloading);
                    true
                }
                _ => false,
            };
            if !live {
                table.insert(self.spawn(service.clone(), &config.cgroup));
            }
        }
    }

    /// Stop and remove the named services.
    pub fn apply_remove(&self, services: &ServiceMap) {
        let names: Vec<String> = services.keys().cloned().collect();
        self.remove_names(&names);
    }

    fn remove_names(&self, names: &[String]) {
        let mut table = self.table.lock();
        for name in names {
            let live = match table.get_mut(name) {
                None => continue,
                Some(instance) => {
                    if instance.status.has_live_child() && instance.pid.is_some() {
                        Self::transition_and_signal(instance, ProcessStatus::Deleting);
                        true
                    } else {
                        false
                    }
                }
            };
            if !live {
                table.remove(name);
                info!(process = %name, "removed");
            }
        }
    }

    /// Operator command: start one process by its configured name.
    pub fn start_one(&self, name: &str) {
        let config = self.config.snapshot();
        let Some(service) = config
            .service
            .iter()
            .find(|s| s.process_name == name && s.is_diffable())
        else {
            warn!(process = name, "not in configuration, ignoring start");
            return;
        };

        self.refresh_global_cgroup(&config.cgroup);
        let mut table = self.table.lock();
        if let Some(instance) = table.get(name) {
            if instance.status.has_live_child() {
                debug!(process = name, "already running");
                return;
            }
        }
        table.insert(self.spawn(service.clone(), &config.cgroup));
    }

    /// Operator command: stop one process.
    pub fn stop_one(&self, name: &str) {
        let mut table = self.table.lock();
        let Some(instance) = table.get_mut(name) else {
            warn!(process = name, "not running, ignoring stop");
            return;
        };
        if instance.status.has_live_child() && instance.pid.is_some() {
            Self::transition_and_signal(instance, ProcessStatus::Stopping);
        } else {
            instance.status = ProcessStatus::Stopped;
        }
    }

    /// A wait task reaped a child. Stale pids (the name was respawned
    /// under a newer child) are ignored.
    pub fn on_process_exited(&self, name: &str, pid: u32, code: Option<i32>) {
        let mut table = self.table.lock();

        let status = match table.get_mut(name) {
            None => return,
            Some(instance) => {
                if instance.pid != Some(pid) {
                    return;
                }
                instance.pid = None;
                instance.status
            }
        };

        match status {
            ProcessStatus::Stopping => {
                info!(process = name, code, "stopped");
                if let Some(instance) = table.get_mut(name) {
                    instance.status = ProcessStatus::Stopped;
                }
            }
            ProcessStatus::Deleting => {
                info!(process = name, code, "deleted");
                table.remove(name);
            }
            ProcessStatus::Reload | ProcessStatus::Reloading => {
                info!(process = name, "reloading");
                let config = self.config.snapshot();
                let service = match table.get(name) {
                    Some(instance) => instance.config.clone(),
                    None => return,
                };
                table.insert(self.spawn(service, &config.cgroup));
            }
            _ => {
                warn!(process = name, code, "exited unexpectedly");
                if let Some(instance) = table.get_mut(name) {
                    instance.status = ProcessStatus::Exited;
                }
            }
        }
    }

    pub fn heartbeat_snapshot(&self) -> Vec<HeartbeatProcess> {
        self.table.lock().heartbeat_snapshot()
    }

    pub fn has_live_children(&self) -> bool {
        self.table.lock().has_live_children()
    }

    /// (Re)activate the shared cgroup for the global policy, or drop it
    /// when the policy is disabled or unnamed.
    fn refresh_global_cgroup(&self, policy: &CgroupPolicy) {
        let mut slot = self.global_cgroup.lock();

        if !policy.is_shareable() {
            *slot = None;
            return;
        }
        if matches!(&*slot, Some((active, _)) if active == policy) {
            return;
        }

        match Cgroup::create(&self.cgroup_root, &policy.name) {
            Ok(cgroup) => {
                if let Err(e) = cgroup.apply(policy) {
                    warn!(cgroup = %policy.name, "limits not applied: {e}");
                }
                info!(cgroup = %policy.name, path = %cgroup.path().display(), "global cgroup active");
                *slot = Some((policy.clone(), Arc::new(cgroup)));
            }
            Err(e) => {
                warn!(cgroup = %policy.name, "unavailable, continuing without it: {e}");
                *slot = None;
            }
        }
    }

    /// Resolve the cgroup for one service: a per-process policy gets its
    /// own group (named after the global policy when that carries a name,
    /// else after the process); otherwise an active global policy is
    /// shared; otherwise none.
    fn resolve_cgroup(&self, service: &ProcessConfig, global: &CgroupPolicy) -> Option<Arc<Cgroup>> {
        if service.cgroup.enabled {
            let name = if !global.name.is_empty() {
                global.name.clone()
            } else {
                service.process_name.clone()
            };
            match Cgroup::create(&self.cgroup_root, &name) {
                Ok(cgroup) => {
                    if let Err(e) = cgroup.apply(&service.cgroup) {
                        warn!(process = %service.process_name, "cgroup limits not applied: {e}");
                    }
                    Some(Arc::new(cgroup))
                }
                Err(e) => {
                    warn!(
                        process = %service.process_name,
                        "cgroup unavailable, starting without it: {e}"
                    );
                    None
                }
            }
        } else if global.is_shareable() {
            self.global_cgroup
                .lock()
                .as_ref()
                .map(|(_, cgroup)| Arc::clone(cgroup))
        } else {
            None
        }
    }

    /// Spawn one child and hand it to a wait task. Failures surface as an
    /// `Exited` instance reported in the next heartbeat.
    fn spawn(&self, service: ProcessConfig, global: &CgroupPolicy) -> ProcessInstance {
        let cgroup = self.resolve_cgroup(&service, global);
        let mut instance = ProcessInstance::new(service);
        instance.cgroup = cgroup;

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&instance.config.command)
            .stdin(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(process = %instance.name, "failed to start: {e}");
                instance.status = ProcessStatus::Exited;
                return instance;
            }
        };

        let Some(pid) = child.id() else {
            error!(process = %instance.name, "child reaped before it was tracked");
            instance.status = ProcessStatus::Exited;
            return instance;
        };

        if let Some(cgroup) = &instance.cgroup {
            if let Err(e) = cgroup.attach(pid) {
                warn!(process = %instance.name, pid, "cgroup attach failed: {e}");
            }
        }

        instance.pid = Some(pid);
        instance.status = ProcessStatus::Running;
        instance.start_time = unix_now();
        info!(process = %instance.name, pid, "started");

        let name = instance.name.clone();
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(process = %name, "wait failed: {e}");
                    None
                }
            };
            bus.send(Event::ProcessExited { name, pid, code });
        });

        instance
    }

    fn transition_and_signal(instance: &mut ProcessInstance, status: ProcessStatus) {
        instance.status = status;
        let Some(pid) = instance.pid else { return };
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            // ESRCH means the wait task is already delivering the exit
            debug!(process = %instance.name, pid, "signal not delivered: {e}");
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
