// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live process table: name -> instance, unique on name.
//!
//! The table is shared behind a mutex so the HTTP handlers can take read
//! snapshots, but the supervisor loop is the sole mutator.

use std::collections::BTreeMap;
use std::sync::Arc;

use wm_core::{HeartbeatProcess, ProcessConfig, ProcessStatus};

use super::cgroup::Cgroup;

/// One supervised child as it currently exists.
pub struct ProcessInstance {
    pub name: String,
    /// Desired configuration; replaced in place on reload.
    pub config: ProcessConfig,
    pub pid: Option<u32>,
    pub status: ProcessStatus,
    /// Unix seconds of the last successful spawn, 0 when it never ran.
    pub start_time: i64,
    /// Resolved cgroup, released when the instance is destroyed.
    pub cgroup: Option<Arc<Cgroup>>,
}

impl ProcessInstance {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            name: config.process_name.clone(),
            config,
            pid: None,
            status: ProcessStatus::Unknown,
            start_time: 0,
            cgroup: None,
        }
    }
}

#[derive(Default)]
pub struct ProcessTable {
    instances: BTreeMap<String, ProcessInstance>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ProcessInstance> {
        self.instances.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProcessInstance> {
        self.instances.get_mut(name)
    }

    /// Install an instance, replacing any previous holder of the name.
    pub fn insert(&mut self, instance: ProcessInstance) {
        self.instances.insert(instance.name.clone(), instance);
    }

    pub fn remove(&mut self, name: &str) -> Option<ProcessInstance> {
        self.instances.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.instances.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessInstance> {
        self.instances.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ProcessInstance> {
        self.instances.values_mut()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Entries for the next heartbeat; `Unknown` instances are omitted.
    pub fn heartbeat_snapshot(&self) -> Vec<HeartbeatProcess> {
        self.instances
            .values()
            .filter_map(|instance| {
                instance.status.heartbeat_state().map(|state| HeartbeatProcess {
                    name: instance.name.clone(),
                    state,
                    start_time: instance.start_time,
                })
            })
            .collect()
    }

    /// Whether any instance still has a child to reap.
    pub fn has_live_children(&self) -> bool {
        self.instances
            .values()
            .any(|instance| instance.status.has_live_child() && instance.pid.is_some())
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
