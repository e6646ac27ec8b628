// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cgroup-v2 primitive: create a group, apply limits, attach children.
//!
//! Handles are shared via `Arc`; dropping the last holder removes the
//! group directory (best-effort: the kernel refuses while members remain).

use std::io;
use std::path::{Path, PathBuf};

use wm_core::CgroupPolicy;

/// Scheduling period for the cpu controller, in microseconds.
const CPU_PERIOD_USEC: u64 = 100_000;

#[derive(Debug)]
pub struct Cgroup {
    path: PathBuf,
}

impl Cgroup {
    /// Create (or reuse) the group `name` under `root`.
    pub fn create(root: &Path, name: &str) -> io::Result<Self> {
        let path = root.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cap cpu usage at `rate` percent of one CPU. Zero leaves the
    /// controller untouched.
    pub fn apply_cpu(&self, rate: u32) -> io::Result<()> {
        if rate == 0 {
            return Ok(());
        }
        let quota = CPU_PERIOD_USEC * u64::from(rate) / 100;
        std::fs::write(
            self.path.join("cpu.max"),
            format!("{quota} {CPU_PERIOD_USEC}\n"),
        )
    }

    /// Cap memory at `limit` bytes. Zero leaves the controller untouched.
    pub fn apply_memory(&self, limit: u64) -> io::Result<()> {
        if limit == 0 {
            return Ok(());
        }
        std::fs::write(self.path.join("memory.max"), format!("{limit}\n"))
    }

    pub fn apply(&self, policy: &CgroupPolicy) -> io::Result<()> {
        self.apply_cpu(policy.cpu_rate)?;
        self.apply_memory(policy.memory_limit)
    }

    /// Move `pid` into this group.
    pub fn attach(&self, pid: u32) -> io::Result<()> {
        use std::io::Write;
        let mut procs = std::fs::File::options()
            .append(true)
            .open(self.path.join("cgroup.procs"))?;
        writeln!(procs, "{pid}")
    }
}

impl Drop for Cgroup {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir(&self.path);
    }
}

#[cfg(test)]
#[path = "cgroup_tests.rs"]
mod tests;
