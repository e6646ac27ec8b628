// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

/// Timer poll interval: `WM_TIMER_CHECK_MS` override, default 1 second.
pub fn timer_check_interval() -> Duration {
    std::env::var("WM_TIMER_CHECK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

/// Cgroup filesystem root: `WM_CGROUP_ROOT` override (used by tests),
/// default the v2 unified hierarchy mount.
pub fn cgroup_root() -> PathBuf {
    std::env::var("WM_CGROUP_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/sys/fs/cgroup"))
}
