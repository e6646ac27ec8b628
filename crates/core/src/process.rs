// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised-process status model.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a supervised process.
///
/// Numeric codes are stable: they appear in the `/process/list` HTTP
/// response and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    Unknown,
    Run,
    Running,
    Stopped,
    Stopping,
    Reload,
    Reloading,
    Exited,
    Deleting,
    Deleted,
}

impl ProcessStatus {
    pub const ALL: [ProcessStatus; 10] = [
        ProcessStatus::Unknown,
        ProcessStatus::Run,
        ProcessStatus::Running,
        ProcessStatus::Stopped,
        ProcessStatus::Stopping,
        ProcessStatus::Reload,
        ProcessStatus::Reloading,
        ProcessStatus::Exited,
        ProcessStatus::Deleting,
        ProcessStatus::Deleted,
    ];

    pub fn code(self) -> u8 {
        match self {
            ProcessStatus::Unknown => 0,
            ProcessStatus::Run => 1,
            ProcessStatus::Running => 2,
            ProcessStatus::Stopped => 3,
            ProcessStatus::Stopping => 4,
            ProcessStatus::Reload => 5,
            ProcessStatus::Reloading => 6,
            ProcessStatus::Exited => 7,
            ProcessStatus::Deleting => 8,
            ProcessStatus::Deleted => 9,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProcessStatus::Unknown => "UNKNOWN",
            ProcessStatus::Run => "RUN",
            ProcessStatus::Running => "RUNNING",
            ProcessStatus::Stopped => "STOPPED",
            ProcessStatus::Stopping => "STOPPING",
            ProcessStatus::Reload => "RELOAD",
            ProcessStatus::Reloading => "RELOADING",
            ProcessStatus::Exited => "EXITED",
            ProcessStatus::Deleting => "DELETING",
            ProcessStatus::Deleted => "DELETED",
        }
    }

    /// How this status reports in a heartbeat. `Unknown` is omitted.
    pub fn heartbeat_state(self) -> Option<HeartbeatState> {
        match self {
            ProcessStatus::Unknown => None,
            ProcessStatus::Run
            | ProcessStatus::Running
            | ProcessStatus::Reload
            | ProcessStatus::Reloading => Some(HeartbeatState::Running),
            ProcessStatus::Stopped
            | ProcessStatus::Stopping
            | ProcessStatus::Exited
            | ProcessStatus::Deleting
            | ProcessStatus::Deleted => Some(HeartbeatState::Stopped),
        }
    }

    /// Whether a child process is expected to be alive in this status.
    pub fn has_live_child(self) -> bool {
        matches!(
            self,
            ProcessStatus::Run
                | ProcessStatus::Running
                | ProcessStatus::Reload
                | ProcessStatus::Reloading
                | ProcessStatus::Stopping
                | ProcessStatus::Deleting
        )
    }
}

/// Coarse process state reported to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatState {
    Running,
    Stopped,
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
