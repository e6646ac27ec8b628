// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative configuration state.
//!
//! The store owns the current [`ManagerConfig`] behind a readers-writer
//! lock. Candidates arrive from the local file (watcher) or the control
//! plane; `apply_candidate` swaps scalars under the write lock and returns
//! an [`ApplyOutcome`] describing the process and HTTP work, which the
//! supervisor loop applies after the lock is released. The store never
//! calls into the process machinery itself.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};
use wm_core::{
    diff_services, is_valid_log_level, ConfigError, ManagerConfig, ServiceMap,
};

use crate::logging::LogHandle;

/// Read and parse the configuration document at `path`.
pub fn read_config(path: &Path) -> Result<ManagerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    ManagerConfig::parse(&content)
}

/// What the reconciler and HTTP server must do after a candidate config
/// was adopted.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Global cgroup policy changed: restart the whole pool.
    pub full_restart: bool,
    pub added: ServiceMap,
    pub removed: ServiceMap,
    pub http_restart: bool,
}

impl ApplyOutcome {
    pub fn is_noop(&self) -> bool {
        !self.full_restart
            && !self.http_restart
            && self.added.is_empty()
            && self.removed.is_empty()
    }
}

pub struct ConfigStore {
    path: PathBuf,
    inner: RwLock<ManagerConfig>,
    log: LogHandle,
}

impl ConfigStore {
    pub fn new(path: PathBuf, initial: ManagerConfig, log: LogHandle) -> Self {
        Self {
            path,
            inner: RwLock::new(initial),
            log,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> ManagerConfig {
        self.inner.read().clone()
    }

    pub fn server_address(&self) -> Option<String> {
        self.inner.read().server_address()
    }

    /// Re-read the authoritative file after a watcher notification.
    /// Parse or validation failure keeps the current config.
    pub fn reload_from_file(&self) -> Result<ApplyOutcome, ConfigError> {
        let candidate = read_config(&self.path)?;
        Ok(self.apply_candidate(candidate))
    }

    /// Adopt a configuration pushed by the control plane.
    ///
    /// Per-service config payloads are written to disk before the candidate
    /// is applied, so a newly started process finds its file in place. The
    /// adopted config is then persisted back to the authoritative path.
    pub fn on_server_config(&self, blob: &str) -> Result<ApplyOutcome, ConfigError> {
        let candidate = ManagerConfig::parse(blob)?;

        for service in &candidate.service {
            if service.config_path.is_empty() {
                continue;
            }
            if let Err(e) = std::fs::write(&service.config_path, &service.config) {
                warn!(
                    service = %service.process_name,
                    path = %service.config_path,
                    "failed to write service config: {e}"
                );
            }
        }

        let outcome = self.apply_candidate(candidate);

        if let Err(e) = self.persist() {
            warn!("failed to persist adopted configuration: {e}");
        }
        Ok(outcome)
    }

    /// Swap the candidate in. Holds the write lock only across field swaps;
    /// the returned outcome carries the follow-up work.
    fn apply_candidate(&self, new: ManagerConfig) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let mut current = self.inner.write();

        current.daemon = new.daemon;

        if new.log_level != current.log_level && is_valid_log_level(&new.log_level) {
            info!(from = %current.log_level, to = %new.log_level, "log level updated");
            self.log.set_level(&new.log_level);
            current.log_level = new.log_level.clone();
        }

        if !new.log_path.is_empty() && new.log_path != current.log_path {
            current.log_path = new.log_path.clone();
            self.log.set_path(&current.log_path);
        }

        // The client watches this for an address change after a push.
        current.network = new.network.clone();

        if current.cgroup != new.cgroup {
            current.cgroup = new.cgroup.clone();
            current.service = new.service.clone();
            outcome.full_restart = true;
        } else {
            let (added, removed) = diff_services(&current.service, &new.service);
            if !added.is_empty() || !removed.is_empty() {
                current.service = new.service.clone();
                outcome.added = added;
                outcome.removed = removed;
            }
        }

        if current.http_server != new.http_server {
            current.http_server = new.http_server.clone();
            outcome.http_restart = true;
        }

        outcome
    }

    /// Write the current config to the authoritative path via a sibling
    /// temp file and rename, so readers never observe a torn document.
    fn persist(&self) -> Result<(), ConfigError> {
        let content = self.snapshot().serialize()?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_store_tests.rs"]
mod tests;
