// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Desired-state configuration model: parsing, validation, service diffing.
//!
//! The configuration document is JSON. Every field is defaulted so partial
//! documents parse; validation rejects documents the supervisor could not
//! act on (bad log level, unparseable HTTP bind, duplicate service names).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource limits applied to a cgroup, either globally or per process.
///
/// `cpu_rate` is a percentage of one CPU; `memory_limit` is in bytes. A zero
/// value leaves the corresponding controller untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgroupPolicy {
    pub enabled: bool,
    pub name: String,
    pub cpu_rate: u32,
    pub memory_limit: u64,
}

impl CgroupPolicy {
    /// An enabled, named policy can host children as a shared cgroup.
    pub fn is_shareable(&self) -> bool {
        self.enabled && !self.name.is_empty()
    }
}

/// One supervised process as the operator wants it to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub process_name: String,
    pub command: String,
    pub cgroup: CgroupPolicy,
    /// Where to write `config` before the process starts. Empty: nothing
    /// is written.
    pub config_path: String,
    /// Opaque payload handed down by the control plane for this process.
    pub config: String,
}

impl ProcessConfig {
    /// Entries without a name or command cannot be supervised and are
    /// skipped when diffing.
    pub fn is_diffable(&self) -> bool {
        !self.process_name.is_empty() && !self.command.is_empty()
    }
}

/// Introspection HTTP server settings. An empty `bind` disables the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    pub health_path: String,
    pub bind: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            health_path: "/health".to_string(),
            bind: String::new(),
        }
    }
}

/// Control-plane endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
}

/// Root desired state for the supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub daemon: bool,
    pub log_level: String,
    pub log_path: String,
    pub network_interface: String,
    pub cgroup: CgroupPolicy,
    pub service: Vec<ProcessConfig>,
    pub http_server: HttpServerConfig,
    pub network: NetworkConfig,
    pub company_uuid: String,
    pub version: String,
}

impl ManagerConfig {
    /// Parse and validate a configuration document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ManagerConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to the on-disk document format.
    pub fn serialize(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.log_level.is_empty() && !is_valid_log_level(&self.log_level) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level {:?}",
                self.log_level
            )));
        }
        if !self.http_server.bind.is_empty()
            && self.http_server.bind.parse::<std::net::SocketAddr>().is_err()
        {
            return Err(ConfigError::Invalid(format!(
                "http bind {:?} is not a socket address",
                self.http_server.bind
            )));
        }
        let mut seen = BTreeMap::new();
        for service in &self.service {
            if service.process_name.is_empty() {
                continue;
            }
            if seen.insert(service.process_name.as_str(), ()).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "duplicate service name {:?}",
                    service.process_name
                )));
            }
        }
        Ok(())
    }

    /// `host:port` of the control plane, when one is configured.
    pub fn server_address(&self) -> Option<String> {
        if self.network.host.is_empty() || self.network.port == 0 {
            return None;
        }
        Some(format!("{}:{}", self.network.host, self.network.port))
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

pub fn is_valid_log_level(level: &str) -> bool {
    LOG_LEVELS.contains(&level)
}

/// Service name -> config, the unit both diff halves are expressed in.
pub type ServiceMap = BTreeMap<String, ProcessConfig>;

/// Index services by name, skipping entries that cannot be supervised.
pub fn service_map(services: &[ProcessConfig]) -> ServiceMap {
    services
        .iter()
        .filter(|s| s.is_diffable())
        .map(|s| (s.process_name.clone(), s.clone()))
        .collect()
}

/// Compare two service lists: `(added_or_changed, removed)`.
///
/// A service counts as added-or-changed when its name is absent from `old`
/// or its configuration is not structurally equal. Unchanged services appear
/// in neither map and are never restarted.
pub fn diff_services(
    old: &[ProcessConfig],
    new: &[ProcessConfig],
) -> (ServiceMap, ServiceMap) {
    let old_map = service_map(old);
    let new_map = service_map(new);

    let mut added = ServiceMap::new();
    for (name, config) in &new_map {
        match old_map.get(name) {
            Some(prior) if prior == config => {}
            _ => {
                added.insert(name.clone(), config.clone());
            }
        }
    }

    let mut removed = ServiceMap::new();
    for (name, config) in &old_map {
        if !new_map.contains_key(name) {
            removed.insert(name.clone(), config.clone());
        }
    }

    (added, removed)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
