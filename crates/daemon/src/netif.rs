// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host network interface discovery for registration.

use std::collections::BTreeMap;

use nix::net::if_::InterfaceFlags;
use tracing::{info, warn};

/// Addresses of one interface; either family may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpInfo {
    pub ipv4: String,
    pub ipv6: String,
}

impl IpInfo {
    fn has_both(&self) -> bool {
        !self.ipv4.is_empty() && !self.ipv6.is_empty()
    }
}

/// Addresses to report to the control plane.
///
/// Honors `preferred` (the configured `network_interface`) when that
/// interface exists; otherwise prefers an interface carrying both families,
/// then falls back to any ipv6 and any ipv4 seen.
pub fn local_ip(preferred: &str) -> IpInfo {
    let interfaces = collect_interfaces();
    for (name, info) in &interfaces {
        info!(interface = %name, ipv4 = %info.ipv4, ipv6 = %info.ipv6, "candidate interface");
    }
    select_ip(&interfaces, preferred)
}

/// Up, non-loopback, non-bridge interfaces and their addresses.
fn collect_interfaces() -> BTreeMap<String, IpInfo> {
    let mut interfaces = BTreeMap::new();
    let addrs = match nix::ifaddrs::getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            warn!("failed to enumerate network interfaces: {e}");
            return interfaces;
        }
    };

    for ifaddr in addrs {
        let name = ifaddr.interface_name;
        if name == "lo" || name.starts_with("docker") || name.starts_with("br-") {
            continue;
        }
        if !ifaddr.flags.contains(InterfaceFlags::IFF_UP) {
            continue;
        }
        let Some(address) = ifaddr.address else {
            continue;
        };

        let entry: &mut IpInfo = interfaces.entry(name).or_default();
        if let Some(sin) = address.as_sockaddr_in() {
            entry.ipv4 = std::net::Ipv4Addr::from(sin.ip()).to_string();
        } else if let Some(sin6) = address.as_sockaddr_in6() {
            entry.ipv6 = sin6.ip().to_string();
        }
    }

    interfaces
}

fn select_ip(interfaces: &BTreeMap<String, IpInfo>, preferred: &str) -> IpInfo {
    if !preferred.is_empty() {
        match interfaces.get(preferred) {
            Some(info) => return info.clone(),
            None => warn!(interface = preferred, "configured interface not found, selecting another"),
        }
    }

    let mut fallback = IpInfo::default();
    for info in interfaces.values() {
        if info.has_both() {
            return info.clone();
        } else if !info.ipv6.is_empty() {
            fallback.ipv6 = info.ipv6.clone();
        } else if !info.ipv4.is_empty() {
            fallback.ipv4 = info.ipv4.clone();
        }
    }
    fallback
}

#[cfg(test)]
#[path = "netif_tests.rs"]
mod tests;
