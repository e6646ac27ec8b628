// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration file watcher.
//!
//! Watches the config file's directory (editors replace files rather than
//! rewriting them in place) and posts a single debounced
//! `ConfigFileChanged` event for any create, modify, or remove touching the
//! file. The notify callback runs on the watcher's own thread; the event
//! bus marshals it onto the supervisor loop.

use std::path::Path;
use std::time::{Duration, Instant};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::warn;
use wm_core::Event;

use crate::event_bus::EventBus;

/// Minimum gap between reload notifications.
const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(500);

/// Keeps the underlying watcher alive.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

pub fn watch(config_path: &Path, bus: EventBus) -> Result<ConfigWatcher, notify::Error> {
    let dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let file_name = config_path.file_name().map(|n| n.to_os_string());
    let last_notified = Mutex::new(Instant::now() - DEBOUNCE_INTERVAL);

    let mut watcher = RecommendedWatcher::new(
        move |result: Result<notify::Event, notify::Error>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("config watch error: {e}");
                    return;
                }
            };

            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            if !event
                .paths
                .iter()
                .any(|p| p.file_name() == file_name.as_deref())
            {
                return;
            }

            {
                let mut last = last_notified.lock();
                let now = Instant::now();
                if now.duration_since(*last) < DEBOUNCE_INTERVAL {
                    return;
                }
                *last = now;
            }

            bus.send(Event::ConfigFileChanged);
        },
        notify::Config::default(),
    )?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(ConfigWatcher { _watcher: watcher })
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
