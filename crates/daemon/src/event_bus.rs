// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus for supervisor-loop communication.
//!
//! Everything running off the loop (watcher callbacks, per-child wait
//! tasks, RPC completion tasks) posts events here; the loop drains them
//! sequentially. Per-sender ordering is the channel's FIFO guarantee.
//! Events are in-memory only: a command queue surviving restarts is
//! explicitly out of scope.

use tokio::sync::mpsc;
use tracing::warn;
use wm_core::Event;

/// Sending half, cheap to clone into tasks and callbacks.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
}

/// Receiving half, owned by the supervisor loop.
pub struct EventReader {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventBus {
    pub fn new() -> (Self, EventReader) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, EventReader { rx })
    }

    /// Post an event to the loop. Never blocks; a closed bus (loop gone)
    /// drops the event with a warning.
    pub fn send(&self, event: Event) {
        if self.tx.send(event).is_err() {
            warn!("event bus closed, dropping event");
        }
    }
}

impl EventReader {
    /// Next event, or `None` once every sender has been dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
