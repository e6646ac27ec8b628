// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn delivers_in_send_order() {
    let (bus, mut reader) = EventBus::new();

    for pid in 1..=3 {
        bus.send(Event::ProcessExited {
            name: format!("p{pid}"),
            pid,
            code: Some(0),
        });
    }

    for expected in 1..=3u32 {
        match reader.recv().await {
            Some(Event::ProcessExited { pid, .. }) => assert_eq!(pid, expected),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

#[tokio::test]
async fn delivers_from_spawned_tasks() {
    let (bus, mut reader) = EventBus::new();

    let sender = bus.clone();
    tokio::spawn(async move {
        sender.send(Event::ConfigFileChanged);
    });
    drop(bus);

    assert!(matches!(reader.recv().await, Some(Event::ConfigFileChanged)));
    assert!(reader.recv().await.is_none(), "bus closes when senders drop");
}

#[test]
fn send_after_reader_dropped_is_harmless() {
    let (bus, reader) = EventBus::new();
    drop(reader);
    bus.send(Event::ConfigFileChanged);
}
