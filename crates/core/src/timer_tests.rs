// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fires_once_then_disabled() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();

    scheduler.schedule(TimerId::Heartbeat, now);
    assert!(scheduler.enabled(TimerId::Heartbeat));

    assert_eq!(scheduler.fired(now), vec![TimerId::Heartbeat]);
    assert!(!scheduler.enabled(TimerId::Heartbeat));
    assert!(scheduler.fired(now).is_empty());
}

#[test]
fn not_due_until_deadline() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();

    scheduler.schedule(TimerId::RegisterRetry, now + Duration::from_secs(5));
    assert!(scheduler.fired(now).is_empty());
    assert!(scheduler.enabled(TimerId::RegisterRetry));

    let fired = scheduler.fired(now + Duration::from_secs(5));
    assert_eq!(fired, vec![TimerId::RegisterRetry]);
}

#[test]
fn rearm_moves_the_deadline() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();

    scheduler.schedule(TimerId::Heartbeat, now + Duration::from_secs(1));
    scheduler.schedule(TimerId::Heartbeat, now + Duration::from_secs(60));

    assert!(scheduler.fired(now + Duration::from_secs(1)).is_empty());
    assert_eq!(
        scheduler.fired(now + Duration::from_secs(60)),
        vec![TimerId::Heartbeat]
    );
}

#[test]
fn cancel_disarms() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();

    scheduler.schedule(TimerId::HealthCheck, now);
    assert!(scheduler.cancel(TimerId::HealthCheck));
    assert!(!scheduler.cancel(TimerId::HealthCheck));
    assert!(scheduler.fired(now).is_empty());
}

#[test]
fn multiple_due_timers_fire_earliest_first() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();

    scheduler.schedule(TimerId::Heartbeat, now + Duration::from_secs(2));
    scheduler.schedule(TimerId::RegisterRetry, now + Duration::from_secs(1));

    let fired = scheduler.fired(now + Duration::from_secs(10));
    assert_eq!(fired, vec![TimerId::RegisterRetry, TimerId::Heartbeat]);
}
