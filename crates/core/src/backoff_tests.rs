// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use proptest::prelude::*;

#[test]
fn saturates_at_max() {
    assert_eq!(next_backoff(MAX_RETRY_SECS), MAX_RETRY_SECS);
    assert_eq!(next_backoff(MAX_RETRY_SECS + 100), MAX_RETRY_SECS);
}

#[test]
fn grows_until_saturation() {
    let mut delay = 0;
    for _ in 0..32 {
        let next = next_backoff(delay);
        assert!(next > delay || next == MAX_RETRY_SECS);
        delay = next;
    }
    assert_eq!(delay, MAX_RETRY_SECS);
}

proptest! {
    #[test]
    fn closed_on_5_to_30(last in 0u64..100) {
        let next = next_backoff(last);
        prop_assert!((MIN_RETRY_SECS..=MAX_RETRY_SECS).contains(&next));
    }
}
