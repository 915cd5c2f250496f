//! Property-based tests for the debounce window.

use kiosk_dispense::Debouncer;
use proptest::prelude::*;
use std::time::{Duration, Instant};

const WINDOW_MS: u64 = 3000;

proptest! {
    #[test]
    fn prop_same_code_suppressed_inside_window(
        code in "[A-Z0-9]{1,16}",
        gap_ms in 0u64..WINDOW_MS,
    ) {
        let mut debouncer = Debouncer::new(Duration::from_millis(WINDOW_MS));
        let t1 = Instant::now();

        prop_assert!(debouncer.accept(&code, t1));
        prop_assert!(!debouncer.accept(&code, t1 + Duration::from_millis(gap_ms)));
    }

    #[test]
    fn prop_same_code_accepted_after_window(
        code in "[A-Z0-9]{1,16}",
        gap_ms in WINDOW_MS..(WINDOW_MS * 100),
    ) {
        let mut debouncer = Debouncer::new(Duration::from_millis(WINDOW_MS));
        let t1 = Instant::now();

        prop_assert!(debouncer.accept(&code, t1));
        prop_assert!(debouncer.accept(&code, t1 + Duration::from_millis(gap_ms)));
    }

    #[test]
    fn prop_distinct_codes_both_accepted(
        first in "[A-Z0-9]{1,16}",
        second in "[A-Z0-9]{1,16}",
    ) {
        prop_assume!(first != second);
        let mut debouncer = Debouncer::default();
        let t = Instant::now();

        prop_assert!(debouncer.accept(&first, t));
        prop_assert!(debouncer.accept(&second, t));
    }

    #[test]
    fn prop_accepted_reads_are_window_apart(
        offsets in prop::collection::vec(0u64..20_000, 1..40),
    ) {
        let mut offsets = offsets;
        offsets.sort_unstable();

        let mut debouncer = Debouncer::new(Duration::from_millis(WINDOW_MS));
        let base = Instant::now();
        let mut accepted: Vec<u64> = Vec::new();

        for offset in offsets {
            if debouncer.accept("CARD", base + Duration::from_millis(offset)) {
                accepted.push(offset);
            }
        }

        prop_assert!(!accepted.is_empty());
        for pair in accepted.windows(2) {
            prop_assert!(pair[1] - pair[0] >= WINDOW_MS);
        }
    }
}
