//! Pure allocation math over a threshold → free-slot map.
//!
//! A lane keyed by threshold `t` admits tasks whose priority is at most `t`.
//! A task looks for a slot in the first lane whose threshold reaches its
//! priority and, when that lane is full, borrows from the nearest lower lane
//! with spare capacity. It never reaches past the first lane that covers it.

use lanes_core::{AllocationMap, Priority};

/// Total concurrency budget: the sum of all lane slot counts.
pub fn compute_threads_count(map: &AllocationMap) -> usize {
    map.values().sum()
}

/// Find the lane a task of `priority` should draw a slot from.
///
/// Thresholds are scanned ascending, remembering the last one with at least
/// one free slot. The scan stops right after examining the first threshold
/// `>= priority`. Returns the remembered threshold, if any.
pub fn find_allocation_slot(map: &AllocationMap, priority: Priority) -> Option<Priority> {
    let mut candidate = None;
    for (&threshold, &slots) in map {
        if slots > 0 {
            candidate = Some(threshold);
        }
        if threshold >= priority {
            break;
        }
    }
    candidate
}

/// Copy of `map` with one slot taken for every priority in `priorities`.
///
/// A priority that finds no slot consumes nothing.
pub fn subtract_allocations<I>(map: &AllocationMap, priorities: I) -> AllocationMap
where
    I: IntoIterator<Item = Priority>,
{
    let mut available = map.clone();
    for priority in priorities {
        take_slot(&mut available, priority);
    }
    available
}

/// Take one slot for `priority` from `map` in place, returning the lane used.
pub fn take_slot(map: &mut AllocationMap, priority: Priority) -> Option<Priority> {
    let threshold = find_allocation_slot(map, priority)?;
    if let Some(slots) = map.get_mut(&threshold) {
        *slots -= 1;
    }
    Some(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(Priority, usize)]) -> AllocationMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn threads_count_sums_all_lanes() {
        assert_eq!(compute_threads_count(&map(&[(1000, 1), (2000, 3)])), 4);
        assert_eq!(compute_threads_count(&AllocationMap::new()), 0);
    }

    #[test]
    fn slot_in_own_lane() {
        let m = map(&[(1000, 1), (2000, 1)]);
        assert_eq!(find_allocation_slot(&m, 1000), Some(1000));
        assert_eq!(find_allocation_slot(&m, 500), Some(1000));
        assert_eq!(find_allocation_slot(&m, 1500), Some(2000));
    }

    #[test]
    fn borrows_lower_lane_when_own_is_full() {
        let m = map(&[(1000, 1), (2000, 0)]);
        assert_eq!(find_allocation_slot(&m, 1500), Some(1000));
        assert_eq!(find_allocation_slot(&m, 2000), Some(1000));
    }

    #[test]
    fn never_skips_ahead_to_higher_lane() {
        let m = map(&[(1000, 0), (2000, 1)]);
        assert_eq!(find_allocation_slot(&m, 1000), None);
        assert_eq!(find_allocation_slot(&m, 10), None);
    }

    #[test]
    fn priority_above_every_threshold_uses_last_free_lane() {
        let m = map(&[(1000, 1), (2000, 0)]);
        assert_eq!(find_allocation_slot(&m, 5000), Some(1000));
        let m = map(&[(1000, 0), (2000, 0)]);
        assert_eq!(find_allocation_slot(&m, 5000), None);
    }

    #[test]
    fn nearest_lower_lane_wins() {
        let m = map(&[(100, 1), (200, 1), (300, 0)]);
        assert_eq!(find_allocation_slot(&m, 300), Some(200));
    }

    #[test]
    fn subtract_takes_one_slot_per_priority() {
        let m = map(&[(1000, 1), (2000, 1)]);
        let available = subtract_allocations(&m, [1000, 1500]);
        assert_eq!(available, map(&[(1000, 0), (2000, 0)]));
        // input untouched
        assert_eq!(m, map(&[(1000, 1), (2000, 1)]));
    }

    #[test]
    fn subtract_ignores_priorities_without_a_slot() {
        let m = map(&[(1000, 1)]);
        let available = subtract_allocations(&m, [1000, 1000, 1000]);
        assert_eq!(available, map(&[(1000, 0)]));
        assert_eq!(subtract_allocations(&AllocationMap::new(), [1]), AllocationMap::new());
    }

    #[test]
    fn take_slot_reports_lane() {
        let mut m = map(&[(1000, 1), (2000, 1)]);
        assert_eq!(take_slot(&mut m, 1500), Some(2000));
        assert_eq!(take_slot(&mut m, 1500), Some(1000));
        assert_eq!(take_slot(&mut m, 1500), None);
    }
}
