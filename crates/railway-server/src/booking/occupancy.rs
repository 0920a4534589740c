//! Seat occupancy test.
//!
//! A reservation occupies a seat over the half-open interval
//! `[departure stop, arrival stop)` on the route's stop-order axis. Two
//! reservations conflict when their intervals intersect, so back-to-back
//! legs that share only a boundary station can hold the same seat.

use std::collections::HashSet;

use crate::storage::ReservedSegment;

/// Half-open interval of stop positions, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: i64,
    pub end: i64,
}

impl Segment {
    /// A forward segment, or `None` when `start >= end`.
    pub const fn new(start: i64, end: i64) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub const fn overlaps(self, other: Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl From<&ReservedSegment> for Segment {
    fn from(r: &ReservedSegment) -> Self {
        Self {
            start: r.start_order,
            end: r.end_order,
        }
    }
}

/// Whether `requested` intersects none of `reserved`.
pub fn is_free<'a>(
    requested: Segment,
    reserved: impl IntoIterator<Item = &'a ReservedSegment>,
) -> bool {
    reserved
        .into_iter()
        .all(|r| !requested.overlaps(Segment::from(r)))
}

/// Seats holding at least one reservation that intersects `requested`.
pub fn occupied_seats(requested: Segment, reserved: &[ReservedSegment]) -> HashSet<i64> {
    reserved
        .iter()
        .filter(|r| requested.overlaps(Segment::from(*r)))
        .map(|r| r.seat_id)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seg(start: i64, end: i64) -> Segment {
        Segment::new(start, end).unwrap()
    }

    fn reserved(seat_id: i64, start: i64, end: i64) -> ReservedSegment {
        ReservedSegment {
            seat_id,
            start_order: start,
            end_order: end,
        }
    }

    #[test]
    fn backward_or_empty_segment_is_rejected() {
        assert!(Segment::new(3, 3).is_none());
        assert!(Segment::new(4, 2).is_none());
        assert!(Segment::new(1, 2).is_some());
    }

    #[test]
    fn overlap_cases() {
        let ac = seg(1, 3);
        // start strictly inside
        assert!(ac.overlaps(seg(2, 4)));
        assert!(seg(2, 4).overlaps(ac));
        // containment both ways
        assert!(ac.overlaps(seg(1, 5)));
        assert!(seg(1, 5).overlaps(ac));
        assert!(ac.overlaps(ac));
        // shared boundary only
        assert!(!ac.overlaps(seg(3, 5)));
        assert!(!seg(3, 5).overlaps(ac));
        // disjoint
        assert!(!seg(1, 2).overlaps(seg(4, 5)));
    }

    #[test]
    fn free_against_many_reservations() {
        let held = [reserved(12, 1, 3), reserved(12, 4, 5)];
        assert!(is_free(seg(3, 4), &held));
        assert!(!is_free(seg(2, 4), &held));
        assert!(!is_free(seg(1, 5), &held));
        assert!(is_free(seg(1, 5), &[]));
    }

    #[test]
    fn occupied_seats_collects_conflicting_seat_ids() {
        let held = [reserved(1, 1, 3), reserved(2, 3, 5), reserved(3, 2, 4)];
        let busy = occupied_seats(seg(1, 2), &held);
        assert_eq!(busy, HashSet::from([1]));

        let busy = occupied_seats(seg(2, 4), &held);
        assert_eq!(busy, HashSet::from([1, 2, 3]));
    }
}
