//! Ordering gap tracking.
//!
//! `ordering` is allocated before commit, so a row can become visible after
//! a row with a higher ordering. A subscription that advanced its cursor
//! past the late row would never see it. The tracker holds delivery back at
//! the first missing ordering for a bounded number of polls; if the ordering
//! is still missing after that it is accepted as a permanent gap (a
//! rolled-back insert or a purged row) and delivery moves on.
//!
//! Only orderings above the highest ordering visible when the subscription
//! started are tracked. A hole at or below that point is treated as settled
//! without waiting: if it belongs to an insert that was still in flight at
//! start-up, that row is not delivered by this subscription.
//!
//! Settled orderings only ever grow, and each contiguity check starts at the
//! settled point, so a check never rescans orderings already accounted for.

use tracing::warn;

/// Per-subscription gap state.
#[derive(Debug, Clone)]
pub struct GapTracker {
    max_polls: u32,
    /// Orderings at or below this are settled: present, or accepted as
    /// missing for good.
    settled_through: i64,
    /// First missing ordering and the number of polls it has held delivery.
    pending: Option<(i64, u32)>,
}

impl GapTracker {
    /// `max_polls = 0` disables tracking.
    pub fn new(max_polls: u32, settled_through: i64) -> Self {
        Self {
            max_polls,
            settled_through,
            pending: None,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, i64::MAX)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_polls > 0
    }

    /// Orderings at or below this are present or accepted as missing.
    pub fn settled_through(&self) -> i64 {
        self.settled_through
    }

    /// Whether rows up to `ordering` can only be delivered after a
    /// contiguity check.
    pub fn needs_check(&self, ordering: i64) -> bool {
        self.is_enabled() && ordering > self.settled_through
    }

    /// Highest ordering that may be delivered this poll.
    ///
    /// `present` holds the visible orderings above `cursor`, deleted rows
    /// included, ascending and contiguous with the storage contents up to
    /// its last element. The result is never below `cursor` nor above the
    /// last element of `present`.
    pub fn deliverable_through(&mut self, cursor: i64, present: &[i64]) -> i64 {
        let mut expected = cursor.saturating_add(1);
        for &ordering in present {
            if ordering > expected {
                let first_missing = expected.max(self.settled_through.saturating_add(1));
                if first_missing < ordering {
                    if self.hold(first_missing) {
                        self.settle(first_missing - 1);
                        return first_missing - 1;
                    }
                    warn!(
                        from = first_missing,
                        to = ordering - 1,
                        "Accepting ordering gap as permanent"
                    );
                    self.settled_through = self.settled_through.max(ordering - 1);
                }
            }
            expected = ordering.saturating_add(1);
        }
        if let Some((missing, _)) = self.pending {
            if missing < expected {
                self.pending = None;
            }
        }
        self.settle(expected - 1);
        expected - 1
    }

    fn settle(&mut self, through: i64) {
        self.settled_through = self.settled_through.max(through);
    }

    /// Count one more poll held at `missing`. False once the hold expires.
    fn hold(&mut self, missing: i64) -> bool {
        match self.pending {
            Some((pending, polls)) if pending == missing => {
                if polls >= self.max_polls {
                    self.pending = None;
                    false
                } else {
                    self.pending = Some((pending, polls + 1));
                    true
                }
            }
            _ => {
                self.pending = Some((missing, 1));
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_orderings_deliver_everything() {
        let mut gaps = GapTracker::new(3, 0);
        assert_eq!(gaps.deliverable_through(0, &[1, 2, 3]), 3);
    }

    #[test]
    fn test_gap_holds_delivery_before_missing_ordering() {
        let mut gaps = GapTracker::new(3, 0);
        assert_eq!(gaps.deliverable_through(0, &[1, 3, 4]), 1);
        assert_eq!(gaps.deliverable_through(1, &[3, 4]), 1);
    }

    #[test]
    fn test_filled_gap_releases_delivery() {
        let mut gaps = GapTracker::new(3, 0);
        assert_eq!(gaps.deliverable_through(0, &[1, 3]), 1);
        assert_eq!(gaps.deliverable_through(1, &[2, 3]), 3);
        assert!(gaps.pending.is_none());
    }

    #[test]
    fn test_gap_accepted_after_max_polls() {
        let mut gaps = GapTracker::new(2, 0);
        assert_eq!(gaps.deliverable_through(0, &[2]), 0);
        assert_eq!(gaps.deliverable_through(0, &[2]), 0);
        assert_eq!(gaps.deliverable_through(0, &[2]), 2);
        // settled now; the same hole is not held again
        assert_eq!(gaps.deliverable_through(0, &[2]), 2);
    }

    #[test]
    fn test_gaps_below_start_are_settled() {
        let mut gaps = GapTracker::new(5, 10);
        assert_eq!(gaps.deliverable_through(0, &[3, 7, 10]), 10);
        assert!(!gaps.needs_check(10));
        assert!(gaps.needs_check(11));
    }

    #[test]
    fn test_checked_orderings_become_settled() {
        let mut gaps = GapTracker::new(3, 0);
        assert_eq!(gaps.deliverable_through(0, &[1, 2, 3]), 3);
        assert_eq!(gaps.settled_through(), 3);
        assert!(!gaps.needs_check(3));

        // a hold settles everything below the first missing ordering
        assert_eq!(gaps.deliverable_through(3, &[4, 6]), 4);
        assert_eq!(gaps.settled_through(), 4);
    }

    #[test]
    fn test_disabled_tracker_never_checks() {
        let gaps = GapTracker::disabled();
        assert!(!gaps.needs_check(i64::MAX - 1));
        assert!(!GapTracker::new(0, 0).needs_check(5));
    }
}
