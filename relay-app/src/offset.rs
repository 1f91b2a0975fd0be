//! Monotonic cursor into the backend's update stream.

/// Owned exclusively by the dispatch loop. Advancing acknowledges every update
/// below the new offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffsetTracker {
    current: i64,
}

impl OffsetTracker {
    pub fn new(start: i64) -> Self {
        Self {
            current: start.max(0),
        }
    }

    pub fn current(&self) -> i64 {
        self.current
    }

    /// Move the cursor forward. Returns false, leaving the cursor untouched,
    /// when `new_offset` is not ahead of it.
    pub fn advance(&mut self, new_offset: i64) -> bool {
        if new_offset <= self.current {
            return false;
        }
        self.current = new_offset;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::OffsetTracker;

    #[test]
    fn starts_at_zero_or_the_seed() {
        assert_eq!(OffsetTracker::default().current(), 0);
        assert_eq!(OffsetTracker::new(17).current(), 17);
        assert_eq!(OffsetTracker::new(-3).current(), 0);
    }

    #[test]
    fn advance_never_moves_backwards() {
        let mut tracker = OffsetTracker::new(10);
        assert!(tracker.advance(12));
        assert!(!tracker.advance(11));
        assert!(!tracker.advance(12));
        assert_eq!(tracker.current(), 12);
        assert!(tracker.advance(13));
        assert_eq!(tracker.current(), 13);
    }
}
