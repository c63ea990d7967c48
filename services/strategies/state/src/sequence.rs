//! Per-feed sequence tracking
//!
//! A tracker is unanchored until the first message after a (re)connect; from then on it
//! expects strictly consecutive numbers. Gaps are reported and the tracker resyncs past
//! them, so one lost message produces one gap, not a gap per following message.

use crate::error::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    InOrder,
    /// At or below the last processed number; the message should be dropped
    Duplicate { last: u64 },
    Gap { expected: u64, actual: u64 },
}

impl SequenceCheck {
    pub fn should_apply(&self) -> bool {
        !matches!(self, SequenceCheck::Duplicate { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SequenceTracker {
    feed: String,
    next_expected: Option<u64>,
    gaps: u64,
    duplicates: u64,
}

impl SequenceTracker {
    pub fn new(feed: impl Into<String>) -> Self {
        Self {
            feed: feed.into(),
            next_expected: None,
            gaps: 0,
            duplicates: 0,
        }
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn next_expected(&self) -> Option<u64> {
        self.next_expected
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.next_expected.map(|n| n.saturating_sub(1))
    }

    /// Forget the anchor; the next message is accepted as-is
    pub fn reset(&mut self) {
        self.next_expected = None;
    }

    pub fn track(&mut self, sequence: u64) -> SequenceCheck {
        let expected = match self.next_expected {
            None => {
                self.next_expected = Some(sequence.saturating_add(1));
                return SequenceCheck::InOrder;
            }
            Some(expected) => expected,
        };

        if sequence == expected {
            self.next_expected = Some(sequence.saturating_add(1));
            SequenceCheck::InOrder
        } else if sequence < expected {
            self.duplicates += 1;
            SequenceCheck::Duplicate {
                last: expected.saturating_sub(1),
            }
        } else {
            self.gaps += 1;
            self.next_expected = Some(sequence.saturating_add(1));
            SequenceCheck::Gap {
                expected,
                actual: sequence,
            }
        }
    }

    /// Gap as an error, for callers that propagate it
    pub fn gap_error(&self, check: SequenceCheck) -> Option<StateError> {
        match check {
            SequenceCheck::Gap { expected, actual } => Some(StateError::SequenceGap {
                feed: self.feed.clone(),
                expected,
                actual,
            }),
            _ => None,
        }
    }

    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_anchors() {
        let mut tracker = SequenceTracker::new("polygon-v2");
        assert_eq!(tracker.track(500), SequenceCheck::InOrder);
        assert_eq!(tracker.track(501), SequenceCheck::InOrder);
        assert_eq!(tracker.last_sequence(), Some(501));
    }

    #[test]
    fn test_gap_resyncs() {
        let mut tracker = SequenceTracker::new("feed");
        tracker.track(1);
        let check = tracker.track(4);
        assert_eq!(check, SequenceCheck::Gap { expected: 2, actual: 4 });
        assert!(matches!(
            tracker.gap_error(check),
            Some(StateError::SequenceGap { expected: 2, actual: 4, .. })
        ));
        assert_eq!(tracker.track(5), SequenceCheck::InOrder);
        assert_eq!(tracker.gaps(), 1);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let mut tracker = SequenceTracker::new("feed");
        tracker.track(10);
        tracker.track(11);
        let check = tracker.track(10);
        assert_eq!(check, SequenceCheck::Duplicate { last: 11 });
        assert!(!check.should_apply());
        assert_eq!(tracker.duplicates(), 1);
    }

    #[test]
    fn test_reset_on_reconnect() {
        let mut tracker = SequenceTracker::new("feed");
        tracker.track(100);
        tracker.reset();
        assert_eq!(tracker.next_expected(), None);
        assert_eq!(tracker.track(3), SequenceCheck::InOrder);
    }
}
