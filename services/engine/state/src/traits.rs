//! State Management Traits
//!
//! Event-sourced components apply market events in sequence order and can be
//! persisted and restored as opaque byte snapshots.

use thiserror::Error;

/// Error types for state management operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Sequence gap detected: expected {expected}, actual {actual}")]
    SequenceGap { expected: u64, actual: u64 },

    #[error("State validation failed: {reason}")]
    ValidationFailed { reason: String },
}

impl StateError {
    /// Number of missing events for a forward gap, zero for replays
    pub fn gap_size(&self) -> u64 {
        match self {
            StateError::SequenceGap { expected, actual } => actual.saturating_sub(*expected),
            StateError::ValidationFailed { .. } => 0,
        }
    }
}

/// Core trait for stateful components that can apply events
pub trait Stateful {
    /// Event type this component can handle
    type Event;

    /// Error type for failed operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Apply an event to update the state
    fn apply_event(&mut self, event: Self::Event) -> Result<(), Self::Error>;

    /// Serialize the current state
    fn snapshot(&self) -> Vec<u8>;

    /// Replace the current state with a serialized one
    fn restore(&mut self, snapshot: &[u8]) -> Result<(), Self::Error>;
}

/// Stateful component whose events carry a contiguous sequence number
pub trait SequencedStateful: Stateful {
    /// Apply an event, rejecting out-of-order or missing sequence numbers
    fn apply_sequenced(&mut self, sequence: u64, event: Self::Event) -> Result<(), Self::Error>;

    /// Get the last processed sequence number
    fn last_sequence(&self) -> u64;
}

/// Sequence tracking for gap detection
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    next_expected: u64,
    last_processed: u64,
}

impl SequenceTracker {
    /// Create a new sequence tracker starting from sequence 1
    pub fn new() -> Self {
        Self {
            next_expected: 1,
            last_processed: 0,
        }
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_processed
    }

    /// Rebase after a restore or a full resync
    pub fn set_last_sequence(&mut self, sequence: u64) {
        self.last_processed = sequence;
        self.next_expected = sequence.saturating_add(1);
    }

    /// Fails unless `sequence` is exactly the next expected number
    pub fn check(&self, sequence: u64) -> Result<(), StateError> {
        if sequence == self.next_expected {
            Ok(())
        } else {
            Err(StateError::SequenceGap {
                expected: self.next_expected,
                actual: sequence,
            })
        }
    }

    /// Check and advance in one step
    pub fn track(&mut self, sequence: u64) -> Result<(), StateError> {
        self.check(sequence)?;
        self.set_last_sequence(sequence);
        Ok(())
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tracker_accepts_contiguous_sequences() {
        let mut tracker = SequenceTracker::new();
        tracker.track(1).unwrap();
        tracker.track(2).unwrap();
        assert_eq!(tracker.last_sequence(), 2);
        assert_eq!(tracker.next_expected(), 3);
    }

    #[test]
    fn test_tracker_rejects_gaps_and_replays() {
        let mut tracker = SequenceTracker::new();
        tracker.track(1).unwrap();

        let gap = tracker.track(5).unwrap_err();
        assert_eq!(
            gap,
            StateError::SequenceGap {
                expected: 2,
                actual: 5
            }
        );
        assert_eq!(gap.gap_size(), 3);

        let replay = tracker.track(1).unwrap_err();
        assert_eq!(replay.gap_size(), 0);
        // Rejected sequences do not advance the tracker
        assert_eq!(tracker.last_sequence(), 1);
    }

    #[test]
    fn test_rebase_after_resync() {
        let mut tracker = SequenceTracker::new();
        tracker.set_last_sequence(100);
        assert!(tracker.track(101).is_ok());
    }

    proptest! {
        #[test]
        fn prop_only_next_sequence_is_accepted(start in 0u64..1_000_000, offset in 0u64..1_000) {
            let mut tracker = SequenceTracker::new();
            tracker.set_last_sequence(start);
            let candidate = start + offset;
            let result = tracker.track(candidate);
            prop_assert_eq!(result.is_ok(), offset == 1);
            let expected_last = if offset == 1 { candidate } else { start };
            prop_assert_eq!(tracker.last_sequence(), expected_last);
        }
    }
}
