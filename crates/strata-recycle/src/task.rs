//! Recycle task lifecycle

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use strata_common::ObjectLocation;
use tokio::time::Instant;

/// Lifecycle state of a recycle task.
///
/// `Pending -> InFlight -> Done | Failed`; `Failed` goes back to `Pending`
/// after a backoff until the retry budget is spent, then `DeadLettered`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InFlight,
    /// Last attempt failed; waiting out the backoff
    Failed,
    Done,
    DeadLettered,
}

impl TaskState {
    /// Whether the task will not run again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::DeadLettered)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Failed => "failed",
            Self::Done => "done",
            Self::DeadLettered => "dead_lettered",
        };
        f.write_str(s)
    }
}

/// One unit of reclaim work
#[derive(Clone, Debug)]
pub struct RecycleTask {
    pub location: ObjectLocation,
    /// Monotonic enqueue time, for queue latency
    pub enqueued_at: Instant,
    /// Wall-clock enqueue time, carried into dead letters
    pub enqueued_wall: DateTime<Utc>,
    /// Reclaim attempts made so far
    pub attempts: u32,
}

impl RecycleTask {
    #[must_use]
    pub fn new(location: ObjectLocation) -> Self {
        Self {
            location,
            enqueued_at: Instant::now(),
            enqueued_wall: Utc::now(),
            attempts: 0,
        }
    }

    /// Convert an exhausted task into its dead-letter record
    #[must_use]
    pub fn into_dead_letter(self, last_error: String) -> DeadLetter {
        DeadLetter {
            location: self.location,
            attempts: self.attempts,
            last_error,
            enqueued_at: self.enqueued_wall,
            dead_lettered_at: Utc::now(),
        }
    }
}

/// A task that exhausted its retry budget, kept for operator action
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeadLetter {
    pub location: ObjectLocation,
    pub attempts: u32,
    pub last_error: String,
    pub enqueued_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Bounded dead-letter records, oldest first, at most one per location
#[derive(Debug, Default)]
pub(crate) struct DeadLetterLog {
    order: VecDeque<ObjectLocation>,
    letters: HashMap<ObjectLocation, DeadLetter>,
}

impl DeadLetterLog {
    pub(crate) fn contains(&self, location: &ObjectLocation) -> bool {
        self.letters.contains_key(location)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Record a letter, returning the oldest one if it had to make room
    pub(crate) fn push(&mut self, letter: DeadLetter, capacity: usize) -> Option<DeadLetter> {
        let mut evicted = None;
        if let Some(previous) = self.letters.remove(&letter.location) {
            self.order.retain(|l| l != &previous.location);
        } else if self.order.len() >= capacity.max(1) {
            evicted = self
                .order
                .pop_front()
                .and_then(|oldest| self.letters.remove(&oldest));
        }
        self.order.push_back(letter.location.clone());
        self.letters.insert(letter.location.clone(), letter);
        evicted
    }

    pub(crate) fn to_vec(&self) -> Vec<DeadLetter> {
        self.order
            .iter()
            .filter_map(|l| self.letters.get(l).cloned())
            .collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<DeadLetter> {
        let letters = &mut self.letters;
        self.order
            .drain(..)
            .filter_map(|l| letters.remove(&l))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::Locator;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Done.is_terminal());
        assert!(TaskState::DeadLettered.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::InFlight.is_terminal());
        assert!(!TaskState::Failed.is_terminal());
    }

    #[test]
    fn test_dead_letter_record() {
        let mut task = RecycleTask::new(ObjectLocation::new("a", "p", "l"));
        task.attempts = 3;
        let letter = task.into_dead_letter("backend unavailable".to_string());

        assert_eq!(letter.attempts, 3);
        assert_eq!(letter.location.locator.as_str(), "l");
        assert!(letter.dead_lettered_at >= letter.enqueued_at);
    }

    fn letter(n: u32) -> DeadLetter {
        RecycleTask::new(ObjectLocation::new("a", "p", format!("l{n}")))
            .into_dead_letter("down".to_string())
    }

    #[test]
    fn test_dead_letter_log_is_bounded() {
        let mut log = DeadLetterLog::default();
        assert!(log.push(letter(1), 2).is_none());
        assert!(log.push(letter(2), 2).is_none());

        let evicted = log.push(letter(3), 2).unwrap();
        assert_eq!(evicted.location.locator.as_str(), "l1");
        assert_eq!(log.len(), 2);
        assert!(!log.contains(&letter(1).location));

        let kept: Vec<_> = log.to_vec().into_iter().map(|l| l.location.locator).collect();
        assert_eq!(kept, vec![Locator::new("l2"), Locator::new("l3")]);
    }

    #[test]
    fn test_dead_letter_log_keeps_one_record_per_location() {
        let mut log = DeadLetterLog::default();
        log.push(letter(1), 10);
        log.push(letter(1), 10);
        assert_eq!(log.len(), 1);

        assert_eq!(log.drain().len(), 1);
        assert_eq!(log.len(), 0);
        assert!(!log.contains(&letter(1).location));
    }
}
