// Debounce state machine
//
// Collapses a burst of items into a single delayed delivery of the latest one.
// Holds at most one deadline at a time; re-arming replaces it.

use tokio::time::{Duration, Instant};

/// Default quiet period before a burst is delivered
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum DebounceState<T> {
    /// Nothing pending
    Idle,

    /// An item waits for the deadline
    Armed { deadline: Instant, pending: T },

    /// Last pending item was delivered
    Fired,
}

#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    state: DebounceState<T>,
    superseded: u64,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: DebounceState::Idle,
            superseded: 0,
        }
    }

    /// Arm (or re-arm) the timer with `item`. Returns true when a pending
    /// item was replaced.
    pub fn arm(&mut self, item: T, now: Instant) -> bool {
        let replaced = matches!(self.state, DebounceState::Armed { .. });
        if replaced {
            self.superseded += 1;
        }

        self.state = DebounceState::Armed {
            deadline: now + self.delay,
            pending: item,
        };
        replaced
    }

    /// Deadline of the pending delivery, if armed
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::Armed { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Take the pending item when the timer elapses
    pub fn fire(&mut self) -> Option<T> {
        match std::mem::replace(&mut self.state, DebounceState::Fired) {
            DebounceState::Armed { pending, .. } => Some(pending),
            previous => {
                self.state = previous;
                None
            }
        }
    }

    /// Drop any pending item without delivering it
    pub fn cancel(&mut self) -> Option<T> {
        match std::mem::replace(&mut self.state, DebounceState::Idle) {
            DebounceState::Armed { pending, .. } => Some(pending),
            _ => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, DebounceState::Armed { .. })
    }

    pub fn state(&self) -> &DebounceState<T> {
        &self.state
    }

    /// Items that were replaced before they could be delivered
    pub fn superseded(&self) -> u64 {
        self.superseded
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
