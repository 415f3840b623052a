//! Cancellable scheduled tasks on a virtual clock
//!
//! Every delay in the assistant (capture window, subtitle auto-clear, simulated
//! call and help-connection durations) is a [`TimerQueue`] entry rather than a
//! sleep. The owner advances the clock explicitly, so tests step time
//! deterministically and the runtime maps wall-clock time onto it.

use std::collections::BTreeMap;
use std::time::Duration;

/// Handle returned by [`TimerQueue::schedule_in`], used to cancel the task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Ordered queue of payloads due at points on a virtual clock
///
/// Time starts at zero and only moves forward. Tasks due at the same instant
/// fire in scheduling order.
#[derive(Debug)]
pub struct TimerQueue<T> {
    now: Duration,
    next_id: u64,
    entries: BTreeMap<(Duration, TimerId), T>,
}

impl<T> TimerQueue<T> {
    /// Create an empty queue at time zero
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `payload` to become due `delay` from now
    pub fn schedule_in(&mut self, delay: Duration, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.insert((self.now + delay, id), payload);
        id
    }

    /// Cancel a scheduled task, returning its payload if it had not fired yet
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let key = self.entries.keys().find(|(_, entry_id)| *entry_id == id).copied()?;
        self.entries.remove(&key)
    }

    /// Whether the task is still waiting to fire
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.entries.keys().any(|(_, entry_id)| *entry_id == id)
    }

    /// Instant at which the earliest task becomes due
    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    /// Move the clock forward. Moving backwards is ignored.
    pub fn set_now(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Remove and return the earliest task that is due at the current time
    pub fn pop_due(&mut self) -> Option<(TimerId, T)> {
        let (due, id) = *self.entries.keys().next()?;
        if due > self.now {
            return None;
        }
        self.entries.remove(&(due, id)).map(|payload| (id, payload))
    }

    /// Number of pending tasks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no task is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let mut queue = TimerQueue::new();
        queue.schedule_in(ms(300), "late");
        queue.schedule_in(ms(100), "early");

        queue.set_now(ms(50));
        assert!(queue.pop_due().is_none());

        queue.set_now(ms(1000));
        assert_eq!(queue.pop_due().map(|(_, p)| p), Some("early"));
        assert_eq!(queue.pop_due().map(|(_, p)| p), Some("late"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_same_instant_keeps_scheduling_order() {
        let mut queue = TimerQueue::new();
        queue.schedule_in(ms(10), 1);
        queue.schedule_in(ms(10), 2);
        queue.set_now(ms(10));

        assert_eq!(queue.pop_due().map(|(_, p)| p), Some(1));
        assert_eq!(queue.pop_due().map(|(_, p)| p), Some(2));
    }

    #[test]
    fn test_cancel() {
        let mut queue = TimerQueue::new();
        let id = queue.schedule_in(ms(10), "clear");
        assert!(queue.is_scheduled(id));

        assert_eq!(queue.cancel(id), Some("clear"));
        assert!(!queue.is_scheduled(id));
        assert_eq!(queue.cancel(id), None);

        queue.set_now(ms(100));
        assert!(queue.pop_due().is_none());
    }

    #[test]
    fn test_delay_is_relative_to_now() {
        let mut queue = TimerQueue::new();
        queue.set_now(ms(500));
        queue.schedule_in(ms(100), ());
        assert_eq!(queue.next_deadline(), Some(ms(600)));
    }

    #[test]
    fn test_clock_never_moves_backwards() {
        let mut queue: TimerQueue<()> = TimerQueue::new();
        queue.set_now(ms(500));
        queue.set_now(ms(100));
        assert_eq!(queue.now(), ms(500));
    }
}
