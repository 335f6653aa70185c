//! Delayed output for one connection.
//!
//! Entries are kept in deadline order; entries with equal deadlines keep
//! their scheduling order. The lane belongs to the connection driver, so
//! dropping the driver cancels everything still pending.

use eventstate_core::Message;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Messages waiting for their send time.
#[derive(Debug, Default)]
pub struct ScheduledLane {
    queue: VecDeque<(Instant, Message)>,
}

impl ScheduledLane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `message` to be sent `delay` from now.
    pub fn schedule(&mut self, delay: Duration, message: Message) {
        self.schedule_at(Instant::now() + delay, message);
    }

    /// Schedules `message` to be sent at `deadline`.
    pub fn schedule_at(&mut self, deadline: Instant, message: Message) {
        let pos = self
            .queue
            .iter()
            .position(|(d, _)| *d > deadline)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, (deadline, message));
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.front().map(|(d, _)| *d)
    }

    /// Removes and returns every message due at `now`, in order.
    pub fn pop_due(&mut self, now: Instant) -> Vec<Message> {
        let mut due = Vec::new();
        while self.queue.front().is_some_and(|(d, _)| *d <= now) {
            if let Some((_, message)) = self.queue.pop_front() {
                due.push(message);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drops every pending message.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
