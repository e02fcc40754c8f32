//! PendingQueue - events waiting for a ready execution context
//!
//! Append and snapshot share one lock, so an append racing a drain lands
//! either in that drain's snapshot or in the queue for the next one.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::event::HeadlessEvent;

/// Ordered, thread-safe buffer of undelivered events
#[derive(Debug, Default)]
pub struct PendingQueue {
    events: Mutex<VecDeque<HeadlessEvent>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking producer must not wedge every later producer
    fn lock(&self) -> MutexGuard<'_, VecDeque<HeadlessEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append in arrival order, returning the queue depth afterwards
    pub fn append(&self, event: HeadlessEvent) -> usize {
        let mut events = self.lock();
        events.push_back(event);
        let depth = events.len();
        debug!(depth, "PendingQueue::append: queued");
        depth
    }

    /// Take everything queued so far and leave the queue empty
    pub fn drain_snapshot(&self) -> Vec<HeadlessEvent> {
        let snapshot: Vec<_> = self.lock().drain(..).collect();
        debug!(count = snapshot.len(), "PendingQueue::drain_snapshot: taken");
        snapshot
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
