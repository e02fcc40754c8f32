//! Scoped listener registrations with the engine

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use eyre::Result;
use tracing::{debug, info};

use crate::coordinator::HeadlessCoordinator;
use crate::engine::{EventCallback, ListenerId, LocationEngine};
use crate::event::{EventKind, HeadlessEvent};

/// A live listener registration, released exactly once
///
/// Dropping the subscription cancels it, so the listener is torn down on
/// every exit path. Cancelling again is a no-op.
pub struct Subscription {
    engine: Arc<dyn LocationEngine>,
    kind: EventKind,
    id: ListenerId,
    cancelled: AtomicBool,
}

impl Subscription {
    /// Register `callback` for `kind` with the engine
    pub fn acquire(engine: Arc<dyn LocationEngine>, kind: EventKind, callback: EventCallback) -> Result<Self> {
        let id = engine.add_listener(kind, callback)?;
        debug!(%kind, %id, "Subscription::acquire: called");
        Ok(Self {
            engine,
            kind,
            id,
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Release the listener; true only for the call that released it
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let removed = self.engine.remove_listener(self.kind, self.id);
        debug!(kind = %self.kind, id = %self.id, removed, "Subscription::cancel: released");
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// One subscription per event kind for an attached foreground consumer
#[derive(Debug, Default)]
pub struct LiveStreams {
    active: Mutex<BTreeMap<EventKind, Subscription>>,
}

impl LiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach: subscribe `sink` to every kind not already subscribed
    ///
    /// Returns how many new subscriptions were made. On error the kinds
    /// subscribed so far stay active until [`LiveStreams::cancel_all`].
    pub fn subscribe_all<F>(&self, coordinator: &HeadlessCoordinator, sink: F) -> Result<usize>
    where
        F: Fn(HeadlessEvent) + Send + Sync + 'static,
    {
        let sink: EventCallback = Arc::new(sink);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for kind in EventKind::ALL {
            if active.contains_key(&kind) {
                continue;
            }
            active.insert(kind, coordinator.subscribe(kind, Arc::clone(&sink))?);
            added += 1;
        }
        info!(added, total = active.len(), "live streams attached");
        Ok(added)
    }

    /// Detach: cancel every subscription, returning how many were released
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = std::mem::take(&mut *self.active.lock().unwrap_or_else(PoisonError::into_inner))
            .into_values()
            .collect();
        let released = drained.iter().filter(|s| s.cancel()).count();
        info!(released, "live streams detached");
        released
    }

    pub fn len(&self) -> usize {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
