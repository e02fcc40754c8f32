//! Interface to the external tracking engine
//!
//! The engine is a black box that produces [`HeadlessEvent`]s. Live
//! consumers attach per-kind listeners; when nobody is listening the engine
//! hands events to a [`HeadlessReceiver`] instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use crate::event::{EventKind, HeadlessEvent};

/// One-shot delivery callback for a live listener
pub type EventCallback = Arc<dyn Fn(HeadlessEvent) + Send + Sync>;

/// Identifies one listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Listener registration surface of the engine
pub trait LocationEngine: Send + Sync {
    fn add_listener(&self, kind: EventKind, callback: EventCallback) -> eyre::Result<ListenerId>;

    /// Remove a listener; unknown ids are a no-op returning false
    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool;
}

/// Receives events the engine produces while no live listener exists
pub trait HeadlessReceiver: Send + Sync {
    fn on_headless_event(&self, event: HeadlessEvent);
}

/// Where [`InMemoryEngine::emit`] sent an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Live(usize),
    Headless,
    Dropped,
}

type ListenerMap = HashMap<EventKind, Vec<(ListenerId, EventCallback)>>;

/// In-process engine used for tests and the demo
#[derive(Default)]
pub struct InMemoryEngine {
    listeners: Mutex<ListenerMap>,
    next_id: AtomicU64,
    headless: RwLock<Option<Arc<dyn HeadlessReceiver>>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, ListenerMap> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route events with no live listener to `receiver`
    pub fn set_headless_receiver(&self, receiver: Arc<dyn HeadlessReceiver>) {
        debug!("InMemoryEngine::set_headless_receiver: called");
        *self.headless.write().unwrap_or_else(PoisonError::into_inner) = Some(receiver);
    }

    pub fn clear_headless_receiver(&self) {
        *self.headless.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an event as the engine would
    pub fn emit(&self, event: HeadlessEvent) -> Delivery {
        let kind = event.kind();
        // Callbacks run outside the lock so they may add or remove listeners
        let callbacks: Vec<EventCallback> = self
            .listeners()
            .get(&kind)
            .map(|ls| ls.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        if !callbacks.is_empty() {
            let count = callbacks.len();
            for callback in callbacks {
                callback(event.clone());
            }
            return Delivery::Live(count);
        }

        let receiver = self.headless.read().unwrap_or_else(PoisonError::into_inner).clone();
        match receiver {
            Some(receiver) => {
                receiver.on_headless_event(event);
                Delivery::Headless
            }
            None => {
                debug!(%kind, "InMemoryEngine::emit: no listener and no headless receiver");
                Delivery::Dropped
            }
        }
    }
}

impl LocationEngine for InMemoryEngine {
    fn add_listener(&self, kind: EventKind, callback: EventCallback) -> eyre::Result<ListenerId> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        debug!(%kind, %id, "InMemoryEngine::add_listener: called");
        self.listeners().entry(kind).or_default().push((id, callback));
        Ok(id)
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let Some(registered) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(existing, _)| *existing != id);
        let removed = registered.len() < before;
        debug!(%kind, %id, removed, "InMemoryEngine::remove_listener: called");
        removed
    }
}
