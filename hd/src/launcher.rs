//! Execution context launcher
//!
//! Starts the execution context at most once per process incarnation.
//! Construction is serialized by a mutex: the first caller constructs while
//! the rest block on it and then reuse the same channel. The resulting
//! [`DispatchTarget`] is published under a separate lock so the handshake
//! path can read it while construction is still in progress. A failed
//! launch, or a context that exits before its handshake, leaves the slot
//! empty so a later call can retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;

use handlestore::HandleStore;
use tracing::{debug, error, info};

use crate::channel::{ControlChannel, ControlHandler, DispatchChannel, MpscDispatchChannel};
use crate::context::{EntryPoint, EntryPointRegistry, HeadlessContext};
use crate::error::LaunchError;

/// Runs an entry point inside a fresh execution context
///
/// `spawn` must return once the context is running and must not wait for the
/// handshake. The context may complete its handshake before `spawn` returns.
pub trait ContextSpawner: Send + Sync {
    fn spawn(&self, name: &str, entry: EntryPoint, ctx: HeadlessContext) -> Result<(), LaunchError>;
}

/// Runs each context on its own named OS thread with a current-thread runtime
#[derive(Debug, Clone)]
pub struct ThreadSpawner {
    thread_name: String,
}

impl ThreadSpawner {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl ContextSpawner for ThreadSpawner {
    fn spawn(&self, name: &str, entry: EntryPoint, ctx: HeadlessContext) -> Result<(), LaunchError> {
        debug!(%name, thread = %self.thread_name, "ThreadSpawner::spawn: called");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| LaunchError::Construction(format!("failed to build context runtime: {e}")))?;

        let name = name.to_string();
        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                info!(%name, "execution context started");
                match runtime.block_on(entry(ctx)) {
                    Ok(()) => info!(%name, "execution context finished"),
                    Err(e) => error!(%name, error = %e, "entry point failed"),
                }
            })
            .map_err(|e| LaunchError::Construction(format!("failed to spawn context thread: {e}")))?;
        Ok(())
    }
}

/// Where a drain delivers to
#[derive(Clone)]
pub struct DispatchTarget {
    pub channel: Arc<dyn DispatchChannel>,
    pub client_handle: i64,
}

impl std::fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTarget")
            .field("channel", &self.channel.id())
            .field("client_handle", &self.client_handle)
            .finish()
    }
}

pub struct Launcher {
    store: Arc<dyn HandleStore>,
    entry_points: EntryPointRegistry,
    spawner: Arc<dyn ContextSpawner>,
    dispatch_id: String,
    control_id: String,
    launching: Mutex<()>,
    target: RwLock<Option<DispatchTarget>>,
    launches: AtomicU64,
}

impl Launcher {
    pub fn new(
        store: Arc<dyn HandleStore>,
        entry_points: EntryPointRegistry,
        spawner: Arc<dyn ContextSpawner>,
        dispatch_id: impl Into<String>,
        control_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            entry_points,
            spawner,
            dispatch_id: dispatch_id.into(),
            control_id: control_id.into(),
            launching: Mutex::new(()),
            target: RwLock::new(None),
            launches: AtomicU64::new(0),
        }
    }

    fn publish(&self, target: Option<DispatchTarget>) {
        *self.target.write().unwrap_or_else(PoisonError::into_inner) = target;
    }

    /// Launch the context unless already launched, returning its channel
    ///
    /// `control` is only called when a context is actually constructed.
    pub fn ensure_started<F>(&self, control: F) -> Result<Arc<dyn DispatchChannel>, LaunchError>
    where
        F: FnOnce() -> ControlHandler,
    {
        let _launching = self.launching.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(target) = self.target() {
            return Ok(target.channel);
        }
        debug!("Launcher::ensure_started: constructing execution context");

        let handles = self
            .store
            .get()
            .map_err(|e| LaunchError::HandleStore(format!("{e:#}")))?
            .ok_or(LaunchError::Unregistered)?;
        let (name, entry) = self
            .entry_points
            .resolve(handles.registration_handle)
            .ok_or(LaunchError::UnknownEntryPoint(handles.registration_handle))?;

        let (channel, rx) = MpscDispatchChannel::new(self.dispatch_id.clone());
        let ctx = HeadlessContext::new(
            handles.registration_handle,
            self.dispatch_id.clone(),
            rx,
            ControlChannel::new(self.control_id.clone(), control()),
        );

        // Published before spawn: an inline handshake drains through it
        let channel: Arc<dyn DispatchChannel> = Arc::new(channel);
        self.publish(Some(DispatchTarget {
            channel: Arc::clone(&channel),
            client_handle: handles.client_handle,
        }));
        if let Err(e) = self.spawner.spawn(&name, entry, ctx) {
            self.publish(None);
            return Err(e);
        }

        let launches = self.launches.fetch_add(1, Ordering::Relaxed) + 1;
        info!(%name, %handles, launches, "execution context launched");
        Ok(channel)
    }

    /// Forget a context whose channel is `channel` so the next call relaunches
    ///
    /// Returns false when a different context is current (or none is).
    pub fn reset(&self, channel: &Arc<dyn DispatchChannel>) -> bool {
        let _launching = self.launching.lock().unwrap_or_else(PoisonError::into_inner);
        let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
        match target.as_ref() {
            Some(current) if Arc::ptr_eq(&current.channel, channel) => {
                debug!(channel = %channel.id(), "Launcher::reset: clearing launched context");
                *target = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.target.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Current dispatch target, `None` before launch
    pub fn target(&self) -> Option<DispatchTarget> {
        self.target.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Point subsequent drains at a new client handle
    pub fn update_client(&self, client_handle: i64) {
        let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(target) = target.as_mut() {
            debug!(from = target.client_handle, to = client_handle, "Launcher::update_client: called");
            target.client_handle = client_handle;
        }
    }

    /// Number of contexts constructed by this launcher
    pub fn launches(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ControlMessage;
    use crate::error::ControlError;
    use handlestore::{CallbackHandleSet, MemoryHandleStore};

    /// Records contexts instead of running them
    #[derive(Default)]
    struct HoldingSpawner {
        contexts: Mutex<Vec<HeadlessContext>>,
    }

    impl ContextSpawner for HoldingSpawner {
        fn spawn(&self, _name: &str, _entry: EntryPoint, ctx: HeadlessContext) -> Result<(), LaunchError> {
            self.contexts.lock().unwrap().push(ctx);
            Ok(())
        }
    }

    struct FailingSpawner;

    impl ContextSpawner for FailingSpawner {
        fn spawn(&self, _name: &str, _entry: EntryPoint, _ctx: HeadlessContext) -> Result<(), LaunchError> {
            Err(LaunchError::Construction("no threads left".to_string()))
        }
    }

    /// Completes the handshake before returning from `spawn`
    struct InlineHandshakeSpawner;

    impl ContextSpawner for InlineHandshakeSpawner {
        fn spawn(&self, _name: &str, _entry: EntryPoint, ctx: HeadlessContext) -> Result<(), LaunchError> {
            ctx.initialized().map_err(|e| LaunchError::Construction(e.to_string()))
        }
    }

    fn noop_handler() -> ControlHandler {
        Arc::new(|_: ControlMessage| -> Result<(), ControlError> { Ok(()) })
    }

    fn launcher(store: Arc<MemoryHandleStore>, spawner: Arc<dyn ContextSpawner>) -> (Launcher, i64) {
        let registry = EntryPointRegistry::new();
        let handle = registry.register("task", |_ctx| async { Ok(()) });
        (
            Launcher::new(store, registry, spawner, "test/dispatch", "test/control"),
            handle,
        )
    }

    #[test]
    fn test_unregistered_store_fails_fast() {
        let store = Arc::new(MemoryHandleStore::default());
        let (launcher, _) = launcher(store, Arc::new(HoldingSpawner::default()));

        let err = launcher.ensure_started(noop_handler).err().unwrap();
        assert!(matches!(err, LaunchError::Unregistered));
        assert!(!launcher.is_started());
    }

    #[test]
    fn test_unknown_registration_handle() {
        let store = Arc::new(MemoryHandleStore::default());
        let (launcher, handle) = launcher(Arc::clone(&store), Arc::new(HoldingSpawner::default()));
        store.put(&CallbackHandleSet::new(handle + 1, 9)).unwrap();

        let err = launcher.ensure_started(noop_handler).err().unwrap();
        assert!(matches!(err, LaunchError::UnknownEntryPoint(h) if h == handle + 1));
    }

    #[test]
    fn test_second_call_reuses_channel() {
        let store = Arc::new(MemoryHandleStore::default());
        let spawner = Arc::new(HoldingSpawner::default());
        let (launcher, handle) = launcher(Arc::clone(&store), spawner.clone());
        store.put(&CallbackHandleSet::new(handle, 9)).unwrap();

        let first = launcher.ensure_started(noop_handler).unwrap();
        let second = launcher.ensure_started(|| panic!("must not build a second handler")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.launches(), 1);
        assert_eq!(spawner.contexts.lock().unwrap().len(), 1);
        assert_eq!(launcher.target().unwrap().client_handle, 9);
    }

    #[test]
    fn test_construction_failure_allows_retry() {
        let store = Arc::new(MemoryHandleStore::default());
        let (launcher, handle) = launcher(Arc::clone(&store), Arc::new(FailingSpawner));
        store.put(&CallbackHandleSet::new(handle, 9)).unwrap();

        for _ in 0..2 {
            let err = launcher.ensure_started(noop_handler).err().unwrap();
            assert!(matches!(err, LaunchError::Construction(_)));
        }
        assert!(!launcher.is_started());
        assert_eq!(launcher.launches(), 0);
    }

    #[test]
    fn test_target_readable_during_spawn() {
        let store = Arc::new(MemoryHandleStore::default());
        let (launcher, handle) = launcher(Arc::clone(&store), Arc::new(InlineHandshakeSpawner));
        let launcher = Arc::new(launcher);
        store.put(&CallbackHandleSet::new(handle, 9)).unwrap();

        let seen = Arc::new(Mutex::new(None));
        let (l, s) = (Arc::clone(&launcher), Arc::clone(&seen));
        let handler = move || -> ControlHandler {
            Arc::new(move |_: ControlMessage| -> Result<(), ControlError> {
                *s.lock().unwrap() = l.target().map(|t| t.client_handle);
                Ok(())
            })
        };

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = Arc::clone(&launcher);
        thread::spawn(move || done_tx.send(worker.ensure_started(handler).is_ok()).unwrap());
        assert!(done_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap());
        assert_eq!(*seen.lock().unwrap(), Some(9));
        assert_eq!(launcher.launches(), 1);
    }

    #[test]
    fn test_reset_allows_relaunch() {
        let store = Arc::new(MemoryHandleStore::default());
        let spawner = Arc::new(HoldingSpawner::default());
        let (launcher, handle) = launcher(Arc::clone(&store), spawner.clone());
        store.put(&CallbackHandleSet::new(handle, 9)).unwrap();

        let first = launcher.ensure_started(noop_handler).unwrap();
        let (stale, _rx) = MpscDispatchChannel::new("test/dispatch");
        assert!(!launcher.reset(&(Arc::new(stale) as Arc<dyn DispatchChannel>)));
        assert!(launcher.is_started());

        assert!(launcher.reset(&first));
        assert!(!launcher.is_started());
        assert!(!launcher.reset(&first));

        let second = launcher.ensure_started(noop_handler).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.launches(), 2);
        assert_eq!(spawner.contexts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_update_client_after_launch() {
        let store = Arc::new(MemoryHandleStore::default());
        let (launcher, handle) = launcher(Arc::clone(&store), Arc::new(HoldingSpawner::default()));
        launcher.update_client(5);
        assert!(launcher.target().is_none());

        store.put(&CallbackHandleSet::new(handle, 9)).unwrap();
        launcher.ensure_started(noop_handler).unwrap();
        launcher.update_client(5);
        assert_eq!(launcher.target().unwrap().client_handle, 5);
    }

    #[test]
    fn test_thread_spawner_runs_entry_point() {
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        let registry = EntryPointRegistry::new();
        let handle = registry.register("task", move |ctx| {
            let sent = tx
                .lock()
                .unwrap()
                .send((ctx.registration_handle(), thread::current().name().map(str::to_string)));
            async move {
                sent?;
                Ok(())
            }
        });
        let (_, entry) = registry.resolve(handle).unwrap();
        let (_channel, drx) = MpscDispatchChannel::new("test/dispatch");
        let ctx = HeadlessContext::new(3, "test/dispatch".to_string(), drx, ControlChannel::new("c", noop_handler()));

        ThreadSpawner::new("headless-test").spawn("task", entry, ctx).unwrap();
        let (handle, thread_name) = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(handle, 3);
        assert_eq!(thread_name.as_deref(), Some("headless-test"));
    }
}
