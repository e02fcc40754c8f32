//! HeadlessCoordinator implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use eyre::{Result, eyre};
use handlestore::{CallbackHandleSet, HandleStore, RawHandle};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::config::{CoordinatorConfig, RegistrationPolicy};
use crate::channel::{ControlHandler, ControlMessage, DispatchChannel};
use crate::context::EntryPointRegistry;
use crate::dispatcher::{Dispatcher, DrainReport};
use crate::engine::{EventCallback, HeadlessReceiver, LocationEngine};
use crate::error::{ControlError, LaunchError, RegistrationError};
use crate::event::{EventKind, HeadlessEvent};
use crate::gate::{ExecutionContextState, ReadinessGate};
use crate::launcher::{ContextSpawner, Launcher, ThreadSpawner};
use crate::queue::PendingQueue;
use crate::subscription::Subscription;

/// Result of a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Nothing was stored before
    Registered,
    /// The same pair was already stored
    Unchanged,
    /// A different pair was replaced
    Updated { previous: CallbackHandleSet },
}

/// Snapshot of coordinator counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HeadlessMetrics {
    pub events_received: u64,
    pub events_dispatched: u64,
    pub send_failures: u64,
    pub events_dropped: u64,
    pub contexts_launched: u64,
    pub launch_failures: u64,
    pub handshakes: u64,
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Counters {
    events_received: AtomicU64,
    events_dispatched: AtomicU64,
    send_failures: AtomicU64,
    events_dropped: AtomicU64,
    launch_failures: AtomicU64,
    handshakes: AtomicU64,
}

struct Inner {
    config: CoordinatorConfig,
    store: Arc<dyn HandleStore>,
    queue: PendingQueue,
    gate: ReadinessGate,
    launcher: Launcher,
    dispatcher: Dispatcher,
    engine: Option<Arc<dyn LocationEngine>>,
    registration: Mutex<()>,
    counters: Counters,
}

/// Builder for [`HeadlessCoordinator`]
pub struct HeadlessCoordinatorBuilder {
    store: Arc<dyn HandleStore>,
    entry_points: EntryPointRegistry,
    config: CoordinatorConfig,
    spawner: Option<Arc<dyn ContextSpawner>>,
    engine: Option<Arc<dyn LocationEngine>>,
}

impl HeadlessCoordinatorBuilder {
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Override how the execution context is run (default: [`ThreadSpawner`])
    pub fn spawner(mut self, spawner: Arc<dyn ContextSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Engine used for live subscriptions
    pub fn engine(mut self, engine: Arc<dyn LocationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> HeadlessCoordinator {
        debug!(config = ?self.config, namespace = %self.store.namespace(), "HeadlessCoordinatorBuilder::build: called");
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(ThreadSpawner::new(self.config.context_thread_name.clone())));
        let launcher = Launcher::new(
            Arc::clone(&self.store),
            self.entry_points,
            spawner,
            self.config.dispatch_channel.clone(),
            self.config.control_channel.clone(),
        );
        HeadlessCoordinator {
            inner: Arc::new(Inner {
                config: self.config,
                store: self.store,
                queue: PendingQueue::new(),
                gate: ReadinessGate::new(),
                launcher,
                dispatcher: Dispatcher::new(),
                engine: self.engine,
                registration: Mutex::new(()),
                counters: Counters::default(),
            }),
        }
    }
}

/// Ferries engine events into a lazily started execution context
///
/// Cheap to clone; every clone drives the same process-wide state.
#[derive(Clone)]
pub struct HeadlessCoordinator {
    inner: Arc<Inner>,
}

impl HeadlessCoordinator {
    pub fn builder(store: Arc<dyn HandleStore>, entry_points: EntryPointRegistry) -> HeadlessCoordinatorBuilder {
        HeadlessCoordinatorBuilder {
            store,
            entry_points,
            config: CoordinatorConfig::default(),
            spawner: None,
            engine: None,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Register from method-call arguments `[registrationHandle, clientHandle]`
    pub fn register(&self, args: &[Value]) -> Result<RegisterOutcome, RegistrationError> {
        debug!(argc = args.len(), "HeadlessCoordinator::register: called");
        let [registration, client] = args else {
            return Err(RegistrationError::ArgumentCount(args.len()));
        };
        let registration = RawHandle::try_from(registration)?;
        let client = RawHandle::try_from(client)?;
        self.register_handles(registration, client)
    }

    /// Persist both handles together
    pub fn register_handles(
        &self,
        registration: impl Into<RawHandle>,
        client: impl Into<RawHandle>,
    ) -> Result<RegisterOutcome, RegistrationError> {
        let requested = CallbackHandleSet::from_raw(registration, client);
        debug!(%requested, "HeadlessCoordinator::register_handles: called");

        let _registration = self.inner.registration.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = self
            .inner
            .store
            .get()
            .map_err(|e| RegistrationError::Store(format!("{e:#}")))?;

        let outcome = match existing {
            None => RegisterOutcome::Registered,
            Some(existing) if existing == requested => {
                debug!(%existing, "HeadlessCoordinator::register_handles: already registered");
                return Ok(RegisterOutcome::Unchanged);
            }
            Some(existing) => match self.inner.config.registration_policy {
                RegistrationPolicy::Reject => {
                    warn!(%existing, %requested, "rejecting second registration");
                    return Err(RegistrationError::AlreadyRegistered { existing, requested });
                }
                RegistrationPolicy::Overwrite => RegisterOutcome::Updated { previous: existing },
            },
        };

        self.inner
            .store
            .put(&requested)
            .map_err(|e| RegistrationError::Store(format!("{e:#}")))?;
        self.inner.launcher.update_client(requested.client_handle);

        match outcome {
            RegisterOutcome::Updated { previous } => info!(%previous, %requested, "headless task re-registered"),
            _ => info!(%requested, "headless task registered"),
        }
        Ok(outcome)
    }

    /// Accept one event from any producer thread
    ///
    /// Never fails towards the producer: launch failures drop the event and
    /// are logged.
    pub fn on_event(&self, event: HeadlessEvent) {
        let kind = event.kind();
        self.inner.counters.events_received.fetch_add(1, Ordering::Relaxed);
        debug!(%kind, "HeadlessCoordinator::on_event: called");

        self.reap_exited_context();
        if let Err(e) = self.ensure_started() {
            self.inner.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
            if e.is_unregistered() {
                warn!(%kind, error = %e, "dropping headless event: no valid registration");
            } else {
                error!(%kind, error = %e, "dropping headless event: execution context failed to start");
            }
            return;
        }

        let depth = self.inner.queue.append(event);
        debug!(%kind, depth, state = %self.state(), "HeadlessCoordinator::on_event: queued");
        self.drain_if_ready();
    }

    /// Launch the execution context unless this incarnation already has one
    pub fn ensure_started(&self) -> Result<Arc<dyn DispatchChannel>, LaunchError> {
        let weak = Arc::downgrade(&self.inner);
        let result = self.inner.launcher.ensure_started(move || handshake_handler(weak));
        if result.is_err() {
            self.inner.counters.launch_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Clear a context that exited before its handshake
    ///
    /// Events queued for it can never be delivered and are dropped; the next
    /// `ensure_started` launches a fresh context.
    fn reap_exited_context(&self) {
        let Some(target) = self.inner.launcher.target() else {
            return;
        };
        // The handshake happens before the context can exit, so the gate is
        // checked only once the channel is seen closed.
        if !target.channel.is_closed() || self.inner.gate.is_open() {
            return;
        }
        if !self.inner.launcher.reset(&target.channel) {
            return;
        }
        let stranded = self.inner.queue.drain_snapshot().len();
        let counters = &self.inner.counters;
        counters.launch_failures.fetch_add(1, Ordering::Relaxed);
        counters.events_dropped.fetch_add(stranded as u64, Ordering::Relaxed);
        error!(
            channel = %target.channel.id(),
            stranded,
            "execution context exited before initializing; dropped its queued events"
        );
    }

    /// The context reported it is ready
    pub fn on_handshake(&self) {
        self.inner.counters.handshakes.fetch_add(1, Ordering::Relaxed);
        if self.inner.gate.open() {
            info!(pending = self.inner.queue.len(), "execution context ready");
        } else {
            debug!("HeadlessCoordinator::on_handshake: gate already open");
        }
        self.drain_if_ready();
    }

    /// Deliver everything queued if the context is ready
    pub fn drain_if_ready(&self) -> Option<DrainReport> {
        let target = self.inner.launcher.target()?;
        let report = self
            .inner
            .dispatcher
            .drain_if_ready(&self.inner.gate, &self.inner.queue, &target)?;
        let counters = &self.inner.counters;
        counters
            .events_dispatched
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        counters.send_failures.fetch_add(report.failed as u64, Ordering::Relaxed);
        Some(report)
    }

    pub fn state(&self) -> ExecutionContextState {
        if self.inner.gate.is_open() {
            ExecutionContextState::Ready
        } else if self.inner.launcher.is_started() {
            ExecutionContextState::Starting
        } else {
            ExecutionContextState::NotStarted
        }
    }

    /// Events queued and not yet drained
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn metrics(&self) -> HeadlessMetrics {
        let counters = &self.inner.counters;
        HeadlessMetrics {
            events_received: counters.events_received.load(Ordering::Relaxed),
            events_dispatched: counters.events_dispatched.load(Ordering::Relaxed),
            send_failures: counters.send_failures.load(Ordering::Relaxed),
            events_dropped: counters.events_dropped.load(Ordering::Relaxed),
            contexts_launched: self.inner.launcher.launches(),
            launch_failures: counters.launch_failures.load(Ordering::Relaxed),
            handshakes: counters.handshakes.load(Ordering::Relaxed),
            pending: self.inner.queue.len(),
        }
    }

    /// Listen for live events of `kind` on the attached engine
    pub fn subscribe(&self, kind: EventKind, callback: EventCallback) -> Result<Subscription> {
        let engine = self
            .inner
            .engine
            .as_ref()
            .ok_or_else(|| eyre!("no location engine attached"))?;
        Subscription::acquire(Arc::clone(engine), kind, callback)
    }
}

impl HeadlessReceiver for HeadlessCoordinator {
    fn on_headless_event(&self, event: HeadlessEvent) {
        self.on_event(event);
    }
}

impl std::fmt::Debug for HeadlessCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessCoordinator")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Control handler bound into a launched context
///
/// Holds the coordinator weakly so a running context does not keep it alive.
fn handshake_handler(inner: Weak<Inner>) -> ControlHandler {
    Arc::new(move |message: ControlMessage| -> Result<(), ControlError> {
        let inner = inner.upgrade().ok_or(ControlError::Closed)?;
        match message {
            ControlMessage::Initialized => HeadlessCoordinator { inner }.on_handshake(),
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EntryPoint, HeadlessContext};
    use crate::engine::InMemoryEngine;
    use crate::event::EventPayload;
    use crate::subscription::LiveStreams;
    use handlestore::MemoryHandleStore;
    use serde_json::json;
    use std::sync::Barrier;
    use std::thread;

    /// Holds launched contexts so tests drive the handshake themselves
    #[derive(Default)]
    struct ManualSpawner {
        contexts: Mutex<Vec<HeadlessContext>>,
    }

    impl ManualSpawner {
        fn spawned(&self) -> usize {
            self.contexts.lock().unwrap().len()
        }

        fn take(&self) -> HeadlessContext {
            self.contexts.lock().unwrap().remove(0)
        }
    }

    impl ContextSpawner for ManualSpawner {
        fn spawn(&self, _name: &str, _entry: EntryPoint, ctx: HeadlessContext) -> Result<(), LaunchError> {
            self.contexts.lock().unwrap().push(ctx);
            Ok(())
        }
    }

    struct Fixture {
        coordinator: HeadlessCoordinator,
        spawner: Arc<ManualSpawner>,
        store: Arc<MemoryHandleStore>,
        handle: i64,
    }

    fn fixture_with(store: Arc<MemoryHandleStore>, config: CoordinatorConfig) -> Fixture {
        let registry = EntryPointRegistry::new();
        let handle = registry.register("on_headless_event", |_ctx| async { Ok(()) });
        let spawner = Arc::new(ManualSpawner::default());
        let coordinator = HeadlessCoordinator::builder(store.clone(), registry)
            .config(config)
            .spawner(spawner.clone())
            .build();
        Fixture {
            coordinator,
            spawner,
            store,
            handle,
        }
    }

    fn registered() -> Fixture {
        let fixture = fixture_with(Arc::new(MemoryHandleStore::default()), CoordinatorConfig::default());
        fixture.coordinator.register_handles(fixture.handle, 77i64).unwrap();
        fixture
    }

    fn event(n: u64) -> HeadlessEvent {
        HeadlessEvent::new(EventPayload::Schedule(json!({ "n": n })))
    }

    fn received(ctx: &mut HeadlessContext) -> Vec<u64> {
        std::iter::from_fn(|| ctx.try_recv())
            .map(|m| m.payload["n"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_events_before_handshake_arrive_in_order() {
        let f = registered();
        for n in 0..10 {
            f.coordinator.on_event(event(n));
        }
        assert_eq!(f.coordinator.state(), ExecutionContextState::Starting);
        assert_eq!(f.coordinator.pending(), 10);

        let mut ctx = f.spawner.take();
        assert!(ctx.try_recv().is_none());
        ctx.initialized().unwrap();

        assert_eq!(f.coordinator.state(), ExecutionContextState::Ready);
        assert_eq!(received(&mut ctx), (0..10).collect::<Vec<_>>());
        assert_eq!(f.coordinator.pending(), 0);
    }

    #[test]
    fn test_concurrent_producers_keep_per_thread_order() {
        let f = registered();
        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let coordinator = f.coordinator.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        coordinator.on_event(event(p * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in producers {
            handle.join().unwrap();
        }

        let mut ctx = f.spawner.take();
        ctx.initialized().unwrap();
        let delivered = received(&mut ctx);
        assert_eq!(delivered.len(), 200);
        for p in 0..4u64 {
            let mine: Vec<_> = delivered.iter().copied().filter(|n| n / 1000 == p).collect();
            assert_eq!(mine, (0..50).map(|i| p * 1000 + i).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_racing_producers_construct_one_context() {
        let f = registered();
        let barrier = Arc::new(Barrier::new(16));
        let producers: Vec<_> = (0..16u64)
            .map(|n| {
                let coordinator = f.coordinator.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    coordinator.on_event(event(n));
                })
            })
            .collect();
        for handle in producers {
            handle.join().unwrap();
        }

        assert_eq!(f.spawner.spawned(), 1);
        assert_eq!(f.coordinator.metrics().contexts_launched, 1);
        assert_eq!(f.coordinator.pending(), 16);
    }

    #[test]
    fn test_context_exiting_before_handshake_is_relaunched() {
        let f = registered();
        for n in 0..3 {
            f.coordinator.on_event(event(n));
        }
        assert_eq!(f.coordinator.pending(), 3);

        // Entry point returned without ever initializing
        drop(f.spawner.take());
        f.coordinator.on_event(event(3));

        let metrics = f.coordinator.metrics();
        assert_eq!(metrics.events_dropped, 3);
        assert_eq!(metrics.launch_failures, 1);
        assert_eq!(metrics.contexts_launched, 2);
        assert_eq!(f.coordinator.pending(), 1);
        assert_eq!(f.coordinator.state(), ExecutionContextState::Starting);

        let mut ctx = f.spawner.take();
        ctx.initialized().unwrap();
        assert_eq!(received(&mut ctx), vec![3]);
        assert_eq!(f.coordinator.state(), ExecutionContextState::Ready);
    }

    #[test]
    fn test_context_exiting_after_handshake_is_not_relaunched() {
        let f = registered();
        f.coordinator.on_event(event(1));
        let mut ctx = f.spawner.take();
        ctx.initialized().unwrap();
        assert_eq!(received(&mut ctx), vec![1]);
        drop(ctx);

        f.coordinator.on_event(event(2));
        let metrics = f.coordinator.metrics();
        assert_eq!(metrics.contexts_launched, 1);
        assert_eq!(metrics.send_failures, 1);
        assert_eq!(f.spawner.spawned(), 0);
    }

    #[test]
    fn test_inline_handshake_during_launch() {
        /// Completes the handshake before returning from `spawn`
        #[derive(Default)]
        struct InlineSpawner {
            held: Mutex<Vec<HeadlessContext>>,
        }

        impl ContextSpawner for InlineSpawner {
            fn spawn(&self, _name: &str, _entry: EntryPoint, ctx: HeadlessContext) -> Result<(), LaunchError> {
                ctx.initialized().map_err(|e| LaunchError::Construction(e.to_string()))?;
                self.held.lock().unwrap().push(ctx);
                Ok(())
            }
        }

        let registry = EntryPointRegistry::new();
        let handle = registry.register("on_headless_event", |_ctx| async { Ok(()) });
        let coordinator = HeadlessCoordinator::builder(Arc::new(MemoryHandleStore::default()), registry)
            .spawner(Arc::new(InlineSpawner::default()))
            .build();
        coordinator.register_handles(handle, 77i64).unwrap();

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = coordinator.clone();
        thread::spawn(move || {
            worker.on_event(event(1));
            done_tx.send(()).unwrap();
        });
        done_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();

        assert_eq!(coordinator.state(), ExecutionContextState::Ready);
        let metrics = coordinator.metrics();
        assert_eq!(metrics.handshakes, 1);
        assert_eq!(metrics.events_dispatched, 1);
    }

    #[test]
    fn test_redundant_drain_delivers_once() {
        let f = registered();
        f.coordinator.on_event(event(1));
        f.coordinator.on_event(event(2));
        let mut ctx = f.spawner.take();
        ctx.initialized().unwrap();

        assert_eq!(f.coordinator.drain_if_ready().unwrap().total(), 0);
        assert_eq!(f.coordinator.drain_if_ready().unwrap().total(), 0);
        assert_eq!(received(&mut ctx), vec![1, 2]);
        assert_eq!(f.coordinator.metrics().events_dispatched, 2);
    }

    #[test]
    fn test_drain_before_launch_is_a_noop() {
        let f = registered();
        assert!(f.coordinator.drain_if_ready().is_none());
        assert_eq!(f.coordinator.state(), ExecutionContextState::NotStarted);
    }

    #[test]
    fn test_three_events_while_starting() {
        let f = registered();
        f.coordinator.ensure_started().unwrap();
        assert_eq!(f.coordinator.state(), ExecutionContextState::Starting);

        for n in [5, 6, 7] {
            f.coordinator.on_event(event(n));
        }
        assert_eq!(f.coordinator.pending(), 3);

        let mut ctx = f.spawner.take();
        ctx.initialized().unwrap();
        assert_eq!(received(&mut ctx), vec![5, 6, 7]);
    }

    #[test]
    fn test_events_after_ready_drain_immediately() {
        let f = registered();
        f.coordinator.ensure_started().unwrap();
        let mut ctx = f.spawner.take();
        ctx.initialized().unwrap();

        f.coordinator.on_event(event(1));
        assert_eq!(received(&mut ctx), vec![1]);
        f.coordinator.on_event(event(2));
        assert_eq!(received(&mut ctx), vec![2]);
    }

    #[test]
    fn test_unregistered_event_is_dropped_then_recovers() {
        let f = fixture_with(Arc::new(MemoryHandleStore::default()), CoordinatorConfig::default());
        assert!(matches!(f.coordinator.ensure_started(), Err(LaunchError::Unregistered)));

        f.coordinator.on_event(event(1));
        let metrics = f.coordinator.metrics();
        assert_eq!(metrics.events_dropped, 1);
        assert_eq!(metrics.launch_failures, 2);
        assert_eq!(f.coordinator.pending(), 0);
        assert_eq!(f.coordinator.state(), ExecutionContextState::NotStarted);
        assert_eq!(f.spawner.spawned(), 0);

        f.coordinator.register_handles(f.handle, 77i64).unwrap();
        f.coordinator.on_event(event(2));
        let mut ctx = f.spawner.take();
        ctx.initialized().unwrap();
        assert_eq!(received(&mut ctx), vec![2]);
    }

    #[test]
    fn test_new_incarnation_reads_persisted_handles() {
        let store = Arc::new(MemoryHandleStore::default());
        let first = fixture_with(store.clone(), CoordinatorConfig::default());
        first.coordinator.register_handles(first.handle, 77i64).unwrap();
        drop(first);

        // Fresh in-memory state, same durable store, no registration call
        let second = fixture_with(store, CoordinatorConfig::default());
        assert_eq!(second.coordinator.state(), ExecutionContextState::NotStarted);
        second.coordinator.on_event(event(9));
        let mut ctx = second.spawner.take();
        assert_eq!(ctx.registration_handle(), second.handle);
        ctx.initialized().unwrap();

        let message = ctx.try_recv().unwrap();
        assert_eq!(message.client_handle, 77);
        assert_eq!(message.event_kind, "schedule");
    }

    #[test]
    fn test_register_argument_forms() {
        let f = fixture_with(Arc::new(MemoryHandleStore::default()), CoordinatorConfig::default());
        assert!(matches!(
            f.coordinator.register(&[json!(1)]),
            Err(RegistrationError::ArgumentCount(1))
        ));
        assert!(matches!(
            f.coordinator.register(&[json!("1"), json!(2)]),
            Err(RegistrationError::InvalidHandle(_))
        ));
        assert!(f.store.get().unwrap().is_none());

        let outcome = f.coordinator.register(&[json!(f.handle), json!(3_000_000_000i64)]).unwrap();
        assert_eq!(outcome, RegisterOutcome::Registered);
        assert_eq!(
            f.store.get().unwrap(),
            Some(CallbackHandleSet::new(f.handle, 3_000_000_000))
        );
    }

    #[test]
    fn test_double_registration_overwrite_policy() {
        let f = registered();
        assert_eq!(
            f.coordinator.register_handles(f.handle, 77i64).unwrap(),
            RegisterOutcome::Unchanged
        );
        assert_eq!(
            f.coordinator.register_handles(f.handle, 78i64).unwrap(),
            RegisterOutcome::Updated {
                previous: CallbackHandleSet::new(f.handle, 77)
            }
        );
        assert_eq!(f.store.get().unwrap(), Some(CallbackHandleSet::new(f.handle, 78)));
    }

    #[test]
    fn test_double_registration_reject_policy() {
        let config = CoordinatorConfig {
            registration_policy: RegistrationPolicy::Reject,
            ..Default::default()
        };
        let f = fixture_with(Arc::new(MemoryHandleStore::default()), config);
        f.coordinator.register_handles(f.handle, 77i64).unwrap();
        assert_eq!(
            f.coordinator.register_handles(f.handle, 77i64).unwrap(),
            RegisterOutcome::Unchanged
        );

        let err = f.coordinator.register_handles(f.handle, 78i64).unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyRegistered { .. }));
        assert_eq!(f.store.get().unwrap(), Some(CallbackHandleSet::new(f.handle, 77)));
    }

    #[test]
    fn test_new_client_handle_applies_to_later_drains() {
        let f = registered();
        f.coordinator.on_event(event(1));
        let mut ctx = f.spawner.take();
        ctx.initialized().unwrap();
        assert_eq!(ctx.try_recv().unwrap().client_handle, 77);

        f.coordinator.register_handles(f.handle, 88i64).unwrap();
        f.coordinator.on_event(event(2));
        assert_eq!(ctx.try_recv().unwrap().client_handle, 88);
    }

    #[test]
    fn test_control_channel_rejects_unknown_methods() {
        let f = registered();
        f.coordinator.ensure_started().unwrap();
        let ctx = f.spawner.take();

        assert_eq!(
            ctx.invoke("getState"),
            Err(ControlError::NotImplemented("getState".to_string()))
        );
        assert_eq!(f.coordinator.state(), ExecutionContextState::Starting);
        ctx.invoke("initialized").unwrap();
        ctx.initialized().unwrap();
        assert_eq!(f.coordinator.metrics().handshakes, 2);
    }

    #[test]
    fn test_handshake_after_coordinator_dropped() {
        let f = registered();
        f.coordinator.ensure_started().unwrap();
        let ctx = f.spawner.take();
        drop(f);
        assert_eq!(ctx.initialized(), Err(ControlError::Closed));
    }

    #[test]
    fn test_subscribe_requires_engine() {
        let f = registered();
        assert!(f.coordinator.subscribe(EventKind::Location, Arc::new(|_: HeadlessEvent| {})).is_err());
    }

    #[test]
    fn test_live_streams_attach_and_detach() {
        let engine = Arc::new(InMemoryEngine::new());
        let registry = EntryPointRegistry::new();
        let coordinator = HeadlessCoordinator::builder(Arc::new(MemoryHandleStore::default()), registry)
            .spawner(Arc::new(ManualSpawner::default()))
            .engine(engine.clone())
            .build();

        let streams = LiveStreams::new();
        assert_eq!(streams.subscribe_all(&coordinator, |_| {}).unwrap(), EventKind::ALL.len());
        assert_eq!(streams.subscribe_all(&coordinator, |_| {}).unwrap(), 0);
        assert!(EventKind::ALL.iter().all(|k| engine.listener_count(*k) == 1));

        assert_eq!(streams.cancel_all(), EventKind::ALL.len());
        assert_eq!(streams.cancel_all(), 0);
        assert!(EventKind::ALL.iter().all(|k| engine.listener_count(*k) == 0));
    }
}
