//! HeadlessContext - consumer-side interface of the execution context
//!
//! The entry point resolved from the registration handle receives a
//! [`HeadlessContext`]. It signals readiness with [`HeadlessContext::initialized`]
//! and then reads [`DispatchMessage`]s in delivery order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::channel::{ControlChannel, DispatchMessage, METHOD_INITIALIZED};
use crate::error::ControlError;

/// Code run inside the execution context
pub type EntryPoint = Arc<dyn Fn(HeadlessContext) -> BoxFuture<'static, eyre::Result<()>> + Send + Sync>;

/// Handle given to the entry point running in the execution context
pub struct HeadlessContext {
    registration_handle: i64,
    dispatch_id: String,
    rx: mpsc::UnboundedReceiver<DispatchMessage>,
    control: ControlChannel,
}

impl HeadlessContext {
    pub(crate) fn new(
        registration_handle: i64,
        dispatch_id: String,
        rx: mpsc::UnboundedReceiver<DispatchMessage>,
        control: ControlChannel,
    ) -> Self {
        debug!(registration_handle, %dispatch_id, "HeadlessContext::new: called");
        Self {
            registration_handle,
            dispatch_id,
            rx,
            control,
        }
    }

    /// Handle this context was launched for
    pub fn registration_handle(&self) -> i64 {
        self.registration_handle
    }

    pub fn dispatch_channel_id(&self) -> &str {
        &self.dispatch_id
    }

    pub fn control_channel_id(&self) -> &str {
        self.control.id()
    }

    /// Tell the coordinator this context is ready to receive events
    pub fn initialized(&self) -> Result<(), ControlError> {
        debug!(registration_handle = self.registration_handle, "HeadlessContext::initialized: called");
        self.control.invoke(METHOD_INITIALIZED)
    }

    /// Invoke a control method by name
    pub fn invoke(&self, method: &str) -> Result<(), ControlError> {
        self.control.invoke(method)
    }

    /// Receive the next dispatched event
    ///
    /// Returns None once the coordinator side is gone.
    pub async fn recv(&mut self) -> Option<DispatchMessage> {
        self.rx.recv().await
    }

    /// Receive without waiting
    pub fn try_recv(&mut self) -> Option<DispatchMessage> {
        self.rx.try_recv().ok()
    }
}

impl std::fmt::Debug for HeadlessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessContext")
            .field("registration_handle", &self.registration_handle)
            .field("dispatch_id", &self.dispatch_id)
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct NamedEntryPoint {
    name: String,
    entry: EntryPoint,
}

/// Resolves registration handles to entry points
///
/// Handles derive from the entry point's name, so a handle persisted by one
/// process incarnation resolves again in the next one once the same name is
/// registered.
#[derive(Clone, Default)]
pub struct EntryPointRegistry {
    entries: Arc<RwLock<HashMap<i64, NamedEntryPoint>>>,
}

impl EntryPointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable handle for an entry point name
    pub fn handle_for(name: &str) -> i64 {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes());
        let mut high = [0u8; 8];
        high.copy_from_slice(&uuid.as_bytes()[..8]);
        i64::from_be_bytes(high) & i64::MAX
    }

    /// Register an entry point under `name`, returning its handle
    pub fn register<F, Fut>(&self, name: &str, entry: F) -> i64
    where
        F: Fn(HeadlessContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        let handle = Self::handle_for(name);
        let entry: EntryPoint = Arc::new(move |ctx| entry(ctx).boxed());
        debug!(%name, handle, "EntryPointRegistry::register: called");
        self.entries.write().unwrap_or_else(PoisonError::into_inner).insert(
            handle,
            NamedEntryPoint {
                name: name.to_string(),
                entry,
            },
        );
        handle
    }

    /// Look up the entry point for a registration handle
    pub fn resolve(&self, handle: i64) -> Option<(String, EntryPoint)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .map(|e| (e.name.clone(), Arc::clone(&e.entry)))
    }

    /// Registered `(name, handle)` pairs, sorted by name
    pub fn names(&self) -> Vec<(String, i64)> {
        let mut names: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(handle, e)| (e.name.clone(), *handle))
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for EntryPointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPointRegistry").field("entries", &self.names()).finish()
    }
}
