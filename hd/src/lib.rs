//! Headless - event dispatch and execution-context lifecycle coordinator
//!
//! Events from a tracking engine arrive on arbitrary producer threads. The
//! coordinator queues them, starts the execution context that runs the
//! registered headless entry point (once per process), and drains the queue
//! into it in arrival order after the context reports it is ready.
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted --(first on_event)--> Starting --("initialized")--> Ready
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use handlestore::MemoryHandleStore;
//! use headless::{EntryPointRegistry, HeadlessCoordinator};
//!
//! let registry = EntryPointRegistry::new();
//! let handle = registry.register("on_headless_event", |mut ctx| async move {
//!     ctx.initialized()?;
//!     while let Some(message) = ctx.recv().await {
//!         println!("{} -> client {}", message.event_kind, message.client_handle);
//!     }
//!     Ok(())
//! });
//!
//! let coordinator = HeadlessCoordinator::builder(Arc::new(MemoryHandleStore::default()), registry).build();
//! coordinator.register_handles(handle, 1i64)?;
//! coordinator.on_event(event);
//! ```

pub mod channel;
pub mod cli;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod demo;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event;
pub mod gate;
pub mod launcher;
pub mod queue;
pub mod subscription;

pub use channel::{ControlChannel, ControlMessage, DispatchChannel, DispatchMessage, MpscDispatchChannel};
pub use config::Config;
pub use context::{EntryPoint, EntryPointRegistry, HeadlessContext};
pub use coordinator::{
    CoordinatorConfig, HeadlessCoordinator, HeadlessCoordinatorBuilder, HeadlessMetrics, RegisterOutcome,
    RegistrationPolicy,
};
pub use dispatcher::{Dispatcher, DrainReport};
pub use engine::{Delivery, EventCallback, HeadlessReceiver, InMemoryEngine, ListenerId, LocationEngine};
pub use error::{ControlError, DispatchError, LaunchError, RegistrationError};
pub use event::{EventKind, EventPayload, HeadlessEvent};
pub use gate::{ExecutionContextState, ReadinessGate};
pub use launcher::{ContextSpawner, DispatchTarget, Launcher, ThreadSpawner};
pub use queue::PendingQueue;
pub use subscription::{LiveStreams, Subscription};
