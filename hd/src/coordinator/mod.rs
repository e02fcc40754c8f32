//! Lifecycle coordinator
//!
//! Owns the pending queue, readiness gate, launcher and dispatcher for one
//! process incarnation:
//! - **Producers:** `on_event` from any thread queues, launches, drains
//! - **Handshake:** `on_handshake` from the context opens the gate, drains
//! - **Registration:** `register` persists the handle pair
//! - **Subscriptions:** scoped live listeners on the engine

mod config;
mod core;

pub use config::{CoordinatorConfig, RegistrationPolicy};
pub use core::{HeadlessCoordinator, HeadlessCoordinatorBuilder, HeadlessMetrics, RegisterOutcome};
