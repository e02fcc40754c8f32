//! Dispatcher - drains the pending queue into the dispatch channel

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, error};

use crate::channel::{DispatchChannel, DispatchMessage};
use crate::error::DispatchError;
use crate::event::HeadlessEvent;
use crate::gate::ReadinessGate;
use crate::launcher::DispatchTarget;
use crate::queue::PendingQueue;

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Serializes drains so snapshots go out whole and in order
///
/// Delivery is at-most-once: a snapshot is cleared from the queue before the
/// first send and failed events are never re-queued.
#[derive(Debug, Default)]
pub struct Dispatcher {
    drain_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the queue if the gate is open; `None` when it is closed
    pub fn drain_if_ready(
        &self,
        gate: &ReadinessGate,
        queue: &PendingQueue,
        target: &DispatchTarget,
    ) -> Option<DrainReport> {
        if !gate.is_open() {
            debug!(pending = queue.len(), "Dispatcher::drain_if_ready: gate closed");
            return None;
        }
        // Held across snapshot and sends so a concurrent drain cannot interleave
        let _drain = self.drain_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = queue.drain_snapshot();
        let mut report = DrainReport::default();
        for event in &snapshot {
            match send_one(target.channel.as_ref(), target.client_handle, event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(kind = %event.kind(), error = %e, "failed to dispatch headless event");
                }
            }
        }
        if report.total() > 0 {
            debug!(delivered = report.delivered, failed = report.failed, "Dispatcher::drain_if_ready: drained");
        }
        Some(report)
    }
}

fn send_one(channel: &dyn DispatchChannel, client_handle: i64, event: &HeadlessEvent) -> Result<(), DispatchError> {
    let message = DispatchMessage::from_event(client_handle, event).map_err(|source| DispatchError::Encode {
        kind: event.kind(),
        source,
    })?;
    channel.send(message)
}
