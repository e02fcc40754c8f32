//! Readiness gate and execution-context lifecycle state

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::debug;

/// Lifecycle of the execution context within one process incarnation
///
/// `NotStarted -> Starting -> Ready`, never backwards. Nothing here is
/// persisted, so a new process always begins at `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionContextState {
    /// Events queue up; no context exists yet
    NotStarted,
    /// Context launched, waiting for its handshake; events queue up
    Starting,
    /// Handshake received; every event triggers a drain
    Ready,
}

impl std::fmt::Display for ExecutionContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Opens once, when the consumer signals it is ready; never closes again
#[derive(Debug, Default)]
pub struct ReadinessGate {
    open: AtomicBool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate; returns true only for the call that opened it
    pub fn open(&self) -> bool {
        let opened = !self.open.swap(true, Ordering::AcqRel);
        debug!(opened, "ReadinessGate::open: called");
        opened
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
