//! Message types exchanged with the execution context

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ControlError;
use crate::event::HeadlessEvent;

/// Method name of the readiness handshake on the control channel
pub const METHOD_INITIALIZED: &str = "initialized";

/// One event delivered to the headless handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMessage {
    /// Logical client to notify
    pub client_handle: i64,
    /// Wire name of the event kind
    pub event_kind: String,
    /// Structured event params
    pub payload: Value,
}

impl DispatchMessage {
    /// Project an event onto the wire for `client_handle`
    pub fn from_event(client_handle: i64, event: &HeadlessEvent) -> serde_json::Result<Self> {
        Ok(Self {
            client_handle,
            event_kind: event.kind().as_str().to_string(),
            payload: event.params()?,
        })
    }
}

/// Inbound messages from the execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// The context finished its own startup and can receive events
    Initialized,
}

impl ControlMessage {
    /// Parse an inbound method name
    pub fn from_method(method: &str) -> Result<Self, ControlError> {
        if method.eq_ignore_ascii_case(METHOD_INITIALIZED) {
            Ok(Self::Initialized)
        } else {
            Err(ControlError::NotImplemented(method.to_string()))
        }
    }

    pub fn method(self) -> &'static str {
        match self {
            Self::Initialized => METHOD_INITIALIZED,
        }
    }
}
