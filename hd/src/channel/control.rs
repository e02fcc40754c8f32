//! Control channel carrying the readiness handshake back to the coordinator

use std::sync::Arc;

use tracing::debug;

use super::messages::ControlMessage;
use crate::error::ControlError;

/// Handler installed by the launcher for inbound control messages
pub type ControlHandler = Arc<dyn Fn(ControlMessage) -> Result<(), ControlError> + Send + Sync>;

/// Inbound side of the context's control channel
#[derive(Clone)]
pub struct ControlChannel {
    id: String,
    handler: ControlHandler,
}

impl ControlChannel {
    pub fn new(id: impl Into<String>, handler: ControlHandler) -> Self {
        Self { id: id.into(), handler }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Invoke a method by name, as the context would over the wire
    ///
    /// Unknown methods are answered with `NotImplemented`.
    pub fn invoke(&self, method: &str) -> Result<(), ControlError> {
        debug!(channel = %self.id, %method, "ControlChannel::invoke: called");
        let message = ControlMessage::from_method(method)?;
        (self.handler)(message)
    }
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel").field("id", &self.id).finish_non_exhaustive()
    }
}
