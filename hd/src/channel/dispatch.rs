//! Dispatch channel into the execution context

use tokio::sync::mpsc;
use tracing::debug;

use super::messages::DispatchMessage;
use crate::error::DispatchError;

/// Ordered, message-passing conduit into one execution context
///
/// `send` must not block: it is called while the drain lock is held, from
/// producer threads and from the context's own thread.
pub trait DispatchChannel: Send + Sync {
    /// Well-known identifier the channel is bound under
    fn id(&self) -> &str;

    /// Deliver one message
    fn send(&self, message: DispatchMessage) -> Result<(), DispatchError>;

    /// The receiving context is gone; nothing sent from now on arrives
    fn is_closed(&self) -> bool;
}

/// Dispatch channel over an unbounded tokio mpsc
pub struct MpscDispatchChannel {
    id: String,
    tx: mpsc::UnboundedSender<DispatchMessage>,
}

impl MpscDispatchChannel {
    /// Create a channel and the receiving end handed to the context
    pub fn new(id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<DispatchMessage>) {
        let id = id.into();
        debug!(%id, "MpscDispatchChannel::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }
}

impl DispatchChannel for MpscDispatchChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, message: DispatchMessage) -> Result<(), DispatchError> {
        self.tx.send(message).map_err(|_| DispatchError::ChannelClosed(self.id.clone()))
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(n: i64) -> DispatchMessage {
        DispatchMessage {
            client_handle: 1,
            event_kind: "schedule".to_string(),
            payload: json!({ "n": n }),
        }
    }

    #[test]
    fn test_send_preserves_order() {
        let (channel, mut rx) = MpscDispatchChannel::new("test/dispatch");
        for n in 0..5 {
            channel.send(message(n)).unwrap();
        }
        for n in 0..5 {
            assert_eq!(rx.try_recv().unwrap().payload["n"], n);
        }
        assert_eq!(channel.id(), "test/dispatch");
    }

    #[test]
    fn test_send_after_receiver_dropped_fails() {
        let (channel, rx) = MpscDispatchChannel::new("test/dispatch");
        assert!(!channel.is_closed());
        drop(rx);
        assert!(channel.is_closed());
        assert!(matches!(channel.send(message(0)), Err(DispatchError::ChannelClosed(_))));
    }
}
