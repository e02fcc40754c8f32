//! Error types for the headless coordinator

use handlestore::{CallbackHandleSet, HandleError};
use thiserror::Error;

use crate::event::EventKind;

/// Failures starting the execution context
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no headless task registered")]
    Unregistered,

    #[error("registration handle {0} does not resolve to an entry point")]
    UnknownEntryPoint(i64),

    #[error("failed to read callback handles: {0}")]
    HandleStore(String),

    #[error("failed to construct execution context: {0}")]
    Construction(String),
}

impl LaunchError {
    /// True when no valid registration exists yet; recoverable by registering
    pub fn is_unregistered(&self) -> bool {
        matches!(self, Self::Unregistered | Self::UnknownEntryPoint(_))
    }
}

/// Failures delivering one event over the dispatch channel
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to encode {kind} event: {source}")]
    Encode {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("dispatch channel {0} is closed")]
    ChannelClosed(String),

    #[error("dispatch rejected: {0}")]
    Rejected(String),
}

/// Failures registering the callback handles
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("expected [registrationHandle, clientHandle], got {0} argument(s)")]
    ArgumentCount(usize),

    #[error("invalid handle: {0}")]
    InvalidHandle(#[from] HandleError),

    #[error("headless task already registered ({existing}), refusing ({requested})")]
    AlreadyRegistered {
        existing: CallbackHandleSet,
        requested: CallbackHandleSet,
    },

    #[error("handle store error: {0}")]
    Store(String),
}

/// Failures handling an inbound control message
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("method not implemented: {0}")]
    NotImplemented(String),

    #[error("coordinator is no longer running")]
    Closed,
}
