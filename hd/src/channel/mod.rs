//! Channels between the coordinator and the execution context
//!
//! - **Dispatch:** coordinator → context, one [`DispatchMessage`] per event
//! - **Control:** context → coordinator, the `"initialized"` handshake

mod control;
mod dispatch;
mod messages;

pub use control::{ControlChannel, ControlHandler};
pub use dispatch::{DispatchChannel, MpscDispatchChannel};
pub use messages::{ControlMessage, DispatchMessage, METHOD_INITIALIZED};
