//! Coordinator configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a second registration with a different handle pair does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationPolicy {
    /// Replace both handles and report the previous pair
    #[default]
    Overwrite,
    /// Keep the existing pair and fail the call
    Reject,
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorConfig {
    /// Identifier the dispatch channel is bound under
    #[serde(default = "default_dispatch_channel")]
    pub dispatch_channel: String,

    /// Identifier of the control channel carrying the handshake
    #[serde(default = "default_control_channel")]
    pub control_channel: String,

    /// OS thread name for the execution context
    #[serde(default = "default_context_thread_name")]
    pub context_thread_name: String,

    #[serde(default)]
    pub registration_policy: RegistrationPolicy,
}

fn default_dispatch_channel() -> String {
    debug!("default_dispatch_channel: called");
    "headless/dispatch".to_string()
}

fn default_control_channel() -> String {
    debug!("default_control_channel: called");
    "headless/control".to_string()
}

fn default_context_thread_name() -> String {
    debug!("default_context_thread_name: called");
    "headless-context".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            dispatch_channel: default_dispatch_channel(),
            control_channel: default_control_channel(),
            context_thread_name: default_context_thread_name(),
            registration_policy: RegistrationPolicy::default(),
        }
    }
}
