//! Closed catalog of event kinds produced by the tracking engine

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

/// Every event kind the engine can deliver, headless or live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Location,
    MotionChange,
    ActivityChange,
    Geofence,
    GeofencesChange,
    Heartbeat,
    Http,
    ProviderChange,
    ConnectivityChange,
    PowerSaveChange,
    EnabledChange,
    Schedule,
    Boot,
    Terminate,
    Authorization,
    NotificationAction,
}

impl EventKind {
    pub const ALL: [EventKind; 16] = [
        Self::Location,
        Self::MotionChange,
        Self::ActivityChange,
        Self::Geofence,
        Self::GeofencesChange,
        Self::Heartbeat,
        Self::Http,
        Self::ProviderChange,
        Self::ConnectivityChange,
        Self::PowerSaveChange,
        Self::EnabledChange,
        Self::Schedule,
        Self::Boot,
        Self::Terminate,
        Self::Authorization,
        Self::NotificationAction,
    ];

    /// Wire name carried in dispatch messages
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::MotionChange => "motionchange",
            Self::ActivityChange => "activitychange",
            Self::Geofence => "geofence",
            Self::GeofencesChange => "geofenceschange",
            Self::Heartbeat => "heartbeat",
            Self::Http => "http",
            Self::ProviderChange => "providerchange",
            Self::ConnectivityChange => "connectivitychange",
            Self::PowerSaveChange => "powersavechange",
            Self::EnabledChange => "enabledchange",
            Self::Schedule => "schedule",
            Self::Boot => "boot",
            Self::Terminate => "terminate",
            Self::Authorization => "authorization",
            Self::NotificationAction => "notificationaction",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}
