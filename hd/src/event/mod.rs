//! Headless events and their wire projection
//!
//! A [`HeadlessEvent`] is an immutable record produced by the tracking engine.
//! The payload is a closed union over [`EventKind`]; projecting it to the
//! structured value a handler receives is a single exhaustive match, so adding
//! a kind is a compile-checked change in one place.

mod kind;
mod payload;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use kind::{EventKind, UnknownEventKind};
pub use payload::{
    Activity, ActivityChangeEvent, AuthorizationEvent, Battery, ConnectivityChangeEvent, Coords, Geofence,
    GeofenceAction, GeofenceEvent, GeofencesChangeEvent, HeartbeatEvent, HttpEvent, Location, ProviderChangeEvent,
};

/// Typed payload, one variant per [`EventKind`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum EventPayload {
    Location(Location),
    /// Carries the location recorded at the moving/stationary transition
    MotionChange(Location),
    ActivityChange(ActivityChangeEvent),
    Geofence(GeofenceEvent),
    GeofencesChange(GeofencesChangeEvent),
    Heartbeat(HeartbeatEvent),
    Http(HttpEvent),
    ProviderChange(ProviderChangeEvent),
    ConnectivityChange(ConnectivityChangeEvent),
    /// Whether OS power-save mode is now on
    PowerSaveChange(bool),
    /// Whether tracking is now enabled
    EnabledChange(bool),
    /// Engine state snapshot at the schedule transition
    Schedule(Value),
    /// Engine state snapshot at device boot
    Boot(Value),
    /// Engine state snapshot at app termination
    Terminate(Value),
    Authorization(AuthorizationEvent),
    /// Identifier of the notification button pressed
    NotificationAction(String),
}

/// An event travelling from the engine to a headless handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlessEvent {
    payload: EventPayload,
}

impl HeadlessEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::Location(_) => EventKind::Location,
            EventPayload::MotionChange(_) => EventKind::MotionChange,
            EventPayload::ActivityChange(_) => EventKind::ActivityChange,
            EventPayload::Geofence(_) => EventKind::Geofence,
            EventPayload::GeofencesChange(_) => EventKind::GeofencesChange,
            EventPayload::Heartbeat(_) => EventKind::Heartbeat,
            EventPayload::Http(_) => EventKind::Http,
            EventPayload::ProviderChange(_) => EventKind::ProviderChange,
            EventPayload::ConnectivityChange(_) => EventKind::ConnectivityChange,
            EventPayload::PowerSaveChange(_) => EventKind::PowerSaveChange,
            EventPayload::EnabledChange(_) => EventKind::EnabledChange,
            EventPayload::Schedule(_) => EventKind::Schedule,
            EventPayload::Boot(_) => EventKind::Boot,
            EventPayload::Terminate(_) => EventKind::Terminate,
            EventPayload::Authorization(_) => EventKind::Authorization,
            EventPayload::NotificationAction(_) => EventKind::NotificationAction,
        }
    }

    /// Structured value delivered to the handler as the event's params
    pub fn params(&self) -> serde_json::Result<Value> {
        match &self.payload {
            EventPayload::Location(location) | EventPayload::MotionChange(location) => {
                serde_json::to_value(location)
            }
            EventPayload::ActivityChange(event) => serde_json::to_value(event),
            EventPayload::Geofence(event) => serde_json::to_value(event),
            EventPayload::GeofencesChange(event) => serde_json::to_value(event),
            EventPayload::Heartbeat(event) => serde_json::to_value(event),
            EventPayload::Http(event) => serde_json::to_value(event),
            EventPayload::ProviderChange(event) => serde_json::to_value(event),
            EventPayload::ConnectivityChange(event) => serde_json::to_value(event),
            EventPayload::PowerSaveChange(on) | EventPayload::EnabledChange(on) => Ok(Value::Bool(*on)),
            EventPayload::Schedule(state) | EventPayload::Boot(state) | EventPayload::Terminate(state) => {
                Ok(state.clone())
            }
            EventPayload::Authorization(event) => serde_json::to_value(event),
            EventPayload::NotificationAction(button) => Ok(Value::String(button.clone())),
        }
    }
}

impl From<EventPayload> for HeadlessEvent {
    fn from(payload: EventPayload) -> Self {
        Self::new(payload)
    }
}
