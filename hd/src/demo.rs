//! Built-in demo entry point and event generator used by `hd`

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::context::{EntryPointRegistry, HeadlessContext};
use crate::event::{Coords, EventPayload, HeadlessEvent, HeartbeatEvent, Location};

/// Name the demo entry point is registered under
pub const DEMO_ENTRY_POINT: &str = "print_events";

/// Registry holding the demo entry point
///
/// The entry point signals readiness, then prints every dispatched message as
/// one JSON line and bumps `printed`.
pub fn demo_registry(printed: Arc<AtomicU64>) -> EntryPointRegistry {
    let registry = EntryPointRegistry::new();
    registry.register(DEMO_ENTRY_POINT, move |ctx| print_events(ctx, Arc::clone(&printed)));
    registry
}

async fn print_events(mut ctx: HeadlessContext, printed: Arc<AtomicU64>) -> eyre::Result<()> {
    debug!(registration_handle = ctx.registration_handle(), "print_events: called");
    ctx.initialized()?;
    while let Some(message) = ctx.recv().await {
        println!("{}", serde_json::to_string(&message)?);
        printed.fetch_add(1, Ordering::SeqCst);
    }
    Ok(())
}

/// Event emitted by `producer` as its `seq`-th event
///
/// Cycles through location, heartbeat and schedule so several kinds flow.
pub fn demo_event(producer: usize, seq: usize) -> HeadlessEvent {
    let location = || Location {
        uuid: format!("p{producer}-{seq}"),
        timestamp: Utc::now(),
        is_moving: seq % 2 == 0,
        odometer: seq as f64 * 10.0,
        coords: Coords {
            latitude: 45.5 + producer as f64 * 0.01,
            longitude: -73.6 + seq as f64 * 0.001,
            accuracy: 5.0,
            speed: None,
            heading: None,
            altitude: None,
        },
        activity: None,
        battery: None,
        extras: Some(json!({ "producer": producer, "seq": seq })),
    };
    let payload = match seq % 3 {
        0 => EventPayload::Location(location()),
        1 => EventPayload::Heartbeat(HeartbeatEvent { location: location() }),
        _ => EventPayload::Schedule(json!({ "producer": producer, "seq": seq, "enabled": true })),
    };
    HeadlessEvent::new(payload)
}
