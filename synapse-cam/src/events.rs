//! The event taxonomy from spec §4.6, delivered over a `tokio::sync::broadcast`
//! channel rather than per-setting closures-on-objects (REDESIGN FLAG, spec §9:
//! "per-setting change listeners via closures" → "event channel keyed by
//! (cameraIndex, settingName)"). `subscribe_events` is the contract point the
//! (out of scope) operator UI process consumes, matching how `strand-cam`
//! exposes `async-change-tracker::ChangeTracker` subscriptions to its browser UI.

use telemetry_types::Value;
use tokio::sync::broadcast;

/// The sentinel pipeline index meaning "no pipeline bound" (spec §3, §4.7).
pub const INVALID_PIPELINE: i64 = -1;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AddPipeline { index: i64, type_name: String },
    RemovePipeline { index: i64, type_name: String },
    DefaultPipelineSet { pipeline_index: i64, camera_index: i64 },
    AddCamera { camera_index: i64, name: String },
    SettingChanged { key: String, value: Value, camera_index: i64 },
    SettingChangedFromNt { key: String, value: Value, camera_index: i64 },
    PipelineChanged { pipeline_index: i64, camera_index: i64 },
    PipelineChangedFromNt { pipeline_index: i64, camera_index: i64 },
}

/// Broadcast hub for the event taxonomy. A lagging subscriber misses older
/// events rather than blocking the emitter (spec §5: workers never block on
/// telemetry/event publication).
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_emitted_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(Event::AddCamera { camera_index: 0, name: "cam0".into() });
        let event = rx.try_recv().unwrap();
        assert_eq!(event, Event::AddCamera { camera_index: 0, name: "cam0".into() });
    }
}
