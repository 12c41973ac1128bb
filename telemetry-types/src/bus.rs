use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use crate::value::Value;

/// A key/value write that originated on the far side of the telemetry bus
/// (i.e. from the robot controller or operator UI, not from this process).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    pub key: String,
    pub value: Value,
}

/// The contract this runtime needs from the remote telemetry bus.
///
/// The wire protocol itself (spec §1, out of scope) is an external
/// collaborator; this trait is the minimal surface the Runtime Manager
/// needs in order to be fully testable without one: a local cache that
/// mirrors what has been published, and a channel of externally-originated
/// writes for the binding/settings listeners to drain.
pub trait TelemetryBus: Send + Sync {
    /// Write a value into the bus's local cache under `key`.
    fn publish(&self, key: &str, value: Value);

    /// Read the last value published (by us or echoed from a remote write) under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Subscribe to writes that arrive from the remote side of the bus.
    fn subscribe_remote_writes(&self) -> broadcast::Receiver<RemoteWrite>;

    /// Test/simulation hook: inject a write as if it arrived from the
    /// remote side of the bus. A real bus implementation drives this from
    /// its own network dispatcher instead.
    fn simulate_remote_write(&self, key: &str, value: Value);
}

/// In-process telemetry bus backed by a plain cache and a broadcast channel.
///
/// Stands in for the wire-connected bus implementation this runtime would
/// use in production (spec §1 places the wire protocol out of scope).
pub struct InMemoryTelemetryBus {
    cache: Mutex<HashMap<String, Value>>,
    remote_tx: broadcast::Sender<RemoteWrite>,
}

impl InMemoryTelemetryBus {
    pub fn new() -> Self {
        let (remote_tx, _) = broadcast::channel(256);
        Self {
            cache: Mutex::new(HashMap::new()),
            remote_tx,
        }
    }
}

impl Default for InMemoryTelemetryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryBus for InMemoryTelemetryBus {
    fn publish(&self, key: &str, value: Value) {
        trace!(%key, ?value, "telemetry publish");
        self.cache.lock().insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.cache.lock().get(key).cloned()
    }

    fn subscribe_remote_writes(&self) -> broadcast::Receiver<RemoteWrite> {
        self.remote_tx.subscribe()
    }

    fn simulate_remote_write(&self, key: &str, value: Value) {
        self.cache.lock().insert(key.to_string(), value.clone());
        // No receivers subscribed is not an error: a remote write can
        // arrive before any listener has registered for it.
        let _ = self.remote_tx.send(RemoteWrite {
            key: key.to_string(),
            value,
        });
    }
}

/// Builds the `camera<index>/...` namespace path for a per-camera telemetry
/// leaf, per the telemetry namespace layout in spec §3.
pub fn camera_key(camera_index: i64, leaf: &str) -> String {
    format!("camera{camera_index}/{leaf}")
}

/// Builds the `camera<index>/settings/<name>` path for a pipeline setting.
pub fn setting_key(camera_index: i64, setting_name: &str) -> String {
    format!("camera{camera_index}/settings/{setting_name}")
}

/// Builds the `camera<index>/data/<name>` path for pipeline-authored output.
pub fn data_key(camera_index: i64, name: &str) -> String {
    format!("camera{camera_index}/data/{name}")
}
