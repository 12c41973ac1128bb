//! Value types and a local stand-in for the remote telemetry bus.
//!
//! The telemetry bus itself (the wire-connected publish/subscribe fabric
//! shared between this coprocessor and the robot controller) is an external
//! collaborator and out of scope for this workspace; this crate defines the
//! shape of values that cross that boundary and a trait the rest of the
//! runtime programs against.

mod bus;
mod metrics;
mod value;

pub use bus::{camera_key, data_key, setting_key, InMemoryTelemetryBus, RemoteWrite, TelemetryBus};
pub use metrics::MetricsSample;
pub use value::Value;
