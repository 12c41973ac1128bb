//! Camera Handler, Pipeline Loader, Runtime Manager, metrics publisher, and
//! the CLI entry point binary — the top-level orchestration crate wiring
//! `camera-io`, `pipeline-api`, `runtime-config`, and `telemetry-types`
//! together into a running coprocessor (spec §2, §4.4–§4.6).

mod camera_handler;
mod error;
mod events;
mod manager;
mod metrics;
mod pipeline_loader;
mod sinks;
mod worker;

pub use camera_handler::{
    CameraEntry, CameraFactory, CameraHandle, CameraHandler, ConfiguredDeviceEnumerator, DeviceEnumerator,
    DiscoveredDevice, SimulatedCameraFactory,
};
pub use error::{Result, RuntimeError};
pub use events::{Event, EventBus, INVALID_PIPELINE};
pub use manager::RuntimeManager;
pub use metrics::MetricsPublisher;
pub use pipeline_loader::{PipelineHandle, PipelineLoader};
pub use sinks::{DiskRecorder, LatestFrameSink, StreamSink};
