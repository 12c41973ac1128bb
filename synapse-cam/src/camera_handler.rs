//! Camera Handler (spec §4.4): enumerates configured and hot-plug cameras,
//! constructs camera instances, allocates per-camera output sinks, and
//! provides lookup.
//!
//! Grounded on `camera_factory.py`'s `CameraFactory` (enumerate, match by
//! stable device id, retry-open, auto-register unmatched devices) and on
//! `strand-cam`'s per-camera video-sink + disk-recorder pairing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use runtime_config::{CameraConfig, ConfigStore, RobotFrameTransform};
use tracing::{info, warn};

use camera_io::Camera;
use pipeline_api::Frame;

use crate::sinks::{resize_for_stream, DiskRecorder, LatestFrameSink, StreamSink};

const MAX_OPEN_RETRIES: u32 = 30;
const RETRY_SPACING: Duration = Duration::from_secs(1);
const DEFAULT_STREAM_RES: (u32, u32) = (320, 240);

/// A device found by enumeration, before it is matched against configuration
/// (spec §4.4: "enumerate physical devices; match configured devices by
/// stable identifier").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub id: String,
    pub dev_path: String,
}

/// Physical device enumeration (spec §1: camera driver backends are an
/// external collaborator, specified here only by contract).
pub trait DeviceEnumerator: Send + Sync {
    fn enumerate(&self) -> Vec<DiscoveredDevice>;
}

/// Opens a device by path, given a requested mode. Stands in for the
/// capture backend (OpenCV, cscore, GStreamer — Non-goals per spec §1).
pub trait CameraFactory: Send + Sync {
    fn open(&self, dev_path: &str, width: u32, height: u32, fps: f64) -> camera_io::Result<Box<dyn Camera>>;
}

/// [`DeviceEnumerator`] that reports every camera declared in configuration
/// as physically present. Stands in for a real device scan (USB/V4L
/// enumeration is a Non-goal, spec §1) so that the CLI binary can bring up
/// a full camera set against nothing but a config file and
/// [`SimulatedCameraFactory`].
pub struct ConfiguredDeviceEnumerator<'a> {
    config: &'a ConfigStore,
}

impl<'a> ConfiguredDeviceEnumerator<'a> {
    pub fn new(config: &'a ConfigStore) -> Self {
        Self { config }
    }
}

impl DeviceEnumerator for ConfiguredDeviceEnumerator<'_> {
    fn enumerate(&self) -> Vec<DiscoveredDevice> {
        self.config
            .all_camera_configs()
            .into_iter()
            .map(|cfg| DiscoveredDevice { id: cfg.id, dev_path: format!("sim:{}", cfg.index) })
            .collect()
    }
}

/// [`CameraFactory`] backed by [`camera_io::SimulatedCamera`], the one
/// in-tree `Camera` implementor (spec §1 excludes real capture backends).
pub struct SimulatedCameraFactory;

impl CameraFactory for SimulatedCameraFactory {
    fn open(&self, dev_path: &str, width: u32, height: u32, fps: f64) -> camera_io::Result<Box<dyn Camera>> {
        Ok(Box::new(camera_io::SimulatedCamera::open(dev_path, width, height, fps)))
    }
}

/// Everything the runtime needs to drive one camera: the capture device,
/// its static config, and its output sinks (spec §3, §4.4).
pub struct CameraEntry {
    pub config: CameraConfig,
    pub camera: Box<dyn Camera>,
    pub stream_sink: Box<dyn StreamSink>,
    pub recorder: DiskRecorder,
}

/// Shared handle to one camera's entry. A `Mutex` rather than an `RwLock`:
/// the entry is touched by exactly one worker thread per iteration plus,
/// occasionally, a telemetry listener applying a camera-property write
/// (spec §5's "pipeline instance ... touched only by its owning worker and
/// by setting-change event callbacks" applies equally to the camera it
/// drives).
pub type CameraHandle = Arc<Mutex<CameraEntry>>;

pub struct CameraHandler {
    cameras: BTreeMap<i64, CameraHandle>,
}

impl CameraHandler {
    pub fn new() -> Self {
        Self { cameras: BTreeMap::new() }
    }

    /// Setup sequence (spec §4.4): match configured devices to discovered
    /// ones by stable id, open each with bounded retry, auto-register any
    /// discovered device absent from configuration. Returns the
    /// `(camera_index, name)` pairs that came online, for `onAddCamera`.
    pub fn setup(
        &mut self,
        config: &ConfigStore,
        enumerator: &dyn DeviceEnumerator,
        factory: &dyn CameraFactory,
        recordings_dir: Option<&std::path::Path>,
    ) -> Vec<(i64, String)> {
        self.setup_with_retry_spacing(config, enumerator, factory, recordings_dir, RETRY_SPACING)
    }

    /// As [`Self::setup`], but with a configurable retry spacing so tests
    /// do not have to wait out the full 30 s worst case (spec §4.4: "retry
    /// up to 30 times, 1 s spacing").
    pub fn setup_with_retry_spacing(
        &mut self,
        config: &ConfigStore,
        enumerator: &dyn DeviceEnumerator,
        factory: &dyn CameraFactory,
        recordings_dir: Option<&std::path::Path>,
        retry_spacing: Duration,
    ) -> Vec<(i64, String)> {
        let mut added = Vec::new();
        let discovered = enumerator.enumerate();
        let mut matched_ids = std::collections::HashSet::new();

        for cfg in config.all_camera_configs() {
            let Some(device) = discovered.iter().find(|d| d.id == cfg.id) else {
                warn!(camera = cfg.index, id = %cfg.id, "configured camera not currently connected");
                continue;
            };
            matched_ids.insert(device.id.clone());
            if let Some(entry) = self.open_with_retry(&cfg, device, factory, recordings_dir, retry_spacing) {
                added.push((cfg.index, cfg.name.clone()));
                self.cameras.insert(cfg.index, Arc::new(Mutex::new(entry)));
            }
        }

        for device in discovered.iter().filter(|d| !matched_ids.contains(&d.id)) {
            let index = config.next_camera_index();
            let cfg = auto_register(index, device);
            info!(camera = index, id = %device.id, "auto-registering unconfigured camera");
            config.set_camera_config(index, cfg.clone());
            if let Some(entry) = self.open_with_retry(&cfg, device, factory, recordings_dir, retry_spacing) {
                added.push((cfg.index, cfg.name.clone()));
                self.cameras.insert(cfg.index, Arc::new(Mutex::new(entry)));
            }
        }

        added
    }

    fn open_with_retry(
        &self,
        cfg: &CameraConfig,
        device: &DiscoveredDevice,
        factory: &dyn CameraFactory,
        recordings_dir: Option<&std::path::Path>,
        retry_spacing: Duration,
    ) -> Option<CameraEntry> {
        let (width, height) = cfg.stream_res;
        for attempt in 1..=MAX_OPEN_RETRIES {
            match factory.open(&device.dev_path, width, height, 30.0) {
                Ok(camera) => {
                    let recorder = DiskRecorder::new(
                        recordings_dir.map(|dir| dir.join(format!("camera_{}", cfg.index))),
                    );
                    return Some(CameraEntry {
                        config: cfg.clone(),
                        camera,
                        stream_sink: Box::new(LatestFrameSink::default()),
                        recorder,
                    });
                }
                Err(err) if attempt < MAX_OPEN_RETRIES => {
                    warn!(camera = cfg.index, attempt, %err, "camera open failed, retrying");
                    std::thread::sleep(retry_spacing);
                }
                Err(err) => {
                    warn!(camera = cfg.index, %err, "camera open failed after max retries, skipping");
                }
            }
        }
        None
    }

    pub fn camera(&self, index: i64) -> Option<CameraHandle> {
        self.cameras.get(&index).cloned()
    }

    pub fn camera_indices(&self) -> Vec<i64> {
        self.cameras.keys().copied().collect()
    }

    /// Resize to stream resolution and push to the stream sink; also write
    /// to the disk recorder when `record` is true (spec §4.4's
    /// `publishFrame`).
    pub fn publish_frame(&self, index: i64, frame: &Frame, record: bool) {
        let Some(handle) = self.cameras.get(&index) else { return };
        let mut entry = handle.lock();
        let stream_res = entry.config.stream_res;
        let resized = resize_for_stream(frame, stream_res);
        entry.stream_sink.publish(&resized);
        if record {
            if let Err(err) = entry.recorder.write(frame) {
                warn!(camera = index, %err, "failed writing frame to disk recorder");
            }
        }
    }

    /// Release all recorders and close all cameras (spec §4.4's cleanup).
    pub fn cleanup(&mut self) {
        for (index, handle) in self.cameras.iter() {
            let mut entry = handle.lock();
            entry.camera.close();
            info!(camera = index, "camera closed");
        }
    }
}

impl Default for CameraHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn auto_register(index: i64, device: &DiscoveredDevice) -> CameraConfig {
    CameraConfig {
        index,
        name: format!("camera{index}"),
        id: device.id.clone(),
        matrix: [[600.0, 0.0, 160.0], [0.0, 600.0, 120.0], [0.0, 0.0, 1.0]],
        dist_coeffs: vec![0.0; 5],
        measured_res: DEFAULT_STREAM_RES,
        stream_res: DEFAULT_STREAM_RES,
        transform: RobotFrameTransform { translation_m: [0.0; 3], rotation_deg: [0.0; 3] },
        default_pipeline: crate::events::INVALID_PIPELINE,
        auto_registered: true,
    }
}
