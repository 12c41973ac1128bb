//! Runtime Manager (spec §4.6): owns the camera→pipeline binding map, spawns
//! one worker per camera, mediates setting/pipeline change events from both
//! directions, and coordinates shutdown.
//!
//! Grounded on `runtime_handler.py`'s `PipelineLoader`/runtime class
//! (`setPipelineByIndex`, `updateSetting`, `__setupPipelineForCamera`) for
//! the exact binding/echo semantics.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{info, warn};

use pipeline_api::PipelineRegistry;
use runtime_config::ConfigStore;
use telemetry_types::{camera_key, setting_key, TelemetryBus, Value};

use crate::camera_handler::{CameraFactory, CameraHandler, DeviceEnumerator};
use crate::error::{Result, RuntimeError};
use crate::events::{Event, EventBus, INVALID_PIPELINE};
use crate::pipeline_loader::PipelineLoader;
use crate::worker;

/// Everything a camera worker thread needs, gathered behind one `Arc` so
/// that `worker::spawn` only has to capture a single clone (spec §5: workers
/// share read access to the pipeline loader, camera handler, and config
/// store; they never hold a lock across a suspension point).
pub struct RuntimeManager {
    pub(crate) config: Arc<ConfigStore>,
    pub(crate) telemetry: Arc<dyn TelemetryBus>,
    pub(crate) camera_handler: Mutex<CameraHandler>,
    pub(crate) pipeline_loader: PipelineLoader,
    bindings: RwLock<HashMap<i64, i64>>,
    events: EventBus,
    pub(crate) running: Arc<AtomicBool>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RuntimeManager {
    pub fn new(config: Arc<ConfigStore>, telemetry: Arc<dyn TelemetryBus>, registry: PipelineRegistry) -> Arc<Self> {
        Arc::new(Self {
            config,
            telemetry,
            camera_handler: Mutex::new(CameraHandler::new()),
            pipeline_loader: PipelineLoader::new(registry),
            bindings: RwLock::new(HashMap::new()),
            events: EventBus::new(),
            running: Arc::new(AtomicBool::new(false)),
            worker_handles: Mutex::new(Vec::new()),
        })
    }

    /// Setup sequence (spec §4.6): cameraHandler.setup, pipelineLoader.setup,
    /// assign default pipelines, spawn telemetry listener, spawn workers.
    /// The metrics thread and shutdown hook are the CLI binary's
    /// responsibility (spec §4.6 steps 1 and 7), since they need a `tokio`
    /// runtime handle and a signal source this library layer does not own.
    pub fn setup(
        self: &Arc<Self>,
        enumerator: &dyn DeviceEnumerator,
        factory: &dyn CameraFactory,
        recordings_dir: Option<&Path>,
    ) -> Result<()> {
        self.running.store(true, Ordering::Release);

        let added_cameras = self
            .camera_handler
            .lock()
            .setup(&self.config, enumerator, factory, recordings_dir);
        for (camera_index, name) in &added_cameras {
            self.events.emit(Event::AddCamera { camera_index: *camera_index, name: name.clone() });
        }

        self.pipeline_loader.setup(&self.config, &self.events)?;

        for (camera_index, _) in &added_cameras {
            let default_index = self
                .config
                .get_camera_config(*camera_index)
                .map(|c| c.default_pipeline)
                .unwrap_or(INVALID_PIPELINE);
            self.pipeline_loader.set_default_pipeline(*camera_index, default_index);
            self.events.emit(Event::DefaultPipelineSet { pipeline_index: default_index, camera_index: *camera_index });
            if default_index != INVALID_PIPELINE {
                if let Err(err) = self.set_pipeline_by_index(*camera_index, default_index) {
                    warn!(camera = camera_index, %err, "failed to bind default pipeline at setup");
                }
            } else {
                self.bindings.write().insert(*camera_index, INVALID_PIPELINE);
            }
        }

        self.spawn_telemetry_listener();
        for (camera_index, _) in &added_cameras {
            let handle = worker::spawn(self.clone(), *camera_index);
            self.worker_handles.lock().push(handle);
        }

        info!(cameras = added_cameras.len(), "runtime manager setup complete");
        Ok(())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// A clone of the manager's own running flag, shared with the metrics
    /// publisher task so both stop together on shutdown.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub(crate) fn current_pipeline(&self, camera_index: i64) -> i64 {
        *self.bindings.read().get(&camera_index).unwrap_or(&INVALID_PIPELINE)
    }

    /// `setPipelineByIndex` (spec §4.6).
    pub fn set_pipeline_by_index(&self, camera_index: i64, pipeline_index: i64) -> Result<()> {
        if self.camera_handler.lock().camera(camera_index).is_none() {
            return Err(RuntimeError::BadIndex(format!("unknown camera index {camera_index}")));
        }
        if pipeline_index != INVALID_PIPELINE && self.pipeline_loader.get_pipeline(pipeline_index).is_none() {
            return Err(RuntimeError::BadIndex(format!("unknown pipeline index {pipeline_index}")));
        }

        if pipeline_index != INVALID_PIPELINE {
            if let Some(held_by) = self.camera_holding(pipeline_index) {
                if held_by != camera_index {
                    return Err(RuntimeError::PipelineBusy { pipeline_index, held_by });
                }
            }
        }

        self.bindings.write().insert(camera_index, pipeline_index);
        self.telemetry.publish(&camera_key(camera_index, "pipeline"), Value::Int(pipeline_index));

        if pipeline_index != INVALID_PIPELINE {
            self.setup_pipeline_for_camera(camera_index, pipeline_index)?;
        }
        self.events.emit(Event::PipelineChanged { pipeline_index, camera_index });
        Ok(())
    }

    fn camera_holding(&self, pipeline_index: i64) -> Option<i64> {
        self.bindings
            .read()
            .iter()
            .find(|(_, p)| **p == pipeline_index)
            .map(|(cam, _)| *cam)
    }

    /// `__setupPipelineForCamera` (spec §4.6): bind, push settings to the
    /// telemetry bus, apply camera-property settings, and rely on the single
    /// telemetry listener thread (see [`Self::spawn_telemetry_listener`]) for
    /// `settings/*` and `pipeline` remote writes rather than registering one
    /// listener per key — a faithful simplification of the per-key
    /// registration the spec describes, recorded in DESIGN.md.
    fn setup_pipeline_for_camera(&self, camera_index: i64, pipeline_index: i64) -> Result<()> {
        let pipeline = self
            .pipeline_loader
            .get_pipeline(pipeline_index)
            .ok_or(RuntimeError::NoPipeline { camera_index })?;

        pipeline.lock().bind(camera_index);

        let values = pipeline.lock().settings().to_dict();
        for (key, value) in values {
            self.telemetry.publish(&setting_key(camera_index, &key), value.clone());
            if camera_io::KNOWN_PROPERTIES.contains(&key.as_str()) {
                if let Some(camera) = self.camera_handler.lock().camera(camera_index) {
                    if let Err(err) = camera.lock().camera.set_property(&key, value) {
                        warn!(camera = camera_index, setting = %key, %err, "failed to apply camera property on bind");
                    }
                }
            }
        }
        Ok(())
    }

    /// `updateSetting` (spec §4.6). `from_remote` selects which half of the
    /// `onSettingChanged`/`onSettingChangedFromNT` event pair fires.
    pub fn update_setting(&self, key: &str, camera_index: i64, value: Value, from_remote: bool) -> Result<()> {
        let pipeline_index = self.current_pipeline(camera_index);
        if pipeline_index == INVALID_PIPELINE {
            return Err(RuntimeError::NoPipeline { camera_index });
        }
        let pipeline = self
            .pipeline_loader
            .get_pipeline(pipeline_index)
            .ok_or(RuntimeError::NoPipeline { camera_index })?;

        let normalized = {
            let mut guard = pipeline.lock();
            guard.settings_mut().set(key, value)?
        };

        if camera_io::KNOWN_PROPERTIES.contains(&key) {
            if let Some(camera) = self.camera_handler.lock().camera(camera_index) {
                if let Err(err) = camera.lock().camera.set_property(key, normalized.clone()) {
                    warn!(camera = camera_index, setting = %key, %err, "failed to apply camera property");
                }
            }
        }

        if from_remote {
            self.events.emit(Event::SettingChangedFromNt { key: key.to_string(), value: normalized.clone(), camera_index });
        } else {
            self.events.emit(Event::SettingChanged { key: key.to_string(), value: normalized.clone(), camera_index });
        }

        // Always echo the normalized (post-validation/clamp) value back,
        // per the Open Question resolution recorded in DESIGN.md.
        self.telemetry.publish(&setting_key(camera_index, key), normalized.clone());
        pipeline.lock().on_setting_changed(key, &normalized);
        Ok(())
    }

    /// `removePipeline` (spec §4.5, §4.6): pop the pipeline, then rebind
    /// every camera that held it to its own default, or to the invalid
    /// sentinel if the removed pipeline *was* that camera's default
    /// (testable property 6).
    pub fn remove_pipeline(&self, pipeline_index: i64) -> Result<()> {
        self.pipeline_loader
            .remove_pipeline(pipeline_index, &self.events)
            .ok_or_else(|| RuntimeError::BadIndex(format!("unknown pipeline index {pipeline_index}")))?;

        let affected: Vec<i64> = self
            .bindings
            .read()
            .iter()
            .filter(|(_, p)| **p == pipeline_index)
            .map(|(cam, _)| *cam)
            .collect();

        for camera_index in affected {
            let default_index = self.pipeline_loader.get_default_pipeline(camera_index);
            let new_index = if default_index == pipeline_index { INVALID_PIPELINE } else { default_index };
            self.bindings.write().insert(camera_index, new_index);
            self.telemetry.publish(&camera_key(camera_index, "pipeline"), Value::Int(new_index));
            if new_index != INVALID_PIPELINE {
                if let Err(err) = self.setup_pipeline_for_camera(camera_index, new_index) {
                    warn!(camera = camera_index, %err, "failed to rebind camera to default pipeline after removal");
                }
            }
            self.events.emit(Event::PipelineChanged { pipeline_index: new_index, camera_index });
        }
        Ok(())
    }

    /// One dispatcher thread draining remote telemetry writes for every
    /// camera, pattern-matching the key's subtree rather than the
    /// per-(cameraIndex, settingName) registration the spec describes —
    /// equivalent behavior with one listener instead of N (DESIGN.md).
    fn spawn_telemetry_listener(self: &Arc<Self>) {
        let manager = self.clone();
        let mut rx = manager.telemetry.subscribe_remote_writes();
        let running = manager.running.clone();
        std::thread::Builder::new()
            .name("telemetry-listener".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    let write = match rx.blocking_recv() {
                        Ok(write) => write,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    manager.handle_remote_write(&write.key, write.value);
                }
            })
            .expect("spawning telemetry listener thread");
    }

    fn handle_remote_write(&self, key: &str, value: Value) {
        let Some(rest) = key.strip_prefix("camera") else { return };
        let Some(slash) = rest.find('/') else { return };
        let Ok(camera_index) = rest[..slash].parse::<i64>() else { return };
        let leaf = &rest[slash + 1..];

        if leaf == "pipeline" {
            let Some(pipeline_index) = value.as_int() else { return };
            if let Err(err) = self.set_pipeline_by_index(camera_index, pipeline_index) {
                warn!(camera = camera_index, %err, "rejected remote pipeline change");
            } else {
                self.events.emit(Event::PipelineChangedFromNt { pipeline_index, camera_index });
            }
            return;
        }
        if let Some(setting_name) = leaf.strip_prefix("settings/") {
            if let Err(err) = self.update_setting(setting_name, camera_index, value, true) {
                warn!(camera = camera_index, setting = setting_name, %err, "rejected remote setting write");
            }
        }
    }

    /// `isRunning = false`; workers observe and exit; cameraHandler.cleanup()
    /// (spec §4.6's shutdown sequence).
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let handles: Vec<_> = self.worker_handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        self.camera_handler.lock().cleanup();
        info!("runtime manager shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_handler::SimulatedCameraFactory;
    use pipeline_api::demo::builtin_pipelines;
    use runtime_config::{CameraConfig, RobotFrameTransform};
    use telemetry_types::InMemoryTelemetryBus;

    struct FixedEnumerator(Vec<crate::camera_handler::DiscoveredDevice>);
    impl DeviceEnumerator for FixedEnumerator {
        fn enumerate(&self) -> Vec<crate::camera_handler::DiscoveredDevice> {
            self.0.clone()
        }
    }

    fn registry() -> PipelineRegistry {
        let mut registry = PipelineRegistry::new();
        for info in builtin_pipelines() {
            registry.register(info);
        }
        registry
    }

    fn camera_config(index: i64, id: &str, default_pipeline: i64) -> CameraConfig {
        CameraConfig {
            index,
            name: format!("cam{index}"),
            id: id.to_string(),
            matrix: [[600.0, 0.0, 160.0], [0.0, 600.0, 120.0], [0.0, 0.0, 1.0]],
            dist_coeffs: vec![0.0; 5],
            measured_res: (320, 240),
            stream_res: (320, 240),
            transform: RobotFrameTransform { translation_m: [0.0; 3], rotation_deg: [0.0; 3] },
            default_pipeline,
            auto_registered: false,
        }
    }

    fn manager_with_two_cameras() -> Arc<RuntimeManager> {
        let config = Arc::new(ConfigStore::empty());
        config.set_camera_config(0, camera_config(0, "vendor:0", 0));
        config.set_camera_config(1, camera_config(1, "vendor:1", 1));
        config.set_pipelines(vec![
            runtime_config::PipelineConfig { type_name: "color".into(), name: "A".into(), settings: vec![] },
            runtime_config::PipelineConfig { type_name: "color".into(), name: "B".into(), settings: vec![] },
        ]);
        let telemetry: Arc<dyn TelemetryBus> = Arc::new(InMemoryTelemetryBus::new());
        let manager = RuntimeManager::new(config, telemetry, registry());
        let enumerator = FixedEnumerator(vec![
            crate::camera_handler::DiscoveredDevice { id: "vendor:0".into(), dev_path: "/dev/fake0".into() },
            crate::camera_handler::DiscoveredDevice { id: "vendor:1".into(), dev_path: "/dev/fake1".into() },
        ]);
        manager.setup(&enumerator, &SimulatedCameraFactory, None).unwrap();
        manager
    }

    #[test]
    fn binding_pipeline_already_held_fails_with_pipeline_busy() {
        let manager = manager_with_two_cameras();
        assert_eq!(manager.current_pipeline(0), 0);
        assert_eq!(manager.current_pipeline(1), 1);

        let err = manager.set_pipeline_by_index(0, 1).unwrap_err();
        assert!(matches!(err, RuntimeError::PipelineBusy { pipeline_index: 1, held_by: 1 }));
        assert_eq!(manager.current_pipeline(0), 0);
        manager.shutdown();
    }

    #[test]
    fn removing_default_pipeline_falls_back_to_invalid_sentinel() {
        let manager = manager_with_two_cameras();
        manager.remove_pipeline(0).unwrap();
        assert_eq!(manager.current_pipeline(0), INVALID_PIPELINE);
        manager.shutdown();
    }

    #[test]
    fn unknown_camera_index_is_rejected() {
        let manager = manager_with_two_cameras();
        let err = manager.set_pipeline_by_index(99, 0).unwrap_err();
        assert!(matches!(err, RuntimeError::BadIndex(_)));
        manager.shutdown();
    }

    #[test]
    fn worker_publishes_latency_telemetry() {
        let manager = manager_with_two_cameras();
        std::thread::sleep(Duration::from_millis(150));
        assert!(manager.telemetry.get(&camera_key(0, "captureLatency")).is_some());
        assert!(manager.telemetry.get(&camera_key(0, "processLatency")).is_some());
        manager.shutdown();
    }

    #[test]
    fn remote_write_updates_setting_and_echoes_normalized_value() {
        let manager = manager_with_two_cameras();
        let raw = Value::FloatArray(vec![7.5, 7.5, 7.5]);
        manager.telemetry.simulate_remote_write(&setting_key(0, "lower"), raw.clone());
        std::thread::sleep(Duration::from_millis(100));
        let echoed = manager.telemetry.get(&setting_key(0, "lower"));
        assert_eq!(echoed, Some(Value::FloatArray(vec![8.0, 8.0, 8.0])));
        assert_ne!(echoed, Some(raw));
        manager.shutdown();
    }
}
