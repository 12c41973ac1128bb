//! Whole-runtime integration scenarios driving [`RuntimeManager`] through its
//! public surface exactly as the CLI binary does: a [`ConfigStore`] built in
//! memory, the demo pipeline registry, [`SimulatedCameraFactory`], and an
//! in-memory telemetry bus. Placement follows
//! `angkira-rpi-webrtc-streamer`'s `rust/tests/integration_test.rs`
//! convention of exercising whole-crate scenarios from outside the crate
//! boundary, rather than `#[cfg(test)]` unit tests alongside the code under
//! test.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use pipeline_api::demo::builtin_pipelines;
use pipeline_api::PipelineRegistry;
use runtime_config::{CameraConfig, ConfigStore, PipelineConfig, RobotFrameTransform};
use synapse_cam::{
    CameraFactory, ConfiguredDeviceEnumerator, DeviceEnumerator, DiscoveredDevice, Event, RuntimeManager,
    SimulatedCameraFactory, INVALID_PIPELINE,
};
use telemetry_types::{camera_key, setting_key, InMemoryTelemetryBus, TelemetryBus, Value};

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
        name: format!("camera{index}"),
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

/// Builds a store with `camera_count` cameras, each defaulted to its own
/// `color` pipeline instance, and brings up a full runtime against the
/// configured-device enumerator + simulated camera factory (the same pair
/// the CLI binary wires together).
fn bring_up(camera_count: i64) -> (Arc<RuntimeManager>, Arc<InMemoryTelemetryBus>) {
    let config = Arc::new(ConfigStore::empty());
    let mut pipelines = Vec::new();
    for i in 0..camera_count {
        config.set_camera_config(i, camera_config(i, &format!("vendor:{i}"), i));
        pipelines.push(PipelineConfig { type_name: "color".into(), name: format!("pipeline-{i}"), settings: vec![] });
    }
    config.set_pipelines(pipelines);

    let telemetry = Arc::new(InMemoryTelemetryBus::new());
    let telemetry_dyn: Arc<dyn TelemetryBus> = telemetry.clone();
    let manager = RuntimeManager::new(config.clone(), telemetry_dyn, registry());

    let enumerator = ConfiguredDeviceEnumerator::new(&config);
    let factory: &dyn CameraFactory = &SimulatedCameraFactory;
    manager.setup(&enumerator, factory, None).expect("runtime setup should succeed against simulated cameras");

    (manager, telemetry)
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
fn every_configured_camera_comes_online_bound_to_its_default_pipeline(#[case] camera_count: i64) {
    let (manager, telemetry) = bring_up(camera_count);

    for i in 0..camera_count {
        assert_eq!(telemetry.get(&camera_key(i, "pipeline")), Some(Value::Int(i)));
    }

    manager.shutdown();
}

#[test]
fn workers_publish_latency_telemetry_for_every_camera() {
    let (manager, telemetry) = bring_up(3);
    std::thread::sleep(Duration::from_millis(200));

    for i in 0..3 {
        assert!(telemetry.get(&camera_key(i, "captureLatency")).is_some());
        assert!(telemetry.get(&camera_key(i, "processLatency")).is_some());
    }

    manager.shutdown();
}

#[test]
fn binding_a_pipeline_already_held_by_another_camera_is_rejected() {
    let (manager, _telemetry) = bring_up(2);

    let err = manager.set_pipeline_by_index(0, 1).unwrap_err();
    assert!(matches!(err, synapse_cam::RuntimeError::PipelineBusy { pipeline_index: 1, held_by: 1 }));

    manager.shutdown();
}

#[test]
fn removing_a_cameras_default_pipeline_falls_back_to_the_invalid_sentinel_and_keeps_the_worker_alive() {
    let (manager, telemetry) = bring_up(1);
    manager.remove_pipeline(0).unwrap();

    assert_eq!(telemetry.get(&camera_key(0, "pipeline")), Some(Value::Int(INVALID_PIPELINE)));
    assert!(manager.running_flag().load(Ordering::Acquire));

    std::thread::sleep(Duration::from_millis(150));
    assert!(
        telemetry.get(&camera_key(0, "captureLatency")).is_some(),
        "worker keeps publishing raw-frame latency after its pipeline is removed"
    );

    manager.shutdown();
}

#[test]
fn remote_setting_write_is_validated_normalized_and_echoed_back() {
    let (manager, telemetry) = bring_up(1);

    // `color`'s `lower`/`upper` settings are `List<Range<0,255,step=1>>` thresholds
    // (pipeline-api/src/demo/color.rs); a fractional write should snap to the
    // nearest integer step and echo the snapped value, never the raw input.
    telemetry.simulate_remote_write(&setting_key(0, "lower"), Value::FloatArray(vec![10.4, 10.4, 10.4]));
    std::thread::sleep(Duration::from_millis(100));

    let echoed = telemetry.get(&setting_key(0, "lower"));
    assert_eq!(echoed, Some(Value::FloatArray(vec![10.0, 10.0, 10.0])));

    manager.shutdown();
}

#[test]
fn remote_setting_write_that_fails_validation_leaves_the_bus_entry_unchanged() {
    let (manager, telemetry) = bring_up(1);
    let before = telemetry.get(&setting_key(0, "lower"));

    telemetry.simulate_remote_write(&setting_key(0, "lower"), Value::Bool(true));
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(telemetry.get(&setting_key(0, "lower")), before);

    manager.shutdown();
}

#[test]
fn config_round_trip_through_disk_preserves_the_camera_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.yml");

    let original = ConfigStore::empty();
    original.set_camera_config(0, camera_config(0, "vendor:0", 0));
    original.set_camera_config(1, camera_config(1, "vendor:1", INVALID_PIPELINE));
    original.set_pipelines(vec![PipelineConfig { type_name: "color".into(), name: "A".into(), settings: vec![] }]);
    original.save_to(&path).unwrap();

    let reloaded = ConfigStore::load(&path).unwrap();
    assert_eq!(reloaded.all_camera_configs().len(), 2);
    assert_eq!(reloaded.get_camera_config(1).unwrap().default_pipeline, INVALID_PIPELINE);

    let path2 = dir.path().join("settings2.yml");
    reloaded.save_to(&path2).unwrap();
    let reloaded2 = ConfigStore::load(&path2).unwrap();
    assert_eq!(reloaded2.all_camera_configs(), reloaded.all_camera_configs());
    assert_eq!(reloaded2.pipelines(), reloaded.pipelines());
}

#[test]
fn a_camera_absent_from_the_discovered_device_set_is_simply_skipped() {
    struct OnlyFirst;
    impl DeviceEnumerator for OnlyFirst {
        fn enumerate(&self) -> Vec<DiscoveredDevice> {
            vec![DiscoveredDevice { id: "vendor:0".into(), dev_path: "sim:0".into() }]
        }
    }

    let config = Arc::new(ConfigStore::empty());
    config.set_camera_config(0, camera_config(0, "vendor:0", 0));
    config.set_camera_config(1, camera_config(1, "vendor:1", 0));
    config.set_pipelines(vec![PipelineConfig { type_name: "color".into(), name: "A".into(), settings: vec![] }]);

    let telemetry: Arc<dyn TelemetryBus> = Arc::new(InMemoryTelemetryBus::new());
    let manager = RuntimeManager::new(config, telemetry.clone(), registry());
    manager.setup(&OnlyFirst, &SimulatedCameraFactory, None).unwrap();

    assert_eq!(telemetry.get(&camera_key(0, "pipeline")), Some(Value::Int(0)));
    assert!(telemetry.get(&camera_key(1, "pipeline")).is_none());

    manager.shutdown();
}

#[test]
fn events_taxonomy_reports_add_camera_and_pipeline_changed() {
    let (manager, _telemetry) = bring_up(1);
    let mut events = manager.subscribe_events();

    manager.remove_pipeline(0).unwrap();

    let mut saw_pipeline_changed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::PipelineChanged { pipeline_index, camera_index: 0 } if pipeline_index == INVALID_PIPELINE) {
            saw_pipeline_changed = true;
        }
    }
    assert!(saw_pipeline_changed, "removePipeline should emit onPipelineChanged with the invalid sentinel");

    manager.shutdown();
}
