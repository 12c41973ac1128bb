//! CLI entry point (spec §4.6 setup step 1, §2's ambient CLI stack).
//!
//! Grounded on `strand-cam/src/cli_app.rs` for the shape of argument
//! parsing, `RUST_LOG`-driven log init, and a ctrlc shutdown hook; uses
//! `clap` derive style rather than the teacher's builder style, matching
//! the retrieval pack's other CLI crates (`angkira-rpi-webrtc-streamer`).

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pipeline_api::demo::builtin_pipelines;
use pipeline_api::PipelineRegistry;
use runtime_config::ConfigStore;
use telemetry_types::InMemoryTelemetryBus;

use synapse_cam::{CameraFactory, ConfiguredDeviceEnumerator, MetricsPublisher, RuntimeManager, SimulatedCameraFactory};

#[derive(Parser, Debug)]
#[command(name = "synapse-cam", version, about = "Vision coprocessor runtime")]
struct Cli {
    /// Path to the `config/settings.yml`-shaped configuration file.
    #[arg(long, default_value = "config/settings.yml")]
    config: PathBuf,

    /// Directory recordings are written to when a camera's `record`
    /// setting is enabled. Omit to disable disk recording entirely.
    #[arg(long)]
    recordings_dir: Option<PathBuf>,

    /// Log level passed to `tracing_subscriber::EnvFilter` when `RUST_LOG`
    /// is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Arc::new(ConfigStore::load(&cli.config)?);
    let telemetry = Arc::new(InMemoryTelemetryBus::new());

    let mut registry = PipelineRegistry::new();
    for info in builtin_pipelines() {
        registry.register(info);
    }

    let manager = RuntimeManager::new(config.clone(), telemetry.clone(), registry);

    let shutdown_manager = manager.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        shutdown_manager.shutdown();
    })?;

    let recordings_dir = cli
        .recordings_dir
        .as_deref()
        .map(|dir| runtime_config::expand_path(&dir.to_string_lossy()));

    let enumerator = ConfiguredDeviceEnumerator::new(&config);
    let factory: &dyn CameraFactory = &SimulatedCameraFactory;
    manager.setup(&enumerator, factory, recordings_dir.as_deref())?;

    let metrics_telemetry = telemetry.clone();
    let metrics_running = manager.running_flag();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(MetricsPublisher::run(metrics_telemetry, metrics_running));

    Ok(())
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
