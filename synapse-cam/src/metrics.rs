//! Metrics Publisher (spec §4.6, §6): a 1 Hz background task sampling host
//! health gauges and publishing them as a fixed-order float array to
//! `root/metrics`.
//!
//! Grounded on `synapse_core/src/synapse/core/runtime_handler.py`'s
//! metrics-sampling loop and `HardwareMetricsProto`'s fixed-order float
//! array. Uses `sysinfo` for the host gauges it can read (CPU usage,
//! memory, uptime, disk, matching `test_metrics.py`'s use of
//! `psutil.disk_usage(...).percent` for the same field); gauges this host
//! has genuinely no sensor for (temperature, GPU memory, NPU — all
//! SoC/hardware-specific) are substituted with `0.0`, per
//! `KindSensorMissing`'s policy (spec §7) — `sysinfo` is a net-new addition
//! to the dependency set (see DESIGN.md), since no crate already in the
//! retrieval pack wraps `/proc`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use sysinfo::{Disks, System};
use tracing::debug;

use telemetry_types::{MetricsSample, TelemetryBus, Value};

const SAMPLE_INTERVAL_SECS: u64 = 1;
const METRICS_KEY: &str = "root/metrics";

pub struct MetricsPublisher;

impl MetricsPublisher {
    /// Runs until `running` is cleared. Spawned on the `tokio` runtime
    /// (spec §5: "`tokio`'s multi-thread runtime is used only for the
    /// metrics publisher and telemetry listener dispatch").
    pub async fn run(telemetry: Arc<dyn TelemetryBus>, running: Arc<AtomicBool>) {
        let mut system = System::new_all();
        let start = Instant::now();
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(SAMPLE_INTERVAL_SECS));

        while running.load(Ordering::Acquire) {
            interval.tick().await;
            let sample = sample_once(&mut system, start);
            telemetry.publish(METRICS_KEY, Value::FloatArray(sample.to_array().to_vec()));
        }
    }
}

fn sample_once(system: &mut System, start: Instant) -> MetricsSample {
    system.refresh_cpu_usage();
    system.refresh_memory();

    debug!("cpu temperature and NPU/GPU gauges unavailable on this host, substituting 0.0");

    MetricsSample {
        cpu_temp_celsius: 0.0,
        cpu_usage_percent: system.global_cpu_usage() as f64,
        memory_mb: system.total_memory() as f64 / (1024.0 * 1024.0),
        uptime_sec: start.elapsed().as_secs_f64(),
        gpu_mem_mb: 0.0,
        used_ram_mb: system.used_memory() as f64 / (1024.0 * 1024.0),
        used_disk_percent: used_disk_percent(),
        npu_usage_percent: 0.0,
    }
}

/// Aggregate used/total bytes across every mounted disk into a single
/// percentage. Returns `0.0` if the host reports no disks at all.
fn used_disk_percent() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks
        .list()
        .iter()
        .fold((0u64, 0u64), |(total, available), disk| (total + disk.total_space(), available + disk.available_space()));
    if total == 0 {
        return 0.0;
    }
    (1.0 - available as f64 / total as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_once_substitutes_zero_for_unavailable_sensors() {
        let mut system = System::new_all();
        let sample = sample_once(&mut system, Instant::now());
        assert_eq!(sample.cpu_temp_celsius, 0.0);
        assert_eq!(sample.gpu_mem_mb, 0.0);
        assert_eq!(sample.npu_usage_percent, 0.0);
        assert!(sample.memory_mb >= 0.0);
    }

    #[test]
    fn sample_once_computes_real_disk_usage() {
        let mut system = System::new_all();
        let sample = sample_once(&mut system, Instant::now());
        assert!((0.0..=100.0).contains(&sample.used_disk_percent));
    }

    #[tokio::test]
    async fn run_publishes_at_least_one_sample_then_stops() {
        let telemetry: Arc<dyn TelemetryBus> = Arc::new(telemetry_types::InMemoryTelemetryBus::new());
        let running = Arc::new(AtomicBool::new(true));

        let running_for_task = running.clone();
        let telemetry_for_task = telemetry.clone();
        let handle = tokio::spawn(async move {
            MetricsPublisher::run(telemetry_for_task, running_for_task).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
        running.store(false, Ordering::Release);
        let _ = handle.await;

        assert!(telemetry.get(METRICS_KEY).is_some());
    }
}
