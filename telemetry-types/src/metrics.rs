use serde::{Deserialize, Serialize};

/// Host-health gauges sampled by the metrics publisher on a fixed cadence.
///
/// Mirrors `HardwareMetricsProto`'s fixed-order float array: the field
/// order here is the wire order. A gauge that cannot be read (missing
/// sensor) is substituted with `0.0` by the caller rather than omitted,
/// per `KindSensorMissing`'s policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub cpu_temp_celsius: f64,
    pub cpu_usage_percent: f64,
    pub memory_mb: f64,
    pub uptime_sec: f64,
    pub gpu_mem_mb: f64,
    pub used_ram_mb: f64,
    pub used_disk_percent: f64,
    pub npu_usage_percent: f64,
}

impl MetricsSample {
    /// Fixed-order array as published to the telemetry bus's `root/metrics` entry.
    pub const LEN: usize = 8;

    pub fn to_array(self) -> [f64; Self::LEN] {
        [
            self.cpu_temp_celsius,
            self.cpu_usage_percent,
            self.memory_mb,
            self.uptime_sec,
            self.gpu_mem_mb,
            self.used_ram_mb,
            self.used_disk_percent,
            self.npu_usage_percent,
        ]
    }
}

impl Default for MetricsSample {
    fn default() -> Self {
        Self {
            cpu_temp_celsius: 0.0,
            cpu_usage_percent: 0.0,
            memory_mb: 0.0,
            uptime_sec: 0.0,
            gpu_mem_mb: 0.0,
            used_ram_mb: 0.0,
            used_disk_percent: 0.0,
            npu_usage_percent: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_order_matches_wire_contract() {
        let sample = MetricsSample {
            cpu_temp_celsius: 1.0,
            cpu_usage_percent: 2.0,
            memory_mb: 3.0,
            uptime_sec: 4.0,
            gpu_mem_mb: 5.0,
            used_ram_mb: 6.0,
            used_disk_percent: 7.0,
            npu_usage_percent: 8.0,
        };
        assert_eq!(sample.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }
}
