use serde::{Deserialize, Serialize};
use telemetry_types::Value;

/// Translation + rotation from the camera's optical frame to the robot
/// frame (spec §3). Rotation is stored in degrees, matching the
/// `[[tx,ty,tz],[rx,ry,rz]]` config file shape in spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotFrameTransform {
    pub translation_m: [f64; 3],
    pub rotation_deg: [f64; 3],
}

/// Static per-camera configuration (spec §3).
///
/// Owned by the [`crate::ConfigStore`]; created at load time and mutated
/// only through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub index: i64,
    pub name: String,
    /// Stable device identifier (e.g. `vendor:product` or a serial number).
    pub id: String,
    pub matrix: [[f64; 3]; 3],
    pub dist_coeffs: Vec<f64>,
    pub measured_res: (u32, u32),
    pub stream_res: (u32, u32),
    pub transform: RobotFrameTransform,
    pub default_pipeline: i64,
    /// True if this record was synthesized for a hot-plugged device not
    /// present in the configuration file at load time, rather than
    /// user-declared (spec §4.4's auto-registration).
    #[serde(default)]
    pub auto_registered: bool,
}

impl CameraConfig {
    /// `true` if the 3x3 intrinsic matrix is non-singular (spec §4.2 invariant).
    pub fn matrix_is_nonsingular(&self) -> bool {
        let m = &self.matrix;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
        det.abs() > f64::EPSILON
    }
}

/// Ordered declaration of one pipeline instance (spec §3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub settings: Vec<(String, Value)>,
}

/// `network` section of the config file: consumed by the (out of scope)
/// telemetry bus collaborator (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub team_number: i64,
    pub name: String,
    #[serde(default)]
    pub server: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            team_number: 0,
            name: "synapse".to_string(),
            server: false,
        }
    }
}
