//! The error taxonomy from spec §7, as a single `thiserror` enum mirroring
//! `ci2::Error`'s shape: one variant per `Kind*` row, each carrying the
//! human-readable description the table specifies. Component-local errors
//! convert in via `#[from]`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("could not parse configuration: {0}")]
    ConfigParse(#[from] runtime_config::ConfigError),

    #[error("could not open camera: {0}")]
    CameraOpen(#[from] camera_io::Error),

    #[error("unknown camera or pipeline index: {0}")]
    BadIndex(String),

    #[error("pipeline {pipeline_index} is already bound to camera {held_by}")]
    PipelineBusy { pipeline_index: i64, held_by: i64 },

    #[error("no pipeline instance bound for camera {camera_index}")]
    NoPipeline { camera_index: i64 },

    #[error("unknown setting `{0}`")]
    UnknownSetting(String),

    #[error("invalid value for setting `{key}`: {message}")]
    InvalidSetting { key: String, message: String },

    #[error("camera does not support requested video mode, keeping prior mode")]
    VideoModeUnsupported,

    #[error("metrics sensor unavailable: {0}")]
    SensorMissing(String),

    #[error("failed to load pipeline definition: {0}")]
    PipelineLoad(String),
}

impl From<pipeline_api::SettingsError> for RuntimeError {
    fn from(err: pipeline_api::SettingsError) -> Self {
        match err {
            pipeline_api::SettingsError::UnknownSetting { key } => RuntimeError::UnknownSetting(key),
            pipeline_api::SettingsError::InvalidSetting { key, message } => {
                RuntimeError::InvalidSetting { key, message }
            }
        }
    }
}
