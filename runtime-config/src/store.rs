use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::types::{CameraConfig, NetworkConfig, PipelineConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("could not parse configuration: {0}")]
    Structural(String),
    #[error("could not parse configuration: two cameras share device id `{0}`")]
    DuplicateDeviceId(String),
    #[error("could not parse configuration: camera {0} has a singular or malformed intrinsic matrix")]
    SingularMatrix(i64),
    #[error("unknown camera index {0}")]
    UnknownCamera(i64),
}

/// On-disk shape of the configuration file (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    network: NetworkConfig,
    global: GlobalSection,
    #[serde(default)]
    pipelines: Vec<PipelineConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GlobalSection {
    camera_configs: BTreeMap<i64, CameraConfig>,
}

/// Process-wide configuration store (spec §4.2).
///
/// Holds `global` (camera index → [`CameraConfig`]) and `pipelines` (the
/// ordered pipeline declaration list), loaded from a YAML file and
/// re-serializable deterministically. Uses coarse-grained shared/exclusive
/// locking (spec §5), matching `braid-config-data`'s single-writer model.
pub struct ConfigStore {
    path: RwLock<Option<PathBuf>>,
    network: RwLock<NetworkConfig>,
    cameras: RwLock<BTreeMap<i64, CameraConfig>>,
    pipelines: RwLock<Vec<PipelineConfig>>,
}

impl ConfigStore {
    /// An empty store with no path set, useful for tests and for
    /// programmatically assembling configuration.
    pub fn empty() -> Self {
        Self {
            path: RwLock::new(None),
            network: RwLock::new(NetworkConfig::default()),
            cameras: RwLock::new(BTreeMap::new()),
            pipelines: RwLock::new(Vec::new()),
        }
    }

    /// Parse, validate structural shape, and populate from `path`. `path`
    /// is expanded for `~` and shell variables first (`braid-config-data`'s
    /// `fixup_relative_path` treatment, spec §4.2).
    /// Failure aborts startup (`KindConfigParse`, spec §4.2, §7).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = &crate::expand_path(&path.as_ref().to_string_lossy());
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_yaml::from_str(&raw)?;
        validate_structure(&file)?;
        info!(
            path = %path.display(),
            cameras = file.global.camera_configs.len(),
            pipelines = file.pipelines.len(),
            "configuration loaded"
        );

        Ok(Self {
            path: RwLock::new(Some(path.to_path_buf())),
            network: RwLock::new(file.network),
            cameras: RwLock::new(file.global.camera_configs),
            pipelines: RwLock::new(file.pipelines),
        })
    }

    /// Atomic serialize to the path this store was loaded from (or last
    /// saved to), block style with 2-space indent, preserving the key
    /// order declared on [`CameraConfig`]/[`PipelineConfig`] (spec §4.2, §6).
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self
            .path
            .read()
            .clone()
            .ok_or_else(|| ConfigError::Structural("store has no associated path".into()))?;
        self.save_to(&path)?;
        *self.path.write() = Some(path);
        Ok(())
    }

    /// Serialize to `path` specifically, without changing this store's
    /// associated path. `path` is expanded the same way [`Self::load`] is.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = &crate::expand_path(&path.as_ref().to_string_lossy());
        let file = ConfigFile {
            network: self.network.read().clone(),
            global: GlobalSection {
                camera_configs: self.cameras.read().clone(),
            },
            pipelines: self.pipelines.read().clone(),
        };
        let yaml = serde_yaml::to_string(&file)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, yaml).map_err(|source| ConfigError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn network(&self) -> NetworkConfig {
        self.network.read().clone()
    }

    pub fn get_camera_config(&self, index: i64) -> Option<CameraConfig> {
        self.cameras.read().get(&index).cloned()
    }

    pub fn set_camera_config(&self, index: i64, config: CameraConfig) {
        self.cameras.write().insert(index, config);
    }

    pub fn camera_indices(&self) -> Vec<i64> {
        self.cameras.read().keys().copied().collect()
    }

    pub fn all_camera_configs(&self) -> Vec<CameraConfig> {
        self.cameras.read().values().cloned().collect()
    }

    pub fn pipelines(&self) -> Vec<PipelineConfig> {
        self.pipelines.read().clone()
    }

    pub fn set_pipelines(&self, pipelines: Vec<PipelineConfig>) {
        *self.pipelines.write() = pipelines;
    }

    /// Next unused camera index, for hot-plug auto-registration (spec §4.4).
    pub fn next_camera_index(&self) -> i64 {
        self.cameras.read().keys().next_back().map(|i| i + 1).unwrap_or(0)
    }
}

fn validate_structure(file: &ConfigFile) -> Result<(), ConfigError> {
    let mut seen_ids: BTreeMap<&str, i64> = BTreeMap::new();
    for (index, cfg) in &file.global.camera_configs {
        if *index != cfg.index {
            return Err(ConfigError::Structural(format!(
                "camera config key {index} does not match its own index field {}",
                cfg.index
            )));
        }
        if !cfg.matrix_is_nonsingular() {
            return Err(ConfigError::SingularMatrix(*index));
        }
        if cfg.transform.translation_m.len() != 3 || cfg.transform.rotation_deg.len() != 3 {
            return Err(ConfigError::Structural(format!(
                "camera {index} has a malformed robot-frame transform"
            )));
        }
        // Degenerate configuration: two cameras sharing a device id (spec §9
        // Open Question, resolved per the spec's own recommendation).
        if let Some(other) = seen_ids.insert(cfg.id.as_str(), *index) {
            let _ = other;
            return Err(ConfigError::DuplicateDeviceId(cfg.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RobotFrameTransform;

    fn sample_camera(index: i64, id: &str) -> CameraConfig {
        CameraConfig {
            index,
            name: format!("cam{index}"),
            id: id.to_string(),
            matrix: [[600.0, 0.0, 320.0], [0.0, 600.0, 240.0], [0.0, 0.0, 1.0]],
            dist_coeffs: vec![0.0; 5],
            measured_res: (640, 480),
            stream_res: (320, 240),
            transform: RobotFrameTransform {
                translation_m: [0.0, 0.0, 0.0],
                rotation_deg: [0.0, 0.0, 0.0],
            },
            default_pipeline: 0,
            auto_registered: false,
        }
    }

    #[test]
    fn round_trip_load_save_load_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");

        let store = ConfigStore::empty();
        store.set_camera_config(0, sample_camera(0, "vendor:0001"));
        store.save_to(&path).unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        assert_eq!(reloaded.get_camera_config(0), Some(sample_camera(0, "vendor:0001")));

        let path2 = dir.path().join("settings2.yml");
        reloaded.save_to(&path2).unwrap();
        let reloaded2 = ConfigStore::load(&path2).unwrap();
        assert_eq!(reloaded2.all_camera_configs(), reloaded.all_camera_configs());
    }

    #[test]
    fn rejects_duplicate_device_ids_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        let store = ConfigStore::empty();
        store.set_camera_config(0, sample_camera(0, "same-id"));
        store.set_camera_config(1, sample_camera(1, "same-id"));
        store.save_to(&path).unwrap();

        let err = ConfigStore::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDeviceId(_)));
    }

    #[test]
    fn rejects_singular_matrix_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        let store = ConfigStore::empty();
        let mut cfg = sample_camera(0, "vendor:0001");
        cfg.matrix = [[0.0; 3]; 3];
        store.set_camera_config(0, cfg);
        store.save_to(&path).unwrap();

        let err = ConfigStore::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::SingularMatrix(0)));
    }

    #[test]
    fn next_camera_index_continues_past_max_existing() {
        let store = ConfigStore::empty();
        store.set_camera_config(0, sample_camera(0, "a"));
        store.set_camera_config(3, sample_camera(3, "b"));
        assert_eq!(store.next_camera_index(), 4);
    }
}
