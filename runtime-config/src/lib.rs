//! The process-wide configuration store: camera configs, the robot-frame
//! transform, network settings, and the ordered pipeline declaration list.
//!
//! See spec §3, §4.2, §6.

mod store;
mod types;

pub use store::{ConfigError, ConfigStore};
pub use types::{CameraConfig, NetworkConfig, PipelineConfig, RobotFrameTransform};

/// Expand `~` and environment variables in a path taken from a config file,
/// matching `braid-config-data::fixup_relative_path`'s treatment of paths
/// that may be written relative to the user's home directory.
pub fn expand_path(raw: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(shellexpand::full(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_resolves_home_tilde() {
        std::env::set_var("HOME", "/home/synapse");
        let expanded = expand_path("~/configs/settings.yml");
        assert_eq!(expanded, std::path::PathBuf::from("/home/synapse/configs/settings.yml"));
    }
}
