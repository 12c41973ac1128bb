//! Static registry of pipeline implementations.
//!
//! Replaces reflective class discovery (scan files on disk, import, filter
//! by subclass and an `enabled` flag) with a registry populated at
//! startup-init time, per the REDESIGN FLAG in spec §9. `ci2::CameraModule`
//! takes the same shape for camera backends: a named factory the loader
//! looks up by the string declared in configuration, rather than scanning
//! the filesystem for implementors.

use std::collections::HashMap;

use tracing::debug;

use crate::pipeline::Pipeline;
use crate::settings::{PipelineSettings, Setting};

/// Builds a fresh [`PipelineSettings`] populated with this type's schema.
pub type SchemaFn = fn() -> Vec<Setting>;

/// Builds a pipeline instance from its settings object.
pub type PipelineFactory = fn(PipelineSettings) -> Box<dyn Pipeline>;

/// A registered pipeline implementation, keyed by its type name.
#[derive(Clone, Copy)]
pub struct PipelineTypeInfo {
    pub type_name: &'static str,
    pub schema: SchemaFn,
    pub factory: PipelineFactory,
}

/// Registry of pipeline types known to this process, keyed by type name.
///
/// Populated explicitly at setup time (spec §4.5's `pipelineTypes` map),
/// not via filesystem discovery.
#[derive(Default)]
pub struct PipelineRegistry {
    types: HashMap<&'static str, PipelineTypeInfo>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: PipelineTypeInfo) {
        debug!(type_name = info.type_name, "pipeline type registered");
        self.types.insert(info.type_name, info);
    }

    pub fn get(&self, type_name: &str) -> Option<&PipelineTypeInfo> {
        self.types.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }

    /// Construct a fresh settings object for a registered type, populated
    /// with values loaded from the configuration store (spec §4.5).
    pub fn build_settings(&self, type_name: &str, stored: Vec<(String, telemetry_types::Value)>) -> Option<PipelineSettings> {
        let info = self.get(type_name)?;
        let mut settings = PipelineSettings::from_schema((info.schema)());
        settings.from_dict(stored);
        Some(settings)
    }

    pub fn instantiate(&self, type_name: &str, settings: PipelineSettings) -> Option<Box<dyn Pipeline>> {
        let info = self.get(type_name)?;
        Some((info.factory)(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ProcessOutput;
    use std::time::Instant;

    struct Noop(PipelineSettings);
    impl Pipeline for Noop {
        fn type_name(&self) -> &'static str {
            "noop"
        }
        fn process_frame(&mut self, _frame: &crate::pipeline::Frame, _ts: Instant) -> ProcessOutput {
            ProcessOutput::None
        }
        fn settings(&self) -> &PipelineSettings {
            &self.0
        }
        fn settings_mut(&mut self) -> &mut PipelineSettings {
            &mut self.0
        }
    }

    #[test]
    fn registers_and_instantiates_by_name() {
        let mut registry = PipelineRegistry::new();
        registry.register(PipelineTypeInfo {
            type_name: "noop",
            schema: Vec::new,
            factory: |s| Box::new(Noop(s)),
        });
        let settings = registry.build_settings("noop", vec![]).unwrap();
        let pipeline = registry.instantiate("noop", settings).unwrap();
        assert_eq!(pipeline.type_name(), "noop");
    }

    #[test]
    fn unknown_type_name_returns_none() {
        let registry = PipelineRegistry::new();
        assert!(registry.get("nope").is_none());
    }
}
