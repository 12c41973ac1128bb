//! The pipeline capability contract: settings schema and validation, the
//! `Pipeline` trait, and the static pipeline type registry.
//!
//! See spec §4.1, §4.5, §6.

pub mod demo;
mod pipeline;
mod registry;
mod settings;

pub use pipeline::{Frame, Pipeline, ProcessOutput};
pub use registry::{PipelineFactory, PipelineRegistry, PipelineTypeInfo, SchemaFn};
pub use settings::{ColorFormat, Constraint, PipelineSettings, Setting, SettingsError, ValidationResult};
