//! In-tree example pipelines demonstrating the pipeline contract.

mod apriltag;
mod color;

pub use apriltag::AprilTagPipeline;
pub use color::ColorPipeline;

use crate::registry::PipelineTypeInfo;

/// The pipeline types bundled with this runtime.
pub fn builtin_pipelines() -> Vec<PipelineTypeInfo> {
    vec![ColorPipeline::type_info(), AprilTagPipeline::type_info()]
}
