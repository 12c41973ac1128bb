//! The pipeline capability set (spec §3, §6): a polymorphic processing unit
//! bound to at most one camera at a time.
//!
//! Grounded on `pipeline.py`'s `Pipeline` ABC (`bind`, `processFrame`,
//! `onSettingChanged`) from the original implementation.

use std::time::Instant;

use telemetry_types::Value;

use crate::settings::PipelineSettings;

/// A decoded camera frame.
///
/// The teacher crate (`strand-cam`) represents frames with the
/// `machine-vision-formats` crate, which is a path-only dependency on
/// sibling crates not included in this workspace (see DESIGN.md). `image`,
/// already used for this purpose elsewhere in the retrieval pack
/// (`cosmic-utils-camera`, `fjh32-dashcam_rs`), is the idiomatic
/// stand-alone replacement.
pub type Frame = image::RgbImage;

/// What a pipeline's `processFrame` produced for a single tick (spec §4.6,
/// "View selection").
pub enum ProcessOutput {
    /// A single output frame; always published as `step_0`.
    Single(Frame),
    /// Multiple debug-stage frames; `view_id` selects which one streams.
    Sequence(Vec<Frame>),
    /// The pipeline produced no frame this tick (e.g. warming up).
    None,
}

impl ProcessOutput {
    /// Select the view named `view_id` (`step_<n>`), falling back to the
    /// first available stage if the requested one does not exist.
    pub fn select_view(&self, view_id: &str) -> Option<&Frame> {
        match self {
            ProcessOutput::Single(frame) => Some(frame),
            ProcessOutput::Sequence(frames) => {
                let index = view_id
                    .strip_prefix("step_")
                    .and_then(|n| n.parse::<usize>().ok())
                    .unwrap_or(0);
                frames.get(index).or_else(|| frames.first())
            }
            ProcessOutput::None => None,
        }
    }
}

/// A user-authored frame-processing unit (spec: GLOSSARY, §3).
///
/// Implementations do not reach back into the runtime manager (spec §9's
/// "cyclic references" REDESIGN FLAG): settings arrive by value through
/// `on_setting_changed`, and the pipeline never holds a reference to the
/// manager or the telemetry bus.
pub trait Pipeline: Send {
    /// Type name used for registry lookup and in the configuration file.
    fn type_name(&self) -> &'static str;

    /// Whether this pipeline is currently enabled. Disabled pipelines are
    /// skipped at discovery time (spec §4.5, §6).
    fn enabled(&self) -> bool {
        true
    }

    /// Called when this pipeline becomes bound to a camera. No required
    /// behavior (spec §6); pipelines override this to reset per-camera state.
    fn bind(&mut self, _camera_index: i64) {}

    /// Process one frame, returning the output to publish (spec §6).
    fn process_frame(&mut self, frame: &Frame, timestamp: Instant) -> ProcessOutput;

    /// Optional hook invoked when one of this pipeline's settings changes,
    /// from either direction (spec §4.6). May run concurrently with
    /// `process_frame` (spec §5): implementations must not assume exclusive
    /// access to their own state across this call and `process_frame`.
    fn on_setting_changed(&mut self, _setting: &str, _value: &Value) {}

    fn settings(&self) -> &PipelineSettings;
    fn settings_mut(&mut self) -> &mut PipelineSettings;

    /// Pipeline-authored key/value output for the telemetry `data/` subtree
    /// (spec §3). Called once per processed frame, after `process_frame`.
    /// Default is "nothing to publish."
    fn publish_result(&self) -> Vec<(String, Value)> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_view_picks_requested_stage() {
        let frames = vec![
            Frame::new(1, 1),
            Frame::new(2, 2),
            Frame::new(3, 3),
        ];
        let output = ProcessOutput::Sequence(frames);
        let picked = output.select_view("step_2").unwrap();
        assert_eq!(picked.dimensions(), (3, 3));
    }

    #[test]
    fn select_view_defaults_to_step_zero() {
        let output = ProcessOutput::Single(Frame::new(4, 4));
        assert_eq!(output.select_view("step_0").unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn select_view_falls_back_when_index_missing() {
        let output = ProcessOutput::Sequence(vec![Frame::new(1, 1)]);
        assert_eq!(output.select_view("step_9").unwrap().dimensions(), (1, 1));
    }
}
