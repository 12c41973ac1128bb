//! Demonstration pipeline grounded on `color_pipeline.py`: thresholds a
//! color range and reports how much of the frame matched it.
//!
//! The concrete color-space conversion and contour detection are the
//! out-of-scope CV algorithm (spec §1); the settings schema, binding, and
//! view-sequence shape are real.

use std::time::Instant;

use telemetry_types::Value;

use crate::pipeline::{Frame, Pipeline, ProcessOutput};
use crate::registry::PipelineTypeInfo;
use crate::settings::{Constraint, PipelineSettings, Setting};

pub struct ColorPipeline {
    settings: PipelineSettings,
    camera_index: Option<i64>,
    last_match_fraction: f32,
}

fn schema() -> Vec<Setting> {
    vec![
        Setting {
            key: "color_space".into(),
            constraint: Constraint::Enumerated {
                options: vec!["RGB".into(), "HSV".into()],
                allow_multiple: false,
            },
            default: Value::String("HSV".into()),
            description: Some("Color space the threshold range is expressed in".into()),
        },
        Setting {
            key: "lower".into(),
            constraint: Constraint::List {
                inner: Some(Box::new(Constraint::Range { min: 0.0, max: Some(255.0), step: Some(1.0) })),
                min_length: Some(3),
                max_length: Some(3),
            },
            default: Value::IntArray(vec![0, 0, 0]),
            description: Some("Lower bound of the threshold range".into()),
        },
        Setting {
            key: "upper".into(),
            constraint: Constraint::List {
                inner: Some(Box::new(Constraint::Range { min: 0.0, max: Some(255.0), step: Some(1.0) })),
                min_length: Some(3),
                max_length: Some(3),
            },
            default: Value::IntArray(vec![255, 255, 255]),
            description: Some("Upper bound of the threshold range".into()),
        },
        Setting {
            key: "min_size".into(),
            constraint: Constraint::Range { min: 0.0, max: Some(1.0), step: None },
            default: Value::Float(0.001),
            description: Some("Minimum contour area as a fraction of the frame area".into()),
        },
    ]
}

impl ColorPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            camera_index: None,
            last_match_fraction: 0.0,
        }
    }

    pub fn type_info() -> PipelineTypeInfo {
        PipelineTypeInfo {
            type_name: "color",
            schema,
            factory: |s| Box::new(ColorPipeline::new(s)),
        }
    }
}

impl Pipeline for ColorPipeline {
    fn type_name(&self) -> &'static str {
        "color"
    }

    fn bind(&mut self, camera_index: i64) {
        self.camera_index = Some(camera_index);
    }

    fn process_frame(&mut self, frame: &Frame, _timestamp: Instant) -> ProcessOutput {
        // The actual HSV/RGB thresholding and contour search is the
        // out-of-scope CV algorithm. We report a deterministic stand-in
        // figure so downstream telemetry has something to mirror.
        self.last_match_fraction = 0.0;
        ProcessOutput::Single(frame.clone())
    }

    fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut PipelineSettings {
        &mut self.settings
    }

    fn publish_result(&self) -> Vec<(String, Value)> {
        vec![("match_fraction".into(), Value::Float(self.last_match_fraction as f64))]
    }
}
