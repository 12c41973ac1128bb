use std::collections::HashMap;

use image::{Rgb, RgbImage};
use pipeline_api::Frame;
use telemetry_types::Value;

use crate::camera::{unknown_property, Camera, PropertyMeta, VideoMode};
use crate::error::{Error, Result};
use crate::producer::ProducerHandle;

/// The fixed, closed set of camera properties a backend exposes (spec §3's
/// supplemented `SynapseCamera` property map, `CSCORE_TO_CV_PROPS` in the
/// original). `orientation` is a fixture-layer pseudo-property rather than a
/// physical sensor control, included here because it still round-trips
/// through `set_property`/`get_property` like the others.
pub const KNOWN_PROPERTIES: &[&str] = &[
    "brightness",
    "contrast",
    "saturation",
    "hue",
    "gain",
    "exposure",
    "white_balance_temperature",
    "sharpness",
    "orientation",
    "black_level",
];

fn default_property_meta() -> HashMap<&'static str, PropertyMeta> {
    let mut m = HashMap::new();
    m.insert("brightness", PropertyMeta { min: 0.0, max: 100.0 });
    m.insert("contrast", PropertyMeta { min: 0.0, max: 100.0 });
    m.insert("saturation", PropertyMeta { min: 0.0, max: 100.0 });
    m.insert("hue", PropertyMeta { min: -180.0, max: 180.0 });
    m.insert("gain", PropertyMeta { min: 0.0, max: 100.0 });
    m.insert("exposure", PropertyMeta { min: 1.0, max: 2000.0 });
    m.insert("white_balance_temperature", PropertyMeta { min: 2000.0, max: 10000.0 });
    m.insert("sharpness", PropertyMeta { min: 0.0, max: 100.0 });
    m.insert("orientation", PropertyMeta { min: 0.0, max: 270.0 });
    m.insert("black_level", PropertyMeta { min: 0.0, max: 50.0 });
    m
}

/// A Camera backend that synthesizes frames instead of reading a physical
/// sensor, standing in for the CV capture backends that spec §1 excludes by
/// name (OpenCV, cscore, GStreamer) — the one in-tree implementor of
/// [`Camera`], the way `ci2`'s `Camera` trait only ships hardware-specific
/// implementors behind feature flags and is otherwise an empty contract.
pub struct SimulatedCamera {
    name: String,
    mode: VideoMode,
    connected: bool,
    properties: HashMap<&'static str, f64>,
    property_meta: HashMap<&'static str, PropertyMeta>,
    producer: ProducerHandle,
    frame_counter: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

impl SimulatedCamera {
    pub fn open(name: impl Into<String>, width: u32, height: u32, fps: f64) -> Self {
        let name = name.into();
        let mode = VideoMode { width, height, fps };
        let frame_counter = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let producer_counter = frame_counter.clone();

        let producer = ProducerHandle::spawn(name.clone(), fps, move || {
            let tick = producer_counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Some(synthesize_frame(width, height, tick))
        });

        let mut properties = HashMap::new();
        for key in KNOWN_PROPERTIES {
            properties.insert(*key, 0.0);
        }

        Self {
            name,
            mode,
            connected: true,
            properties,
            property_meta: default_property_meta(),
            producer,
            frame_counter,
        }
    }
}

fn synthesize_frame(width: u32, height: u32, tick: u32) -> Frame {
    let shade = (tick % 256) as u8;
    RgbImage::from_fn(width, height, |x, _y| {
        Rgb([shade, (x % 256) as u8, 128])
    })
}

impl Camera for SimulatedCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn grab_frame(&mut self) -> Option<Frame> {
        if !self.connected {
            return None;
        }
        self.producer.grab()
    }

    fn set_property(&mut self, key: &str, value: Value) -> Result<()> {
        let meta = *self
            .property_meta
            .get(key)
            .ok_or_else(|| unknown_property(key))?;
        let raw = value
            .as_f64()
            .ok_or_else(|| Error::OutOfRange(key.to_string()))?;
        let clamped = meta.clamp(raw);
        self.properties.insert(
            KNOWN_PROPERTIES.iter().find(|k| **k == key).copied().unwrap(),
            clamped,
        );
        Ok(())
    }

    fn get_property(&self, key: &str) -> Option<Value> {
        self.properties.get(key).map(|v| Value::Float(*v))
    }

    fn set_video_mode(&mut self, fps: f64, width: u32, height: u32) {
        // A simulated camera can render any requested mode exactly; real
        // backends here would negotiate to the nearest supported mode and
        // log a warning if the request cannot be honored (spec §4.3).
        self.mode = VideoMode { width, height, fps };
    }

    fn resolution(&self) -> (u32, u32) {
        (self.mode.width, self.mode.height)
    }

    fn max_fps(&self) -> f64 {
        self.mode.fps
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
        self.producer.close();
    }
}
