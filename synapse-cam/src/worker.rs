//! Per-camera worker loop (spec §4.6): grab → fixture → pipeline.process →
//! select view → publish, with FPS pacing and latency instrumentation.
//!
//! Grounded on `strand-cam/src/frame_process_task.rs` for the shape of the
//! per-camera processing loop; one `std::thread` per camera, matching
//! `ci2-async::ThreadedAsyncCamera`'s one-thread-per-camera model (spec §5).

use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rusttype::{point, Font, Scale};
use tracing::warn;

use pipeline_api::Frame;
use telemetry_types::{camera_key, data_key, Value};

use crate::events::INVALID_PIPELINE;
use crate::manager::RuntimeManager;

pub fn spawn(manager: Arc<RuntimeManager>, camera_index: i64) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("camera-worker-{camera_index}"))
        .spawn(move || run(manager, camera_index))
        .expect("spawning camera worker thread")
}

fn run(manager: Arc<RuntimeManager>, camera_index: i64) {
    let span = tracing::info_span!("camera_worker", camera = camera_index);
    let _enter = span.enter();

    let Some(camera_handle) = manager.camera_handler.lock().camera(camera_index) else {
        warn!(camera = camera_index, "worker exiting: no camera handle at spawn time");
        return;
    };

    while manager.running.load(Ordering::Acquire) {
        let loop_start = Instant::now();

        let (max_fps, grabbed) = {
            let mut entry = camera_handle.lock();
            (entry.camera.max_fps(), entry.camera.grab_frame())
        };
        let capture_latency = loop_start.elapsed();

        let Some(raw_frame) = grabbed else {
            // The spec's pseudocode "if not ok: continue"s unconditionally on
            // an empty grab; a short sleep keeps this from becoming a tight
            // spin while the producer thread catches up.
            std::thread::sleep(Duration::from_millis(1));
            continue;
        };

        let (orientation, black_level) = {
            let entry = camera_handle.lock();
            let orientation = entry.camera.get_property("orientation").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let black_level = entry.camera.get_property("black_level").and_then(|v| v.as_f64()).unwrap_or(0.0);
            (orientation, black_level)
        };
        let frame = fixture_frame(raw_frame, orientation, black_level);

        let process_start = Instant::now();
        let pipeline_index = manager.current_pipeline(camera_index);
        let selected = if pipeline_index == INVALID_PIPELINE {
            frame.clone()
        } else if let Some(pipeline) = manager.pipeline_loader.get_pipeline(pipeline_index) {
            let output = pipeline.lock().process_frame(&frame, loop_start);
            let view_id = manager
                .telemetry
                .get(&camera_key(camera_index, "view_id"))
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "step_0".to_string());
            let selected = output.select_view(&view_id).cloned().unwrap_or_else(|| frame.clone());

            for (name, value) in pipeline.lock().publish_result() {
                manager.telemetry.publish(&data_key(camera_index, &name), value);
            }
            selected
        } else {
            // KindNoPipeline: publish the raw, fixture-applied frame only.
            frame.clone()
        };
        let process_latency = process_start.elapsed();

        manager.telemetry.publish(
            &camera_key(camera_index, "captureLatency"),
            Value::Float(capture_latency.as_secs_f64()),
        );
        manager.telemetry.publish(
            &camera_key(camera_index, "processLatency"),
            Value::Float(process_latency.as_secs_f64()),
        );

        let frame_time = Duration::from_secs_f64(1.0 / max_fps.max(1.0));
        let elapsed = loop_start.elapsed();
        if elapsed < frame_time {
            std::thread::sleep(frame_time - elapsed);
        }

        let total_secs = loop_start.elapsed().as_secs_f64();
        let fps = if total_secs > 0.0 { 1.0 / total_secs } else { max_fps };
        let selected = overlay_fps(selected, fps);

        let record = manager
            .telemetry
            .get(&camera_key(camera_index, "record"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        manager.camera_handler.lock().publish_frame(camera_index, &selected, record);
    }

    tracing::debug!(camera = camera_index, "worker thread exiting");
}

/// Apply fixture-layer adjustments to a raw frame: 90/180/270 rotation from
/// the `orientation` setting, then an optional uniform black-level offset
/// (spec §4.6's `fixtureFrame`, GLOSSARY's "Fixture").
fn fixture_frame(frame: Frame, orientation_deg: f64, black_level: f64) -> Frame {
    let rotated = match normalize_orientation(orientation_deg) {
        90 => image::imageops::rotate90(&frame),
        180 => image::imageops::rotate180(&frame),
        270 => image::imageops::rotate270(&frame),
        _ => frame,
    };
    if black_level > 0.0 {
        apply_black_level(rotated, black_level)
    } else {
        rotated
    }
}

fn normalize_orientation(deg: f64) -> i64 {
    ((deg.round() as i64) % 360 + 360) % 360
}

fn apply_black_level(mut frame: Frame, level: f64) -> Frame {
    let offset = level.round() as i16;
    for pixel in frame.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (*channel as i16 - offset).clamp(0, 255) as u8;
        }
    }
    frame
}

fn overlay_font() -> &'static Font<'static> {
    static FONT: OnceLock<Font<'static>> = OnceLock::new();
    FONT.get_or_init(|| Font::try_from_bytes(ttf_firacode::REGULAR as &[u8]).expect("embedded font data is valid"))
}

/// Alpha-blends a single-channel coverage value as `color` into `frame` at
/// `(x, y)`, matching `font-drawing::put_pixel`'s compositing math. Out of
/// bounds writes are clipped rather than panicking.
fn blend_pixel(frame: &mut Frame, x: i64, y: i64, color: (u8, u8, u8), coverage: f64) {
    if x < 0 || y < 0 || x as u32 >= frame.width() || y as u32 >= frame.height() {
        return;
    }
    let p = 1.0 - coverage;
    let old = frame.get_pixel(x as u32, y as u32).0;
    let new = image::Rgb([
        (old[0] as f64 * p + color.0 as f64 * coverage).round() as u8,
        (old[1] as f64 * p + color.1 as f64 * coverage).round() as u8,
        (old[2] as f64 * p + color.2 as f64 * coverage).round() as u8,
    ]);
    frame.put_pixel(x as u32, y as u32, new);
}

/// Draws the fps value as text in the frame's top-left corner (spec §4.6's
/// "overlay 'fps' text on selected"), grounded on `font-drawing::stamp_frame`
/// (white background box, dark-red glyph coverage) adapted from
/// `machine_vision_formats::ImageMutStride` onto `image::RgbImage`.
fn overlay_fps(mut frame: Frame, fps: f64) -> Frame {
    let text = format!("{fps:.1} fps");
    let font = overlay_font();
    let scale = Scale::uniform(24.0);
    let colour = (150, 0, 0);

    let v_metrics = font.v_metrics(scale);
    let x0 = 8.0;
    let y0 = 8.0;
    let glyphs: Vec<_> = font.layout(&text, scale, point(x0, y0 + v_metrics.ascent)).collect();

    let width = glyphs
        .iter()
        .rev()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .next()
        .unwrap_or(0.0)
        .ceil() as i64;
    let x_start = x0.floor() as i64;
    let y_start = y0.floor() as i64;
    let y_end = y_start + v_metrics.ascent.ceil() as i64;

    for x in x_start..(x_start + width) {
        for y in y_start..y_end {
            blend_pixel(&mut frame, x, y, (255, 255, 255), 1.0);
        }
    }

    for glyph in glyphs {
        if let Some(bounding_box) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, v| {
                blend_pixel(
                    &mut frame,
                    gx as i64 + bounding_box.min.x as i64,
                    gy as i64 + bounding_box.min.y as i64,
                    colour,
                    v as f64,
                );
            });
        }
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_frame_rotates_180_and_applies_black_level() {
        let mut frame = Frame::new(2, 1);
        frame.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        frame.put_pixel(1, 0, image::Rgb([40, 50, 60]));

        let rotated = fixture_frame(frame.clone(), 180.0, 0.0);
        assert_eq!(rotated.dimensions(), (2, 1));
        assert_eq!(rotated.get_pixel(0, 0).0, [40, 50, 60]);

        let darkened = fixture_frame(frame, 0.0, 15.0);
        assert_eq!(darkened.get_pixel(0, 0).0, [0, 5, 15]);
    }

    #[test]
    fn normalize_orientation_wraps_into_known_buckets() {
        assert_eq!(normalize_orientation(-90.0), 270);
        assert_eq!(normalize_orientation(450.0), 90);
        assert_eq!(normalize_orientation(0.0), 0);
    }

    #[test]
    fn overlay_fps_draws_into_the_frame() {
        let frame = Frame::from_pixel(200, 60, image::Rgb([0, 0, 0]));
        let stamped = overlay_fps(frame, 29.7);
        assert!(stamped.pixels().any(|p| p.0 != [0, 0, 0]));
    }

    #[test]
    fn overlay_fps_clips_rather_than_panics_on_a_tiny_frame() {
        let frame = Frame::new(4, 4);
        let stamped = overlay_fps(frame, 1.0);
        assert_eq!(stamped.dimensions(), (4, 4));
    }
}
