//! Per-camera output sinks (spec §4.4, §6): a streaming sink resized to the
//! configured stream resolution, and an optional disk recorder gated on the
//! `record` setting.
//!
//! The teacher (`strand-cam`) pairs an MJPEG HTTP stream (`video_streaming`)
//! with an `bg_movie_writer::BgMovieWriter` MP4 recorder per camera; neither
//! crate is in this workspace's dependency set (HTTP serving and video
//! codecs are Non-goals, spec §1). `StreamSink` keeps only the "most recently
//! published frame" a consumer would pull from such a stream; `DiskRecorder`
//! keeps the MJPG recorder's essential behavior — sequential frames written
//! to disk while recording is enabled — using `image`'s own JPEG encoder in
//! place of an OS-level MJPG container, since video containers are out of
//! scope.

use std::path::PathBuf;

use image::imageops::FilterType;
use pipeline_api::Frame;

/// Destination for the resized frame a camera publishes each tick.
///
/// A production deployment backs this with an MJPEG HTTP stream (out of
/// scope, spec §1); `LatestFrameSink` keeps just the latest frame and a
/// count, which is enough surface for the runtime manager and its tests.
pub trait StreamSink: Send {
    fn publish(&mut self, frame: &Frame);
}

#[derive(Default)]
pub struct LatestFrameSink {
    pub latest: Option<Frame>,
    pub frames_published: u64,
}

impl StreamSink for LatestFrameSink {
    fn publish(&mut self, frame: &Frame) {
        self.latest = Some(frame.clone());
        self.frames_published += 1;
    }
}

/// Resize `frame` to `stream_res` with area interpolation (spec §4.4's
/// `publishFrame`: "resize to stream resolution with area interpolation").
pub fn resize_for_stream(frame: &Frame, stream_res: (u32, u32)) -> Frame {
    if frame.dimensions() == stream_res {
        return frame.clone();
    }
    image::imageops::resize(frame, stream_res.0, stream_res.1, FilterType::Triangle)
}

/// MJPG-at-30fps disk recorder (spec §4.4, §6), conditional on the `record`
/// setting. Frames are written as sequentially numbered JPEG files under
/// `dir`; native capture resolution, not the resized stream resolution.
pub struct DiskRecorder {
    dir: Option<PathBuf>,
    next_index: u64,
}

impl DiskRecorder {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir, next_index: 0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn write(&mut self, frame: &Frame) -> std::io::Result<()> {
        let Some(dir) = &self.dir else { return Ok(()) };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("frame_{:08}.jpg", self.next_index));
        frame
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .map_err(std::io::Error::other)?;
        self.next_index += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.next_index
    }
}
