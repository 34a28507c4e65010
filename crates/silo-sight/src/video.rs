//! Sampled grayscale frames from a video file, decoded with FFmpeg.

use crate::frames::{content_bounds, crop_even, split_combined, FrameError, FrontPosition, Layout};
use ::image::GrayImage;
use ffmpeg_next as ffmpeg;
use log::{debug, info};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum VideoError {
    #[error("ffmpeg: {0}")]
    Ffmpeg(#[from] ffmpeg::Error),

    #[error("{0} has no video stream")]
    NoVideoStream(PathBuf),

    #[error("frame interval must be at least 1")]
    ZeroInterval,

    #[error("decoded frame has no usable gray plane")]
    BadFrame,

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Decode `path` and keep every `interval`-th frame, starting with the
/// first.
pub fn extract_frames(path: impl AsRef<Path>, interval: usize) -> Result<Vec<GrayImage>, VideoError> {
    let path = path.as_ref();
    if interval == 0 {
        return Err(VideoError::ZeroInterval);
    }
    ffmpeg::init()?;
    let mut input = ffmpeg::format::input(path)?;
    let stream = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| VideoError::NoVideoStream(path.to_path_buf()))?;
    let stream_index = stream.index();
    let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
    let mut decoder = context.decoder().video()?;
    let mut scaler = ffmpeg::software::scaling::context::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg::util::format::pixel::Pixel::GRAY8,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::flag::Flags::BILINEAR,
    )?;

    let mut sampler = FrameSampler::new(interval);
    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        sampler.drain(&mut decoder, &mut scaler)?;
    }
    decoder.send_eof()?;
    sampler.drain(&mut decoder, &mut scaler)?;

    info!(
        "{}: kept {} of {} frames (every {interval})",
        path.display(),
        sampler.frames.len(),
        sampler.decoded
    );
    Ok(sampler.frames)
}

/// Sampled frames of a two-view recording (a video call showing both
/// cameras), split into `(front, side)` sequences.
///
/// Black bars are detected on the first kept frame and cropped from every
/// frame; see [`crate::frames::crop_for_split`].
pub fn split_video_frames(
    path: impl AsRef<Path>,
    interval: usize,
    layout: Layout,
    front: FrontPosition,
    crop_threshold: u8,
) -> Result<(Vec<GrayImage>, Vec<GrayImage>), VideoError> {
    let frames = extract_frames(path, interval)?;
    let Some(first) = frames.first() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let (w, h) = first.dimensions();
    let bounds = content_bounds(first, crop_threshold).unwrap_or((0, 0, w, h));
    debug!("content bounds {bounds:?} in a {w}x{h} recording");

    let mut fronts = Vec::with_capacity(frames.len());
    let mut sides = Vec::with_capacity(frames.len());
    for frame in &frames {
        let (f, s) = split_combined(&crop_even(frame, bounds, layout), layout, front)?;
        fronts.push(f);
        sides.push(s);
    }
    Ok((fronts, sides))
}

struct FrameSampler {
    interval: usize,
    decoded: usize,
    frames: Vec<GrayImage>,
}

impl FrameSampler {
    fn new(interval: usize) -> Self {
        Self {
            interval,
            decoded: 0,
            frames: Vec::new(),
        }
    }

    fn drain(
        &mut self,
        decoder: &mut ffmpeg::decoder::Video,
        scaler: &mut ffmpeg::software::scaling::Context,
    ) -> Result<(), VideoError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            if self.decoded % self.interval == 0 {
                let mut gray = ffmpeg::frame::Video::empty();
                scaler.run(&decoded, &mut gray)?;
                self.frames.push(gray_from_frame(&gray)?);
            }
            self.decoded += 1;
        }
        debug!("{} frames decoded so far", self.decoded);
        Ok(())
    }
}

/// Copy the luma plane, dropping the row padding.
fn gray_from_frame(frame: &ffmpeg::frame::Video) -> Result<GrayImage, VideoError> {
    let (width, height) = (frame.width(), frame.height());
    let stride = frame.stride(0);
    let data = frame.data(0);
    let w = width as usize;
    if stride < w || data.len() < stride * height as usize {
        return Err(VideoError::BadFrame);
    }
    let mut pixels = Vec::with_capacity(w * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        pixels.extend_from_slice(&row[..w]);
    }
    GrayImage::from_raw(width, height, pixels).ok_or(VideoError::BadFrame)
}
