//! Image ingestion: directory listings, decoding, cropping and splitting of
//! combined two-view frames.

use ::image::{imageops, GrayImage};
use log::debug;
use rayon::prelude::*;
use silo_sight_calib::ImageSize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Pixels at or below this intensity count as border when cropping.
pub const DEFAULT_CROP_THRESHOLD: u8 = 10;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },

    #[error("directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("no png/jpg/jpeg images in {0}")]
    NoImages(PathBuf),

    #[error("camera directories hold different image counts ({first} vs {second})")]
    CountMismatch { first: usize, second: usize },

    #[error("cannot split a {width}x{height} image {layout}: the split dimension is odd")]
    OddDimension {
        width: u32,
        height: u32,
        layout: Layout,
    },

    #[error("unknown layout '{0}' (expected side-by-side or stacked)")]
    UnknownLayout(String),

    #[error("unknown front position '{0}' (expected left, right, top or bottom)")]
    UnknownFront(String),

    #[error("front position {front} does not apply to the {layout} layout")]
    FrontMismatch { layout: Layout, front: FrontPosition },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How two views are packed into one combined frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Left and right halves.
    SideBySide,
    /// Top and bottom halves.
    Stacked,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::SideBySide => f.write_str("side-by-side"),
            Layout::Stacked => f.write_str("stacked"),
        }
    }
}

impl FromStr for Layout {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "side-by-side" | "side_by_side" | "sbs" | "horizontal" => Ok(Layout::SideBySide),
            "stacked" | "vertical" => Ok(Layout::Stacked),
            _ => Err(FrameError::UnknownLayout(s.to_string())),
        }
    }
}

/// Which half of a combined frame holds the front view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrontPosition {
    Left,
    Right,
    Top,
    Bottom,
}

impl fmt::Display for FrontPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FrontPosition::Left => "left",
            FrontPosition::Right => "right",
            FrontPosition::Top => "top",
            FrontPosition::Bottom => "bottom",
        };
        f.write_str(s)
    }
}

impl FromStr for FrontPosition {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(FrontPosition::Left),
            "right" => Ok(FrontPosition::Right),
            "top" => Ok(FrontPosition::Top),
            "bottom" => Ok(FrontPosition::Bottom),
            _ => Err(FrameError::UnknownFront(s.to_string())),
        }
    }
}

/// Decode any supported image file to 8-bit grayscale.
pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, FrameError> {
    let path = path.as_ref();
    let img = ::image::open(path).map_err(|source| FrameError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_luma8())
}

/// Decode many files in parallel, keeping their order.
pub fn load_all(paths: &[PathBuf]) -> Result<Vec<GrayImage>, FrameError> {
    paths.par_iter().map(load_gray).collect()
}

/// Image files (png, jpg, jpeg; any case) directly inside `dir`, sorted by
/// path.
pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, FrameError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(FrameError::MissingDirectory(dir.to_path_buf()));
    }
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if supported && path.is_file() {
            images.push(path);
        }
    }
    if images.is_empty() {
        return Err(FrameError::NoImages(dir.to_path_buf()));
    }
    images.sort();
    debug!("{} images in {}", images.len(), dir.display());
    Ok(images)
}

/// Index-aligned image lists of both cameras.
///
/// Files are paired by sorted position, so both directories must name
/// their captures consistently.
pub fn paired_image_lists(
    first_dir: impl AsRef<Path>,
    second_dir: impl AsRef<Path>,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), FrameError> {
    let first = list_images(first_dir)?;
    let second = list_images(second_dir)?;
    if first.len() != second.len() {
        return Err(FrameError::CountMismatch {
            first: first.len(),
            second: second.len(),
        });
    }
    Ok((first, second))
}

/// Bounding box `(x, y, width, height)` of the pixels brighter than
/// `threshold`, or `None` when no pixel passes.
pub fn content_bounds(img: &GrayImage, threshold: u8) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in img.enumerate_pixels() {
        if p.0[0] > threshold {
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Crop to the bounding box of pixels brighter than `threshold`. The image
/// is returned unchanged when no pixel passes.
pub fn crop_to_content(img: &GrayImage, threshold: u8) -> GrayImage {
    match content_bounds(img, threshold) {
        Some((x, y, w, h)) => imageops::crop_imm(img, x, y, w, h).to_image(),
        None => img.clone(),
    }
}

/// Crop to content, then drop one trailing column (side-by-side) or row
/// (stacked) if needed so the frame splits evenly.
pub fn crop_for_split(img: &GrayImage, threshold: u8, layout: Layout) -> GrayImage {
    let (w, h) = img.dimensions();
    let bounds = content_bounds(img, threshold).unwrap_or((0, 0, w, h));
    crop_even(img, bounds, layout)
}

pub(crate) fn crop_even(img: &GrayImage, bounds: (u32, u32, u32, u32), layout: Layout) -> GrayImage {
    let (x, y, mut w, mut h) = bounds;
    match layout {
        Layout::SideBySide => w -= w % 2,
        Layout::Stacked => h -= h % 2,
    }
    imageops::crop_imm(img, x, y, w, h).to_image()
}

/// Split a combined frame into `(front, side)`.
pub fn split_combined(
    img: &GrayImage,
    layout: Layout,
    front: FrontPosition,
) -> Result<(GrayImage, GrayImage), FrameError> {
    let (w, h) = img.dimensions();
    let front_first = match (layout, front) {
        (Layout::SideBySide, FrontPosition::Left) | (Layout::Stacked, FrontPosition::Top) => true,
        (Layout::SideBySide, FrontPosition::Right) | (Layout::Stacked, FrontPosition::Bottom) => {
            false
        }
        _ => return Err(FrameError::FrontMismatch { layout, front }),
    };
    let (a, b) = match layout {
        Layout::SideBySide => {
            if w % 2 != 0 {
                return Err(FrameError::OddDimension {
                    width: w,
                    height: h,
                    layout,
                });
            }
            let half = w / 2;
            (
                imageops::crop_imm(img, 0, 0, half, h).to_image(),
                imageops::crop_imm(img, half, 0, half, h).to_image(),
            )
        }
        Layout::Stacked => {
            if h % 2 != 0 {
                return Err(FrameError::OddDimension {
                    width: w,
                    height: h,
                    layout,
                });
            }
            let half = h / 2;
            (
                imageops::crop_imm(img, 0, 0, w, half).to_image(),
                imageops::crop_imm(img, 0, half, w, half).to_image(),
            )
        }
    };
    Ok(if front_first { (a, b) } else { (b, a) })
}

/// Copy into the workspace image type.
pub fn to_core_image(img: &GrayImage) -> silo_sight_core::GrayImage {
    silo_sight_core::GrayImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw().clone(),
    }
}

pub fn image_size(img: &GrayImage) -> ImageSize {
    ImageSize::new(img.width(), img.height())
}
