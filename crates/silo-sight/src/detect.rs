//! Chessboard detection from `image::GrayImage`: ChESS corners from
//! `chess-corners`, grid ordering, then sub-pixel refinement.

use crate::{chessboard, core};
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use log::debug;
use silo_sight_calib::{CalibrationTarget, CornerDetector, CornerObservation};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("invalid grayscale image buffer length (expected {expected} bytes, got {got})")]
    InvalidGrayBuffer { expected: usize, got: usize },

    #[error(transparent)]
    BoardSize(#[from] chessboard::BoardSizeError),
}

/// Default settings for the `chess-corners` ChESS detector.
///
/// Tuned for printed calibration boards filling a reasonable part of a
/// 720p frame.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = 0.2;
    cfg.params.nms_radius = 2;
    cfg
}

/// Borrow an `image::GrayImage` as the workspace view type.
pub fn gray_view(img: &::image::GrayImage) -> core::GrayImageView<'_> {
    core::GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Detect ChESS corners and adapt them into chessboard [`chessboard::Corner`]s.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, cfg), fields(width = img.width(), height = img.height()))
)]
pub fn detect_corners(img: &::image::GrayImage, cfg: &ChessConfig) -> Vec<chessboard::Corner> {
    find_chess_corners_image(img, cfg)
        .iter()
        .map(adapt_chess_corner)
        .collect()
}

/// ChESS corners, grid ordering and sub-pixel refinement in one call.
pub fn detect_chessboard(
    img: &::image::GrayImage,
    chess_cfg: &ChessConfig,
    params: chessboard::ChessboardParams,
) -> Result<Option<chessboard::ChessboardDetection>, DetectError> {
    let detector = chessboard::ChessboardDetector::new(params)?;
    Ok(detect_with(img, chess_cfg, &detector))
}

fn detect_with(
    img: &::image::GrayImage,
    chess_cfg: &ChessConfig,
    detector: &chessboard::ChessboardDetector,
) -> Option<chessboard::ChessboardDetection> {
    let corners = detect_corners(img, chess_cfg);
    let mut detection = detector.detect_from_corners(&corners)?;
    chessboard::refine_corners(
        &gray_view(img),
        &mut detection.corners,
        &detector.params.subpix,
    );
    Some(detection)
}

/// Build an `image::GrayImage` from a raw row-major grayscale buffer.
pub fn gray_image_from_slice(
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<::image::GrayImage, DetectError> {
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
        return Err(DetectError::InvalidGrayBuffer {
            expected,
            got: pixels.len(),
        });
    }
    ::image::GrayImage::from_raw(width, height, pixels.to_vec()).ok_or(
        DetectError::InvalidGrayBuffer {
            expected,
            got: pixels.len(),
        },
    )
}

/// Calibration-board detector over decoded grayscale images.
pub struct ChessboardCornerDetector {
    chess: ChessConfig,
    detector: chessboard::ChessboardDetector,
}

impl ChessboardCornerDetector {
    pub fn new(chess: ChessConfig, params: chessboard::ChessboardParams) -> Result<Self, DetectError> {
        Ok(Self {
            chess,
            detector: chessboard::ChessboardDetector::new(params)?,
        })
    }

    /// Default ChESS settings and a board sized to `target`.
    pub fn for_target(target: &CalibrationTarget) -> Result<Self, DetectError> {
        Self::new(
            default_chess_config(),
            chessboard::ChessboardParams::for_board(target.cols, target.rows),
        )
    }

    pub fn params(&self) -> &chessboard::ChessboardParams {
        &self.detector.params
    }
}

impl CornerDetector for ChessboardCornerDetector {
    type Image = ::image::GrayImage;

    fn detect(&self, image: &Self::Image, target: &CalibrationTarget) -> Option<CornerObservation> {
        let params = &self.detector.params;
        if (params.cols, params.rows) != (target.cols, target.rows) {
            debug!(
                "detector is sized {}x{} but the target is {}x{}",
                params.cols, params.rows, target.cols, target.rows
            );
            return None;
        }
        let detection = detect_with(image, &self.chess, &self.detector)?;
        let observation = CornerObservation::new(detection.corners);
        observation.check_against(target).ok()?;
        Some(observation)
    }
}

fn adapt_chess_corner(c: &CornerDescriptor) -> chessboard::Corner {
    chessboard::Corner::new(c.x, c.y, c.orientation, c.response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{GrayImage, Luma};

    const SQUARE: u32 = 40;
    const MARGIN: u32 = 60;

    /// 11x8 squares (10x7 inner corners), lightly blurred.
    fn render_board() -> GrayImage {
        let (w, h) = (11 * SQUARE + 2 * MARGIN, 8 * SQUARE + 2 * MARGIN);
        let sharp = GrayImage::from_fn(w, h, |x, y| {
            if x < MARGIN || y < MARGIN || x >= w - MARGIN || y >= h - MARGIN {
                return Luma([230]);
            }
            let (i, j) = ((x - MARGIN) / SQUARE, (y - MARGIN) / SQUARE);
            Luma([if (i + j) % 2 == 0 { 25 } else { 230 }])
        });
        ::image::imageops::blur(&sharp, 1.0)
    }

    #[test]
    fn finds_and_orders_a_rendered_board() {
        let img = render_board();
        let target = CalibrationTarget::default();
        let detector = ChessboardCornerDetector::for_target(&target).expect("detector");
        let obs = detector.detect(&img, &target).expect("board");
        assert_eq!(obs.points.len(), 70);

        // first inner corner sits one square in from the board's top-left
        let first = obs.points[0];
        let expected = (MARGIN + SQUARE) as f64;
        assert!(
            (first.x - expected).abs() < 1.5 && (first.y - expected).abs() < 1.5,
            "first corner at {first:?}"
        );
        // row-major: the next point is one square to the right
        let step = obs.points[1] - obs.points[0];
        assert!((step.x - SQUARE as f64).abs() < 1.5 && step.y.abs() < 1.5);
    }

    #[test]
    fn mismatched_target_is_not_detected() {
        let img = render_board();
        let detector =
            ChessboardCornerDetector::for_target(&CalibrationTarget::default()).expect("detector");
        let other = CalibrationTarget::new(9, 6, 0.02).expect("target");
        assert!(detector.detect(&img, &other).is_none());
    }

    #[test]
    fn blank_image_has_no_board() {
        let img = GrayImage::from_pixel(320, 240, Luma([128]));
        let found = detect_chessboard(
            &img,
            &default_chess_config(),
            chessboard::ChessboardParams::default(),
        )
        .expect("params");
        assert!(found.is_none());
    }

    #[test]
    fn raw_buffer_length_is_checked() {
        let err = gray_image_from_slice(4, 4, &[0; 15]).unwrap_err();
        assert!(matches!(
            err,
            DetectError::InvalidGrayBuffer {
                expected: 16,
                got: 15
            }
        ));
        assert!(gray_image_from_slice(4, 4, &[0; 16]).is_ok());
    }

    #[test]
    fn too_small_board_is_rejected() {
        let err = ChessboardCornerDetector::new(
            default_chess_config(),
            chessboard::ChessboardParams::for_board(1, 5),
        )
        .err()
        .expect("error");
        assert!(matches!(err, DetectError::BoardSize(_)));
    }
}
