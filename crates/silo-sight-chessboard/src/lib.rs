//! Calibration chessboard detection on top of ChESS corners.
//!
//! ## Quickstart
//!
//! ```
//! use silo_sight_chessboard::{ChessboardDetector, ChessboardParams, Corner};
//!
//! let detector = ChessboardDetector::new(ChessboardParams::for_board(10, 7)).expect("board");
//! let corners: Vec<Corner> = Vec::new();
//! assert!(detector.detect_from_corners(&corners).is_none());
//! ```
//!
//! Algorithm:
//! 1. Filter ChESS corners by strength.
//! 2. Estimate the dominant corner diagonal (mod π/2) and drop corners that
//!    disagree with it.
//! 3. Link each corner to at most four neighbors (right/left/up/down in the
//!    board-aligned frame) within a spacing window around the median
//!    nearest-neighbor distance, keeping only mutual links.
//! 4. BFS each connected component to integer grid coordinates.
//! 5. Accept the first component covering exactly `cols x rows` cells and
//!    order it row-major with the origin nearest the image top-left.
//! 6. Optionally refine the ordered corners to sub-pixel accuracy against
//!    the grayscale image.

mod corner;
mod detector;
mod geom;
mod gridgraph;
mod params;
mod subpix;

pub use corner::Corner;
pub use detector::{estimate_dominant_diagonal, ChessboardDetection, ChessboardDetector};
pub use params::{BoardSizeError, ChessboardParams, GridGraphParams, SubPixParams};
pub use subpix::{refine_corner, refine_corners};
