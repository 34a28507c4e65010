use crate::corner::Corner;
use crate::geom::{grid_axis_from_diagonal, is_aligned_or_orthogonal};
use crate::gridgraph::{
    assign_grid_coordinates, connected_components, median_nearest_spacing, GraphFrame, GridGraph,
};
use crate::params::{BoardSizeError, ChessboardParams};
use log::{debug, info};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Dominant corner diagonal (mod π/2), from a strength-weighted
/// quadruple-angle average.
///
/// Neighboring X-junctions have orthogonal diagonals, so averaging in
/// `4θ` space merges both families into one direction.
pub fn estimate_dominant_diagonal(corners: &[Corner]) -> Option<f32> {
    let mut sum = Vector2::<f32>::zeros();
    let mut weight_sum = 0.0f32;

    for c in corners {
        let w = c.strength.max(0.0);
        if w <= 0.0 {
            continue;
        }
        let four_theta = 4.0 * c.orientation;
        sum += w * Vector2::new(four_theta.cos(), four_theta.sin());
        weight_sum += w;
    }

    if weight_sum <= 0.0 {
        return None;
    }
    let mean = sum / weight_sum;
    if mean.norm_squared() < 1e-6 {
        return None;
    }
    Some(0.25 * mean.y.atan2(mean.x))
}

/// Map from board `(col, row)` to graph cell.
#[derive(Clone, Copy, Debug)]
enum BoardRotation {
    Identity,
    HalfTurn,
    QuarterCw,
    QuarterCcw,
}

impl BoardRotation {
    #[inline]
    fn cell(self, c: i32, r: i32, cols: i32, rows: i32) -> (i32, i32) {
        match self {
            BoardRotation::Identity => (c, r),
            BoardRotation::HalfTurn => (cols - 1 - c, rows - 1 - r),
            BoardRotation::QuarterCw => (rows - 1 - r, c),
            BoardRotation::QuarterCcw => (r, cols - 1 - c),
        }
    }
}

/// Ordered inner corners of one board view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChessboardDetection {
    pub cols: usize,
    pub rows: usize,
    /// Row-major: index `row * cols + col`.
    pub corners: Vec<Point2<f64>>,
}

/// Chessboard detector over a cloud of ChESS corners.
///
/// Pipeline: strength filter, dominant axis from orientations, 4-connected
/// grid graph, connected components with BFS coordinates, then the first
/// component that covers exactly `cols x rows` cells is ordered with a
/// canonical origin.
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Result<Self, BoardSizeError> {
        if params.cols < 2 || params.rows < 2 {
            return Err(BoardSizeError::TooSmall {
                cols: params.cols,
                rows: params.rows,
            });
        }
        Ok(Self { params })
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, corners), fields(num_corners = corners.len()))
    )]
    pub fn detect_from_corners(&self, corners: &[Corner]) -> Option<ChessboardDetection> {
        let params = &self.params;
        let strong: Vec<Corner> = corners
            .iter()
            .copied()
            .filter(|c| c.strength >= params.min_strength)
            .collect();
        debug!("{} corners after strength filter", strong.len());

        if strong.len() < params.corner_count() {
            return None;
        }

        let diagonal = estimate_dominant_diagonal(&strong)?;
        let tol = params.graph.orientation_tolerance_deg.to_radians();
        let aligned: Vec<Corner> = strong
            .into_iter()
            .filter(|c| is_aligned_or_orthogonal(diagonal, c.orientation, tol))
            .collect();
        if aligned.len() < params.corner_count() {
            debug!("only {} corners agree with the dominant axis", aligned.len());
            return None;
        }

        let spacing = median_nearest_spacing(&aligned)?;
        let frame = GraphFrame {
            min_spacing: (spacing * params.graph.spacing_ratio[0]).max(params.graph.min_spacing_pix),
            max_spacing: (spacing * params.graph.spacing_ratio[1]).min(params.graph.max_spacing_pix),
            axis_angle: grid_axis_from_diagonal(diagonal),
        };
        let graph = GridGraph::new(&aligned, &params.graph, &frame);

        let mut components = connected_components(&graph);
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));

        for component in components
            .iter()
            .filter(|c| c.len() >= params.corner_count())
        {
            let coords = assign_grid_coordinates(&graph, component);
            if let Some(detection) = self.order_component(&aligned, &coords) {
                info!(
                    "chessboard {}x{} found among {} corners",
                    params.cols,
                    params.rows,
                    corners.len()
                );
                return Some(detection);
            }
        }

        debug!("no component matches a {}x{} board", params.cols, params.rows);
        None
    }

    fn order_component(
        &self,
        corners: &[Corner],
        coords: &[(usize, i32, i32)],
    ) -> Option<ChessboardDetection> {
        let (cols, rows) = (self.params.cols as i32, self.params.rows as i32);
        if coords.len() != (cols * rows) as usize {
            return None;
        }
        let width = coords.iter().map(|c| c.1).max()? + 1;
        let height = coords.iter().map(|c| c.2).max()? + 1;

        let cells: HashMap<(i32, i32), Point2<f64>> = coords
            .iter()
            .map(|&(node, i, j)| {
                let p = corners[node].position;
                ((i, j), Point2::new(p.x as f64, p.y as f64))
            })
            .collect();

        // Proper rotations only: the graph frame is never mirrored.
        let candidates = if (width, height) == (cols, rows) {
            [BoardRotation::Identity, BoardRotation::HalfTurn]
        } else if (width, height) == (rows, cols) {
            [BoardRotation::QuarterCw, BoardRotation::QuarterCcw]
        } else {
            return None;
        };

        let mut best: Option<(f64, Vec<Point2<f64>>)> = None;
        for rotation in candidates {
            let ordered: Option<Vec<Point2<f64>>> = (0..rows)
                .flat_map(|r| (0..cols).map(move |c| (c, r)))
                .map(|(c, r)| cells.get(&rotation.cell(c, r, cols, rows)).copied())
                .collect();
            let Some(ordered) = ordered else {
                continue;
            };
            let origin = ordered[0];
            let key = origin.x + origin.y;
            if best.as_ref().is_none_or(|(k, _)| key < *k) {
                best = Some((key, ordered));
            }
        }

        best.map(|(_, corners)| ChessboardDetection {
            cols: self.params.cols,
            rows: self.params.rows,
            corners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation2;
    use std::f32::consts::FRAC_PI_4;

    fn board_corners(cols: usize, rows: usize, spacing: f32, angle: f32, origin: (f32, f32)) -> Vec<Corner> {
        let rot = Rotation2::new(angle);
        let mut out = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                let p = rot * Vector2::new(c as f32 * spacing, r as f32 * spacing);
                let orientation = if (c + r) % 2 == 0 { FRAC_PI_4 } else { 3.0 * FRAC_PI_4 };
                out.push(Corner::new(p.x + origin.0, p.y + origin.1, orientation + angle, 1.0));
            }
        }
        out
    }

    fn detector(cols: usize, rows: usize) -> ChessboardDetector {
        ChessboardDetector::new(ChessboardParams::for_board(cols, rows)).expect("board")
    }

    #[test]
    fn orders_an_axis_aligned_board_row_major() {
        let corners = board_corners(5, 4, 20.0, 0.0, (100.0, 50.0));
        let det = detector(5, 4).detect_from_corners(&corners).expect("detected");
        assert_eq!(det.corners.len(), 20);
        assert_eq!(det.corners[0], Point2::new(100.0, 50.0));
        assert_eq!(det.corners[1], Point2::new(120.0, 50.0));
        assert_eq!(det.corners[5], Point2::new(100.0, 70.0));
    }

    #[test]
    fn upside_down_board_gets_the_same_origin_rule() {
        let corners = board_corners(5, 4, 20.0, std::f32::consts::PI, (300.0, 300.0));
        let det = detector(5, 4).detect_from_corners(&corners).expect("detected");
        let first = det.corners[0];
        assert!(det.corners.iter().all(|p| first.x + first.y <= p.x + p.y + 1e-6));
        assert!(det.corners[1].x > first.x);
    }

    #[test]
    fn board_rotated_by_a_quarter_turn_is_detected() {
        let corners = board_corners(5, 4, 20.0, std::f32::consts::FRAC_PI_2, (300.0, 100.0));
        let det = detector(5, 4).detect_from_corners(&corners).expect("detected");
        assert_eq!(det.corners.len(), 20);
        let d01 = det.corners[1] - det.corners[0];
        let d10 = det.corners[5] - det.corners[0];
        assert!((d01.norm() - 20.0).abs() < 1e-3);
        assert!((d10.norm() - 20.0).abs() < 1e-3);
        // Proper rotation: the row step is the column step turned by +90°.
        assert!((d01.x * d10.y - d01.y * d10.x) > 0.0);
    }

    #[test]
    fn slightly_tilted_board_is_detected() {
        let corners = board_corners(10, 7, 30.0, 0.15, (200.0, 120.0));
        let det = detector(10, 7).detect_from_corners(&corners).expect("detected");
        assert_eq!(det.corners.len(), 70);
        assert!((det.corners[0].x - 200.0).abs() < 1e-3);
    }

    #[test]
    fn incomplete_board_is_rejected() {
        let mut corners = board_corners(5, 4, 20.0, 0.0, (0.0, 0.0));
        corners.remove(7);
        assert!(detector(5, 4).detect_from_corners(&corners).is_none());
    }

    #[test]
    fn larger_grid_than_expected_is_rejected() {
        let corners = board_corners(6, 4, 20.0, 0.0, (0.0, 0.0));
        assert!(detector(5, 4).detect_from_corners(&corners).is_none());
    }

    #[test]
    fn tiny_board_spec_is_an_error() {
        let err = ChessboardDetector::new(ChessboardParams::for_board(1, 5)).err();
        assert_eq!(err, Some(BoardSizeError::TooSmall { cols: 1, rows: 5 }));
    }
}
