use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    /// Absolute lower bound on neighbor distance, pixels.
    pub min_spacing_pix: f32,
    /// Absolute upper bound on neighbor distance, pixels.
    pub max_spacing_pix: f32,
    /// Neighbor window relative to the median nearest-neighbor spacing.
    pub spacing_ratio: [f32; 2],
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 400.0,
            spacing_ratio: [0.6, 1.6],
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Sub-pixel refinement window and stopping rule.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half size of the square search window; 5 gives an 11x11 window.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop once the position update is below this many pixels.
    pub eps: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            eps: 1e-3,
        }
    }
}

/// Parameters of the chessboard detector.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Inner corners along a board row.
    pub cols: usize,
    /// Inner corners along a board column.
    pub rows: usize,
    /// Minimal ChESS response to consider.
    pub min_strength: f32,
    pub graph: GridGraphParams,
    pub subpix: SubPixParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            cols: 10,
            rows: 7,
            min_strength: 0.0,
            graph: GridGraphParams::default(),
            subpix: SubPixParams::default(),
        }
    }
}

impl ChessboardParams {
    pub fn for_board(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            ..Self::default()
        }
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.cols * self.rows
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardSizeError {
    #[error("board needs at least 2x2 inner corners, got {cols}x{rows}")]
    TooSmall { cols: usize, rows: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let params: ChessboardParams =
            serde_json::from_str(r#"{ "cols": 9, "subpix": { "max_iters": 10 } }"#).expect("json");
        assert_eq!(params.cols, 9);
        assert_eq!(params.rows, 7);
        assert_eq!(params.subpix.max_iters, 10);
        assert_eq!(params.subpix.half_window, 5);
        assert_eq!(params.corner_count(), 63);
    }
}
