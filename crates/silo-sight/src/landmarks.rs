//! Facial landmark input: which landmarks are scored and where they come
//! from.
//!
//! Landmark detection itself is external. A [`LandmarkProvider`] reports the
//! full landmark vocabulary of a face model for one view (or `None` when no
//! face is present); [`LandmarkSelection`] then picks the stable subset that
//! is triangulated.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use silo_sight_core::{CameraId, GrayImage};
use std::fmt;
use std::path::Path;

/// Nose tip, nose bridge, chin, chin bottom, left and right cheek in the
/// 468-point face-mesh numbering.
pub const DEFAULT_LANDMARK_IDS: [usize; 6] = [1, 4, 199, 152, 234, 454];

#[derive(thiserror::Error, Debug)]
pub enum LandmarkError {
    #[error("landmark id {id} is outside the {available}-point vocabulary")]
    OutOfRange { id: usize, available: usize },

    #[error("failed to read landmarks: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid landmark json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("landmark provider failed: {0}")]
    Provider(String),
}

/// Ordered landmark ids to score.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSelection(Vec<usize>);

impl Default for LandmarkSelection {
    fn default() -> Self {
        Self(DEFAULT_LANDMARK_IDS.to_vec())
    }
}

impl LandmarkSelection {
    pub fn new(ids: Vec<usize>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pick the selected landmarks out of a full vocabulary, in selection
    /// order.
    pub fn select(&self, vocabulary: &[Point2<f64>]) -> Result<Vec<Point2<f64>>, LandmarkError> {
        self.0
            .iter()
            .map(|&id| {
                vocabulary.get(id).copied().ok_or(LandmarkError::OutOfRange {
                    id,
                    available: vocabulary.len(),
                })
            })
            .collect()
    }
}

/// Which side of the rig a frame comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Front,
    Side,
}

impl View {
    pub fn camera(self) -> CameraId {
        match self {
            View::Front => CameraId::First,
            View::Side => CameraId::Second,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Front => f.write_str("front"),
            View::Side => f.write_str("side"),
        }
    }
}

/// One camera frame handed to a [`LandmarkProvider`].
#[derive(Clone, Debug)]
pub struct ViewFrame {
    pub view: View,
    pub width: u32,
    pub height: u32,
    /// Pixels, when the provider needs them.
    pub image: Option<GrayImage>,
}

impl ViewFrame {
    /// A frame known only by its size.
    pub fn new(view: View, width: u32, height: u32) -> Self {
        Self {
            view,
            width,
            height,
            image: None,
        }
    }

    pub fn with_image(view: View, image: GrayImage) -> Self {
        Self {
            view,
            width: image.width as u32,
            height: image.height as u32,
            image: Some(image),
        }
    }
}

/// Source of facial landmarks for a single view.
pub trait LandmarkProvider: Sync {
    /// The full landmark vocabulary in pixel coordinates, or `None` when no
    /// face was found.
    fn landmarks(&self, view: &ViewFrame) -> Result<Option<Vec<Point2<f64>>>, LandmarkError>;
}

/// Landmarks of one view as stored in a sidecar file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarRecord {
    pub points: Vec<[f64; 2]>,
    /// Coordinates are fractions of the frame size, as face-mesh models
    /// report them.
    #[serde(default)]
    pub normalized: bool,
}

impl SidecarRecord {
    fn to_pixels(&self, width: u32, height: u32) -> Vec<Point2<f64>> {
        let (sx, sy) = if self.normalized {
            (width as f64, height as f64)
        } else {
            (1.0, 1.0)
        };
        self.points
            .iter()
            .map(|&[x, y]| Point2::new(x * sx, y * sy))
            .collect()
    }
}

/// Landmarks precomputed by an external detector and stored as JSON:
///
/// ```json
/// { "front": { "points": [[0.51, 0.42], ...], "normalized": true },
///   "side":  { "points": [[702.0, 388.5], ...] } }
/// ```
///
/// A missing record means no face in that view.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarLandmarks {
    #[serde(default)]
    pub front: Option<SidecarRecord>,
    #[serde(default)]
    pub side: Option<SidecarRecord>,
}

impl SidecarLandmarks {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, LandmarkError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn record(&self, view: View) -> Option<&SidecarRecord> {
        match view {
            View::Front => self.front.as_ref(),
            View::Side => self.side.as_ref(),
        }
    }
}

impl LandmarkProvider for SidecarLandmarks {
    fn landmarks(&self, frame: &ViewFrame) -> Result<Option<Vec<Point2<f64>>>, LandmarkError> {
        Ok(self
            .record(frame.view)
            .filter(|r| !r.points.is_empty())
            .map(|r| r.to_pixels(frame.width, frame.height)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_keeps_order() {
        let vocabulary: Vec<Point2<f64>> = (0..10).map(|i| Point2::new(i as f64, 0.0)).collect();
        let picked = LandmarkSelection::new(vec![7, 2, 5])
            .select(&vocabulary)
            .expect("select");
        assert_eq!(
            picked.iter().map(|p| p.x).collect::<Vec<_>>(),
            vec![7.0, 2.0, 5.0]
        );
    }

    #[test]
    fn out_of_range_id_is_an_error() {
        let vocabulary = vec![Point2::new(0.0, 0.0); 100];
        let err = LandmarkSelection::default().select(&vocabulary).unwrap_err();
        assert!(matches!(
            err,
            LandmarkError::OutOfRange {
                id: 199,
                available: 100
            }
        ));
    }

    #[test]
    fn normalized_sidecar_scales_by_frame_size() {
        let sidecar: SidecarLandmarks = serde_json::from_str(
            r#"{ "front": { "points": [[0.5, 0.25], [1.0, 1.0]], "normalized": true },
                 "side": { "points": [[10.0, 20.0]] } }"#,
        )
        .expect("json");

        let front = sidecar
            .landmarks(&ViewFrame::new(View::Front, 1280, 720))
            .expect("front")
            .expect("face");
        assert_eq!(front, vec![Point2::new(640.0, 180.0), Point2::new(1280.0, 720.0)]);

        let side = sidecar
            .landmarks(&ViewFrame::new(View::Side, 1280, 720))
            .expect("side")
            .expect("face");
        assert_eq!(side, vec![Point2::new(10.0, 20.0)]);
    }

    #[test]
    fn missing_record_means_no_face() {
        let sidecar: SidecarLandmarks =
            serde_json::from_str(r#"{ "front": { "points": [] } }"#).expect("json");
        for view in [View::Front, View::Side] {
            let found = sidecar
                .landmarks(&ViewFrame::new(view, 640, 480))
                .expect("landmarks");
            assert!(found.is_none(), "{view}");
        }
    }

    #[test]
    fn frame_takes_its_size_from_the_image() {
        let frame = ViewFrame::with_image(View::Side, GrayImage::new(64, 48));
        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(frame.view.camera(), CameraId::Second);
    }
}
