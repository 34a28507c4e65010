use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// Triangulated points, index-aligned with the landmarks that produced them.
///
/// A point whose homogeneous coordinate vanished is stored as NaN.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Point3DSet {
    points: Vec<Point3<f64>>,
}

impl Point3DSet {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point3<f64>> {
        self.points.iter()
    }

    /// Indices of points at infinity (no finite triangulation).
    pub fn degenerate(&self) -> Vec<usize> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| !is_finite(p))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn into_inner(self) -> Vec<Point3<f64>> {
        self.points
    }
}

impl Index<usize> for Point3DSet {
    type Output = Point3<f64>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<'a> IntoIterator for &'a Point3DSet {
    type Item = &'a Point3<f64>;
    type IntoIter = std::slice::Iter<'a, Point3<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[inline]
pub(crate) fn is_finite(p: &Point3<f64>) -> bool {
    p.coords.iter().all(|v| v.is_finite())
}
