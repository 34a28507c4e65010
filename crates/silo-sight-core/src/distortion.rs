//! Brown-Conrady lens distortion on normalized image coordinates.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Number of fixed-point steps used to invert the distortion model.
pub const UNDISTORT_ITERS: usize = 20;

/// Radial (`k1`, `k2`, `k3`) and tangential (`p1`, `p2`) distortion.
///
/// Coefficients are stored and exchanged in the conventional
/// `[k1, k2, p1, p2, k3]` order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady5 {
    pub const DIM: usize = 5;

    pub fn from_coefficients(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_zero(&self) -> bool {
        self.coefficients().iter().all(|c| *c == 0.0)
    }

    /// Apply distortion to an ideal normalized point.
    #[inline]
    pub fn distort(&self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + dx, y * radial + dy)
    }

    /// Invert [`distort`](Self::distort) by fixed-point iteration.
    pub fn undistort(&self, distorted: Point2<f64>) -> Point2<f64> {
        if self.is_zero() {
            return distorted;
        }
        let mut x = distorted.x;
        let mut y = distorted.y;
        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
            if radial.abs() < 1e-12 {
                break;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            let nx = (distorted.x - dx) / radial;
            let ny = (distorted.y - dy) / radial;
            let step = (nx - x).abs().max((ny - y).abs());
            x = nx;
            y = ny;
            if step < 1e-14 {
                break;
            }
        }
        Point2::new(x, y)
    }
}
