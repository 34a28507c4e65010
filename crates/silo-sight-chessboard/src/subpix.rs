//! Iterative sub-pixel corner refinement.
//!
//! At a true X-junction `p`, every image gradient `g(q)` in the surrounding
//! window is orthogonal to `q - p`. Summing `g gᵀ (q - p) = 0` over the
//! window gives a 2x2 linear system for `p`, which is re-solved around the
//! updated estimate until it moves less than `eps`.

use crate::params::SubPixParams;
use nalgebra::{Matrix2, Point2, Vector2};
use silo_sight_core::{gradient, GrayImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Refine a single corner estimate. Returns the initial point when the
/// system is singular or the estimate leaves the search window.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    initial: Point2<f64>,
    params: &SubPixParams,
) -> Point2<f64> {
    let half = params.half_window as i64;
    let sigma2 = {
        let s = params.half_window.max(1) as f64;
        s * s
    };

    let mut p = initial;
    for _ in 0..params.max_iters {
        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();

        for dy in -half..=half {
            for dx in -half..=half {
                let (fx, fy) = (dx as f64, dy as f64);
                let q = Point2::new(p.x + fx, p.y + fy);
                if !img.contains(q.x, q.y) {
                    continue;
                }
                let w = (-(fx * fx + fy * fy) / (2.0 * sigma2)).exp();
                let g = gradient(img, q.x, q.y);
                let ggt = g * g.transpose() * w;
                a += ggt;
                b += ggt * q.coords;
            }
        }

        let Some(next) = a.try_inverse().map(|inv| Point2::from(inv * b)) else {
            return initial;
        };
        if !next.x.is_finite() || !next.y.is_finite() {
            return initial;
        }
        if (next - initial).abs().max() > params.half_window as f64 {
            return initial;
        }
        let step = (next - p).norm();
        p = next;
        if step < params.eps {
            break;
        }
    }
    p
}

/// Refine every corner in place.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, corners, params), fields(n = corners.len()))
)]
pub fn refine_corners(img: &GrayImageView<'_>, corners: &mut [Point2<f64>], params: &SubPixParams) {
    for c in corners.iter_mut() {
        *c = refine_corner(img, *c, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_sight_core::GrayImage;

    /// Anti-aliased X-junction centered at `(cx, cy)`.
    fn render_junction(width: usize, height: usize, cx: f64, cy: f64) -> GrayImage {
        const SS: usize = 8;
        let mut img = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let mut acc = 0.0;
                for sy in 0..SS {
                    for sx in 0..SS {
                        let px = x as f64 - 0.5 + (sx as f64 + 0.5) / SS as f64;
                        let py = y as f64 - 0.5 + (sy as f64 + 0.5) / SS as f64;
                        if (px - cx) * (py - cy) > 0.0 {
                            acc += 1.0;
                        }
                    }
                }
                img.data[y * width + x] = (30.0 + 200.0 * acc / (SS * SS) as f64).round() as u8;
            }
        }
        img
    }

    #[test]
    fn converges_to_the_true_junction() {
        let img = render_junction(40, 40, 20.3, 19.6);
        let refined = refine_corner(&img.view(), Point2::new(21.0, 19.0), &SubPixParams::default());
        assert!((refined.x - 20.3).abs() < 0.1, "x = {}", refined.x);
        assert!((refined.y - 19.6).abs() < 0.1, "y = {}", refined.y);
    }

    #[test]
    fn flat_patch_keeps_the_initial_estimate() {
        let img = GrayImage {
            width: 32,
            height: 32,
            data: vec![128; 32 * 32],
        };
        let p = Point2::new(15.5, 16.25);
        assert_eq!(refine_corner(&img.view(), p, &SubPixParams::default()), p);
    }

    #[test]
    fn refines_all_points_in_place() {
        let img = render_junction(40, 40, 18.5, 21.5);
        let mut pts = vec![Point2::new(18.0, 22.0)];
        refine_corners(&img.view(), &mut pts, &SubPixParams::default());
        assert!((pts[0].x - 18.5).abs() < 0.1);
        assert!((pts[0].y - 21.5).abs() < 0.1);
    }
}
