use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Absolute difference between two angles (radians), normalized into `[0, π]`.
pub fn angle_diff_abs(a: f32, b: f32) -> f32 {
    let two_pi = 2.0 * PI;
    let mut diff = (b - a).rem_euclid(two_pi);
    if diff >= PI {
        diff -= two_pi;
    }
    diff.abs()
}

/// Whether two undirected directions (mod π) are orthogonal within `tolerance`.
pub fn is_orthogonal(reference_angle: f32, other_angle: f32, tolerance: f32) -> bool {
    let d = angle_diff_abs(reference_angle, other_angle);
    let d = d.min(PI - d);
    (FRAC_PI_2 - d).abs() <= tolerance.abs()
}

/// Whether `angle` is parallel or orthogonal to `reference` (mod π/2).
pub fn is_aligned_or_orthogonal(reference: f32, angle: f32, tolerance: f32) -> bool {
    let d = (angle - reference).rem_euclid(FRAC_PI_2);
    d.min(FRAC_PI_2 - d) <= tolerance.abs()
}

/// Angle between an undirected axis (mod π) and a directed vector angle, in `[0, π/2]`.
pub fn axis_vec_diff(axis_angle: f32, vec_angle: f32) -> f32 {
    let d = angle_diff_abs(axis_angle, vec_angle);
    d.min(PI - d)
}

/// Grid axis closest to the image x axis, given a corner diagonal angle.
///
/// Board axes run at ±45° to the ChESS diagonal; the result lies in `(-π/4, π/4]`.
pub fn grid_axis_from_diagonal(diagonal: f32) -> f32 {
    let mut a = (diagonal + FRAC_PI_4).rem_euclid(FRAC_PI_2);
    if a > FRAC_PI_4 {
        a -= FRAC_PI_2;
    }
    a
}
