use nalgebra::{Matrix3, Rotation3, Vector3};

/// Rotation matrix from an axis-angle (Rodrigues) vector.
#[inline]
pub fn rodrigues(axis_angle: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::new(*axis_angle).into_inner()
}

/// Axis-angle vector of a rotation matrix.
///
/// The input is assumed orthonormal; call [`nearest_rotation`] first when it
/// comes from a noisy estimate.
#[inline]
pub fn rotation_to_axis_angle(r: &Matrix3<f64>) -> Vector3<f64> {
    Rotation3::from_matrix_unchecked(*r).scaled_axis()
}

/// Closest proper rotation (Frobenius norm) to an arbitrary 3x3 matrix.
pub fn nearest_rotation(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut fix = Matrix3::identity();
        fix[(2, 2)] = -1.0;
        r = u * fix * v_t;
    }
    Some(r)
}

/// Cross-product matrix `[v]x` with `[v]x w == v.cross(w)`.
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Rotation angle in degrees, `acos((trace - 1) / 2)`.
pub fn rotation_angle_deg(r: &Matrix3<f64>) -> f64 {
    let c = ((r.trace() - 1.0) / 2.0).clamp(-1.0, 1.0);
    c.acos().to_degrees()
}

/// `||R^T R - I||_F`.
pub fn orthogonality_error(r: &Matrix3<f64>) -> f64 {
    (r.transpose() * r - Matrix3::identity()).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rodrigues_round_trips_axis_angle() {
        let v = Vector3::new(0.1, -0.4, 0.25);
        let r = rodrigues(&v);
        assert_relative_eq!(rotation_to_axis_angle(&r), v, epsilon = 1e-12);
        assert!(orthogonality_error(&r) < 1e-12);
    }

    #[test]
    fn nearest_rotation_repairs_reflections_and_noise() {
        let r = rodrigues(&Vector3::new(0.0, 0.5, 0.0));
        let noisy = r + Matrix3::from_element(1e-3);
        let fixed = nearest_rotation(&noisy).expect("svd");
        assert!(orthogonality_error(&fixed) < 1e-12);
        assert_relative_eq!(fixed.determinant(), 1.0, epsilon = 1e-12);

        let reflection = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        let proper = nearest_rotation(&reflection).expect("svd");
        assert_relative_eq!(proper.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn skew_matches_cross_product() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(-0.5, 0.25, 4.0);
        assert_relative_eq!(skew(&a) * b, a.cross(&b), epsilon = 1e-12);
    }

    #[test]
    fn rotation_angle_of_a_thirty_degree_yaw() {
        let r = rodrigues(&Vector3::new(0.0, 30f64.to_radians(), 0.0));
        assert_relative_eq!(rotation_angle_deg(&r), 30.0, epsilon = 1e-9);
    }
}
