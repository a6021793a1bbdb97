//! 3x3 affine transforms

use crate::geometry::Vec2;

/// Row-major 3x3 matrix representing `[[a, b, c], [d, e, f], [0, 0, 1]]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix3(pub [f32; 9]);

impl Default for Matrix3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix3 {
    pub const IDENTITY: Matrix3 = Matrix3([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Matrix3([1.0, 0.0, x, 0.0, 1.0, y, 0.0, 0.0, 1.0])
    }

    /// Rotation by `radians`, counter-clockwise in a y-up frame
    pub fn rotate(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Matrix3([c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0])
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Matrix3([sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0])
    }

    /// Standard matrix product `self * other`.
    ///
    /// Applying the result to a point applies `other` first, then `self`.
    pub fn mul(&self, other: &Matrix3) -> Matrix3 {
        let a = &self.0;
        let b = &other.0;
        let mut out = [0.0f32; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = a[row * 3] * b[col]
                    + a[row * 3 + 1] * b[3 + col]
                    + a[row * 3 + 2] * b[6 + col];
            }
        }
        Matrix3(out)
    }

    /// Transform a point (implicit homogeneous w = 1)
    pub fn apply(&self, p: Vec2) -> Vec2 {
        let m = &self.0;
        Vec2::new(
            m[0] * p.x + m[1] * p.y + m[2],
            m[3] * p.x + m[4] * p.y + m[5],
        )
    }

    /// Inverse transform, `None` when the matrix is singular
    pub fn invert(&self) -> Option<Matrix3> {
        let [a, b, c, d, e, f, ..] = self.0;
        let det = a * e - b * d;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Matrix3([
            e * inv,
            -b * inv,
            (b * f - c * e) * inv,
            -d * inv,
            a * inv,
            (c * d - a * f) * inv,
            0.0,
            0.0,
            1.0,
        ]))
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Column-major copy, as expected by APIs without a transpose flag
    pub fn to_cols_array(&self) -> [f32; 9] {
        let m = &self.0;
        [m[0], m[3], m[6], m[1], m[4], m[7], m[2], m[5], m[8]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        a.approx_eq(b, 1e-5)
    }

    #[test]
    fn test_identity_apply() {
        for p in [Vec2::new(0.0, 0.0), Vec2::new(-3.5, 7.25), Vec2::new(1e4, -2.0)] {
            assert_eq!(Matrix3::identity().apply(p), p);
        }
    }

    #[test]
    fn test_translate_scale_rotate() {
        assert_eq!(Matrix3::translate(3.0, 4.0).apply(Vec2::ZERO), Vec2::new(3.0, 4.0));
        assert_eq!(
            Matrix3::scale(2.0, 5.0).apply(Vec2::new(1.0, 1.0)),
            Vec2::new(2.0, 5.0)
        );
        let p = Vec2::new(2.0, -1.0);
        assert!(approx(Matrix3::rotate(0.0).apply(p), p));
        let quarter = Matrix3::rotate(std::f32::consts::FRAC_PI_2).apply(Vec2::new(1.0, 0.0));
        assert!(approx(quarter, Vec2::new(0.0, 1.0)));
    }

    #[test]
    fn test_composition_order() {
        // translate then scale, as a canvas does with post-multiplication
        let m = Matrix3::translate(10.0, 0.0).mul(&Matrix3::scale(2.0, 2.0));
        assert_eq!(m.apply(Vec2::new(1.0, 1.0)), Vec2::new(12.0, 2.0));
        assert!(Matrix3::identity().mul(&m) == m);
        assert!(Matrix3::identity().is_identity());
    }

    #[test]
    fn test_invert_round_trips_points() {
        let m = Matrix3::translate(5.0, -2.0)
            .mul(&Matrix3::rotate(0.7))
            .mul(&Matrix3::scale(2.0, 3.0));
        let inverse = m.invert().unwrap();
        let p = Vec2::new(1.5, -4.0);
        assert!(approx(inverse.apply(m.apply(p)), p));
        assert!(Matrix3::scale(0.0, 1.0).invert().is_none());
    }
}
