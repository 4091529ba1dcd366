//! Cube map face selection and projection.
//!
//! Faces are ordered +X, -X, +Y, -Y, +Z, -Z and use the OpenGL cube map orientation. A face
//! coordinate is `s = sign_s * p_s / (2 |c|) + 0.5` where `c` is the major (face) component of the
//! direction and `p_s` the component mapped to `s`; likewise for `t`.

use crate::math::*;

struct FaceAxes {
    major: usize,
    s_axis: usize,
    s_sign: f32,
    t_axis: usize,
    t_sign: f32,
}

const FACES: [FaceAxes; 6] = [
    FaceAxes { major: 0, s_axis: 2, s_sign: -1.0, t_axis: 1, t_sign: -1.0 },
    FaceAxes { major: 0, s_axis: 2, s_sign: 1.0, t_axis: 1, t_sign: -1.0 },
    FaceAxes { major: 1, s_axis: 0, s_sign: 1.0, t_axis: 2, t_sign: 1.0 },
    FaceAxes { major: 1, s_axis: 0, s_sign: 1.0, t_axis: 2, t_sign: -1.0 },
    FaceAxes { major: 2, s_axis: 0, s_sign: 1.0, t_axis: 1, t_sign: -1.0 },
    FaceAxes { major: 2, s_axis: 0, s_sign: -1.0, t_axis: 1, t_sign: -1.0 },
];

/// Face whose axis dominates `dir`. Ties go to Y over X and to X/Y over Z.
pub(crate) fn select_face(dir: Vec3) -> usize {
    let a = dir.abs();
    let (face, major) = if a.z > a.x.max(a.y) {
        (4, dir.z)
    } else if a.y > a.x {
        (2, dir.y)
    } else {
        (0, dir.x)
    };
    if major < 0.0 { face + 1 } else { face }
}

/// A direction projected onto its cube face.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CubeProjection {
    pub face: usize,

    /// Face coordinates clamped to [0, 1].
    pub st: Vec2,

    /// Face coordinates before clamping, used for derivatives.
    raw: Vec2,
    dir: Vec3,
}

impl CubeProjection {
    /// `None` for zero or non-finite directions.
    pub fn new(dir: Vec3) -> Option<Self> {
        let face = select_face(dir);
        let axes = &FACES[face];
        let r = 0.5 / dir.axis(axes.major).abs();
        let raw = Vec2::new(
            axes.s_sign * dir.axis(axes.s_axis) * r + 0.5,
            axes.t_sign * dir.axis(axes.t_axis) * r + 0.5,
        );
        if !raw.is_finite() {
            return None;
        }
        let st = Vec2::new(raw.x.clamp(0.0, 1.0), raw.y.clamp(0.0, 1.0));
        Some(Self { face, st, raw, dir })
    }

    fn axes(&self) -> &'static FaceAxes {
        &FACES[self.face]
    }

    /// Change of (s, t) caused by a direction differential `d`, with the face held fixed.
    pub fn project_differential(&self, d: Vec3) -> Vec2 {
        let axes = self.axes();
        let c = self.dir.axis(axes.major);
        let r = 0.5 / c.abs();
        let dm = d.axis(axes.major) / c;
        Vec2::new(
            axes.s_sign * d.axis(axes.s_axis) * r - (self.raw.x - 0.5) * dm,
            axes.t_sign * d.axis(axes.t_axis) * r - (self.raw.y - 0.5) * dm,
        )
    }

    /// Gradient with respect to the direction of a loss with gradient `g` on (s, t).
    pub fn direction_grad(&self, g: Vec2) -> Vec3 {
        let axes = self.axes();
        let c = self.dir.axis(axes.major);
        let r = 0.5 / c.abs();
        let mut out = Vec3::ZERO;
        *out.axis_mut(axes.s_axis) += g.x * axes.s_sign * r;
        *out.axis_mut(axes.t_axis) += g.y * axes.t_sign * r;
        *out.axis_mut(axes.major) -= (g.x * (self.raw.x - 0.5) + g.y * (self.raw.y - 0.5)) / c;
        out
    }

    /// Gradient with respect to the direction of `project_differential(d)` given a gradient `g`
    /// on its result. The gradient with respect to `d` itself is `direction_grad(g)`.
    pub fn differential_direction_grad(&self, d: Vec3, g: Vec2) -> Vec3 {
        let axes = self.axes();
        let c = self.dir.axis(axes.major);
        let cc = c * c.abs();
        let dm = d.axis(axes.major);
        let mut out = Vec3::ZERO;
        for (axis, sign, gi) in [(axes.s_axis, axes.s_sign, g.x), (axes.t_axis, axes.t_sign, g.y)] {
            let k = 0.5 * sign * gi;
            *out.axis_mut(axis) -= k * dm / cc;
            *out.axis_mut(axes.major) += k * (2.0 * self.dir.axis(axis) * dm / (c * cc) - d.axis(axis) / cc);
        }
        out
    }
}

/// Direction through the centre of texel (x, y) of `face`; the texel may lie off the face.
pub(crate) fn texel_direction(face: usize, x: isize, y: isize, size: usize) -> Vec3 {
    let axes = &FACES[face];
    let s = (x as f32 + 0.5) / size as f32;
    let t = (y as f32 + 0.5) / size as f32;
    let mut dir = Vec3::ZERO;
    *dir.axis_mut(axes.major) = if face & 1 == 0 { 1.0 } else { -1.0 };
    *dir.axis_mut(axes.s_axis) = axes.s_sign * (2.0 * s - 1.0);
    *dir.axis_mut(axes.t_axis) = axes.t_sign * (2.0 * t - 1.0);
    dir
}

/// Index of texel (x, y) of `face` within one cube, `(face * size + y) * size + x`.
///
/// Texels off the face edge are re-addressed onto the adjacent face through their centre
/// direction; corner texels land on one of the two neighbours.
pub(crate) fn cube_texel(face: usize, x: isize, y: isize, size: usize) -> usize {
    let n = size as isize;
    if (0..n).contains(&x) && (0..n).contains(&y) {
        return (face * size + y as usize) * size + x as usize;
    }
    let to_texel = |v: f32| ((v * size as f32) as usize).min(size - 1);
    match CubeProjection::new(texel_direction(face, x, y, size)) {
        Some(p) => (p.face * size + to_texel(p.st.y)) * size + to_texel(p.st.x),
        None => (face * size + y.clamp(0, n - 1) as usize) * size + x.clamp(0, n - 1) as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32, tol: f32) {
        assert!((a - b).abs() <= tol, "{} != {} (tol {})", a, b, tol);
    }

    #[test]
    fn test_select_face_by_dominant_axis() {
        assert_eq!(select_face(Vec3::new(1.0, 0.2, -0.3)), 0);
        assert_eq!(select_face(Vec3::new(-1.0, 0.2, -0.3)), 1);
        assert_eq!(select_face(Vec3::new(0.1, 2.0, -0.3)), 2);
        assert_eq!(select_face(Vec3::new(0.1, -2.0, -0.3)), 3);
        assert_eq!(select_face(Vec3::new(0.1, 0.2, 0.5)), 4);
        assert_eq!(select_face(Vec3::new(0.1, 0.2, -0.5)), 5);
    }

    #[test]
    fn test_projection_of_face_centres() {
        for face in 0..6 {
            let dir = texel_direction(face, 0, 0, 1);
            let p = CubeProjection::new(dir).unwrap();
            assert_eq!(p.face, face);
            assert_eq!(p.st, Vec2::new(0.5, 0.5));
        }
    }

    #[test]
    fn test_projection_on_positive_z() {
        let p = CubeProjection::new(Vec3::new(0.5, 0.25, 1.0)).unwrap();
        assert_eq!(p.face, 4);
        assert_close(p.st.x, 0.75, 1e-6);
        assert_close(p.st.y, 0.375, 1e-6);
    }

    #[test]
    fn test_projection_rejects_degenerate_directions() {
        assert!(CubeProjection::new(Vec3::ZERO).is_none());
        assert!(CubeProjection::new(Vec3::new(f32::NAN, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_texel_direction_round_trip() {
        let size = 8;
        for face in 0..6 {
            for (x, y) in [(0, 0), (3, 5), (7, 7)] {
                let index = cube_texel(face, x, y, size);
                let p = CubeProjection::new(texel_direction(face, x, y, size)).unwrap();
                assert_eq!(p.face, face);
                let tx = (p.st.x * size as f32) as usize;
                let ty = (p.st.y * size as f32) as usize;
                assert_eq!(index, (face * size + ty) * size + tx);
            }
        }
    }

    #[test]
    fn test_cube_texel_wraps_onto_neighbour_faces() {
        let size = 4;
        // Left of +Z is -X, at its right-most column.
        assert_eq!(cube_texel(4, -1, 1, size), (size + 1) * size + 3);
        // Right of +Z is +X, at its left-most column.
        assert_eq!(cube_texel(4, 4, 2, size), 2 * size);
        // Above +Z is +Y, at its bottom row.
        assert_eq!(cube_texel(4, 1, -1, size), (2 * size + 3) * size + 1);
        // Below +Z is -Y, at its top row.
        assert_eq!(cube_texel(4, 2, 4, size), (3 * size) * size + 2);
    }

    #[test]
    fn test_direction_grad_matches_finite_differences() {
        let dir = Vec3::new(0.3, -0.45, 0.9);
        let p = CubeProjection::new(dir).unwrap();
        let g = Vec2::new(0.7, -1.3);
        let analytic = p.direction_grad(g);
        let eps = 1e-3;
        for axis in 0..3 {
            let mut plus = dir;
            let mut minus = dir;
            *plus.axis_mut(axis) += eps;
            *minus.axis_mut(axis) -= eps;
            let fp = dot(CubeProjection::new(plus).unwrap().st, g);
            let fm = dot(CubeProjection::new(minus).unwrap().st, g);
            assert_close(analytic.axis(axis), (fp - fm) / (2.0 * eps), 1e-3);
        }
    }

    #[test]
    fn test_project_differential_matches_finite_differences() {
        let dir = Vec3::new(-0.8, 0.35, 0.2);
        let d = Vec3::new(0.01, -0.02, 0.03);
        let p = CubeProjection::new(dir).unwrap();
        let h = 1e-2;
        let ahead = CubeProjection::new(dir + d * h).unwrap().st;
        let behind = CubeProjection::new(dir - d * h).unwrap().st;
        let numeric = (ahead - behind) * (0.5 / h);
        let analytic = p.project_differential(d);
        assert_close(analytic.x, numeric.x, 1e-4);
        assert_close(analytic.y, numeric.y, 1e-4);
    }

    #[test]
    fn test_differential_direction_grad_matches_finite_differences() {
        let dir = Vec3::new(0.25, 0.95, -0.4);
        let d = Vec3::new(0.2, -0.1, 0.3);
        let g = Vec2::new(1.5, 0.5);
        let analytic = CubeProjection::new(dir).unwrap().differential_direction_grad(d, g);
        let eps = 1e-3;
        for axis in 0..3 {
            let mut plus = dir;
            let mut minus = dir;
            *plus.axis_mut(axis) += eps;
            *minus.axis_mut(axis) -= eps;
            let fp = dot(CubeProjection::new(plus).unwrap().project_differential(d), g);
            let fm = dot(CubeProjection::new(minus).unwrap().project_differential(d), g);
            assert_close(analytic.axis(axis), (fp - fm) / (2.0 * eps), 2e-3);
        }
    }
}
