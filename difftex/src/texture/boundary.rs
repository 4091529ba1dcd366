//! Boundary addressing policies.
//!
//! A policy maps a continuous coordinate to texel indices of one mip level. Indices are relative
//! to one texture batch item: `(face * height + y) * width + x`, with `face == 0` outside cube
//! mode. Linear texel space is `u * width - 0.5` so that texel centres sit on integers; nearest
//! texel space is `u * width`.

use super::cube::*;
use crate::math::*;

/// Bilinear taps in the order (u0, v0), (u1, v0), (u0, v1), (u1, v1). `None` taps read zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LinearTaps {
    pub texels: [Option<usize>; 4],
    pub frac: Vec2,
}

impl LinearTaps {
    pub fn weights(&self) -> [f32; 4] {
        let Vec2 { x: fu, y: fv } = self.frac;
        [(1.0 - fu) * (1.0 - fv), fu * (1.0 - fv), (1.0 - fu) * fv, fu * fv]
    }
}

pub(crate) trait BoundaryPolicy: Copy + Send + Sync {
    /// Texel holding the coordinate, `None` when the sample reads zero.
    fn nearest(&self, coord: Vec3, width: usize, height: usize) -> Option<usize>;

    /// Bilinear taps around the coordinate, `None` when the whole sample reads zero.
    fn linear(&self, coord: Vec3, width: usize, height: usize) -> Option<LinearTaps>;

    /// Chain rule from a gradient on the linear texel-space position back to the coordinate.
    fn coord_grad(&self, coord: Vec3, grad: Vec2, width: usize, height: usize) -> Vec3;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Wrap;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Clamp;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Zero;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Cube;

fn nearest_index(u: f32, extent: usize) -> isize {
    (u * extent as f32).floor() as isize
}

fn clamp_index(i: isize, extent: usize) -> usize {
    i.clamp(0, extent as isize - 1) as usize
}

/// Lower tap index and fractional weight of a linear texel-space position.
fn split(t: f32) -> (isize, f32) {
    let i = t.floor();
    (i as isize, t - i)
}

fn planar_grad(grad: Vec2, width: usize, height: usize) -> Vec3 {
    Vec3::new(grad.x * width as f32, grad.y * height as f32, 0.0)
}

impl BoundaryPolicy for Wrap {
    fn nearest(&self, coord: Vec3, width: usize, height: usize) -> Option<usize> {
        let u = coord.x - coord.x.floor();
        let v = coord.y - coord.y.floor();
        let x = clamp_index(nearest_index(u, width), width);
        let y = clamp_index(nearest_index(v, height), height);
        Some(y * width + x)
    }

    fn linear(&self, coord: Vec3, width: usize, height: usize) -> Option<LinearTaps> {
        let u = coord.x - coord.x.floor();
        let v = coord.y - coord.y.floor();
        let (iu0, fu) = split(u * width as f32 - 0.5);
        let (iv0, fv) = split(v * height as f32 - 0.5);
        let wrap_u = |i: isize| i.rem_euclid(width as isize) as usize;
        let wrap_v = |i: isize| i.rem_euclid(height as isize) as usize;
        let (u0, u1) = (wrap_u(iu0), wrap_u(iu0 + 1));
        let (v0, v1) = (wrap_v(iv0), wrap_v(iv0 + 1));
        Some(LinearTaps {
            texels: [Some(v0 * width + u0), Some(v0 * width + u1), Some(v1 * width + u0), Some(v1 * width + u1)],
            frac: Vec2::new(fu, fv),
        })
    }

    fn coord_grad(&self, _coord: Vec3, grad: Vec2, width: usize, height: usize) -> Vec3 {
        planar_grad(grad, width, height)
    }
}

impl BoundaryPolicy for Clamp {
    fn nearest(&self, coord: Vec3, width: usize, height: usize) -> Option<usize> {
        let x = clamp_index(nearest_index(coord.x.clamp(0.0, 1.0), width), width);
        let y = clamp_index(nearest_index(coord.y.clamp(0.0, 1.0), height), height);
        Some(y * width + x)
    }

    fn linear(&self, coord: Vec3, width: usize, height: usize) -> Option<LinearTaps> {
        // Clamp to the centres of the edge texels. A clamped axis reads one texel twice so its
        // gradient vanishes.
        let max_u = width as f32 - 1.0;
        let max_v = height as f32 - 1.0;
        let u = (coord.x * width as f32 - 0.5).clamp(0.0, max_u);
        let v = (coord.y * height as f32 - 0.5).clamp(0.0, max_v);
        let (iu0, fu) = split(u);
        let (iv0, fv) = split(v);
        let iu1 = if u == 0.0 || u == max_u { iu0 } else { iu0 + 1 };
        let iv1 = if v == 0.0 || v == max_v { iv0 } else { iv0 + 1 };
        let (u0, u1) = (clamp_index(iu0, width), clamp_index(iu1, width));
        let (v0, v1) = (clamp_index(iv0, height), clamp_index(iv1, height));
        Some(LinearTaps {
            texels: [Some(v0 * width + u0), Some(v0 * width + u1), Some(v1 * width + u0), Some(v1 * width + u1)],
            frac: Vec2::new(fu, fv),
        })
    }

    fn coord_grad(&self, _coord: Vec3, grad: Vec2, width: usize, height: usize) -> Vec3 {
        planar_grad(grad, width, height)
    }
}

impl BoundaryPolicy for Zero {
    fn nearest(&self, coord: Vec3, width: usize, height: usize) -> Option<usize> {
        let x = nearest_index(coord.x, width);
        let y = nearest_index(coord.y, height);
        if x < 0 || x >= width as isize || y < 0 || y >= height as isize {
            return None;
        }
        Some(y as usize * width + x as usize)
    }

    fn linear(&self, coord: Vec3, width: usize, height: usize) -> Option<LinearTaps> {
        let (iu0, fu) = split(coord.x * width as f32 - 0.5);
        let (iv0, fv) = split(coord.y * height as f32 - 0.5);
        let inside_u = |i: isize| (0..width as isize).contains(&i);
        let inside_v = |i: isize| (0..height as isize).contains(&i);
        let tap = |iu: isize, iv: isize| {
            (inside_u(iu) && inside_v(iv)).then(|| iv as usize * width + iu as usize)
        };
        let texels = [tap(iu0, iv0), tap(iu0 + 1, iv0), tap(iu0, iv0 + 1), tap(iu0 + 1, iv0 + 1)];
        if texels.iter().all(Option::is_none) {
            return None;
        }
        Some(LinearTaps { texels, frac: Vec2::new(fu, fv) })
    }

    fn coord_grad(&self, _coord: Vec3, grad: Vec2, width: usize, height: usize) -> Vec3 {
        planar_grad(grad, width, height)
    }
}

impl BoundaryPolicy for Cube {
    fn nearest(&self, coord: Vec3, width: usize, height: usize) -> Option<usize> {
        let p = CubeProjection::new(coord)?;
        let x = clamp_index(nearest_index(p.st.x, width), width);
        let y = clamp_index(nearest_index(p.st.y, height), height);
        Some((p.face * height + y) * width + x)
    }

    fn linear(&self, coord: Vec3, width: usize, height: usize) -> Option<LinearTaps> {
        let p = CubeProjection::new(coord)?;
        let (iu0, fu) = split(p.st.x * width as f32 - 0.5);
        let (iv0, fv) = split(p.st.y * height as f32 - 0.5);
        let tap = |iu: isize, iv: isize| Some(cube_texel(p.face, iu, iv, width));
        Some(LinearTaps {
            texels: [tap(iu0, iv0), tap(iu0 + 1, iv0), tap(iu0, iv0 + 1), tap(iu0 + 1, iv0 + 1)],
            frac: Vec2::new(fu, fv),
        })
    }

    fn coord_grad(&self, coord: Vec3, grad: Vec2, width: usize, height: usize) -> Vec3 {
        match CubeProjection::new(coord) {
            Some(p) => p.direction_grad(Vec2::new(grad.x * width as f32, grad.y * height as f32)),
            None => Vec3::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uv(u: f32, v: f32) -> Vec3 {
        Vec3::new(u, v, 0.0)
    }

    #[test]
    fn test_nearest_origin_is_first_texel() {
        assert_eq!(Wrap.nearest(uv(0.0, 0.0), 4, 4), Some(0));
        assert_eq!(Clamp.nearest(uv(0.0, 0.0), 4, 4), Some(0));
        assert_eq!(Zero.nearest(uv(0.0, 0.0), 4, 4), Some(0));
    }

    #[test]
    fn test_wrap_nearest_is_periodic() {
        for v in [0.0, 0.3, 0.99] {
            assert_eq!(Wrap.nearest(uv(1.0, v), 4, 4), Wrap.nearest(uv(0.0, v), 4, 4));
            assert_eq!(Wrap.nearest(uv(-0.1, v), 4, 4), Wrap.nearest(uv(0.9, v), 4, 4));
        }
    }

    #[test]
    fn test_wrap_linear_wraps_taps() {
        let taps = Wrap.linear(uv(0.05, 0.5), 4, 2).unwrap();
        // u' = 0.2 - 0.5 = -0.3 => taps 3 and 0, v' = 0.5 => rows 0 and 1.
        assert_eq!(taps.texels, [Some(3), Some(0), Some(7), Some(4)]);
        assert!((taps.frac.x - 0.7).abs() < 1e-6);
        assert!((taps.frac.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_clamp_nearest() {
        assert_eq!(Clamp.nearest(uv(0.9, 0.9), 4, 4), Some(15));
        assert_eq!(Clamp.nearest(uv(1.0, 1.0), 4, 4), Some(15));
        assert_eq!(Clamp.nearest(uv(-3.0, 7.0), 4, 4), Some(12));
    }

    #[test]
    fn test_clamp_linear_collapses_clamped_axis() {
        let taps = Clamp.linear(uv(-0.5, 0.5), 4, 4).unwrap();
        assert_eq!(taps.texels[0], taps.texels[1]);
        assert_eq!(taps.texels[2], taps.texels[3]);
        let taps = Clamp.linear(uv(0.5, 0.5), 1, 1).unwrap();
        assert_eq!(taps.texels, [Some(0); 4]);
    }

    #[test]
    fn test_zero_nearest_outside_reads_zero() {
        assert_eq!(Zero.nearest(uv(-0.01, 0.5), 4, 4), None);
        assert_eq!(Zero.nearest(uv(1.0, 0.5), 4, 4), None);
        assert_eq!(Zero.nearest(uv(0.5, 1.5), 4, 4), None);
        assert_eq!(Zero.nearest(uv(0.99, 0.99), 4, 4), Some(15));
    }

    #[test]
    fn test_zero_linear_drops_taps_per_tap() {
        let taps = Zero.linear(uv(0.05, 0.5), 4, 2).unwrap();
        assert_eq!(taps.texels, [None, Some(0), None, Some(4)]);
        assert_eq!(Zero.linear(uv(-0.5, 0.5), 4, 4), None);
        assert_eq!(Zero.linear(uv(0.5, 2.0), 4, 4), None);
    }

    #[test]
    fn test_cube_nearest_picks_face() {
        let size = 2;
        assert_eq!(Cube.nearest(Vec3::new(0.0, 0.0, 1.0), size, size), Some(4 * 4 + 3));
        assert_eq!(Cube.nearest(Vec3::new(-1.0, 0.1, 0.1), size, size).map(|t| t / 4), Some(1));
        assert_eq!(Cube.nearest(Vec3::ZERO, size, size), None);
    }

    #[test]
    fn test_cube_linear_stays_on_face_in_interior() {
        let taps = Cube.linear(Vec3::new(0.1, -0.1, 1.0), 8, 8).unwrap();
        for texel in taps.texels {
            assert_eq!(texel.unwrap() / 64, 4);
        }
    }

    #[test]
    fn test_cube_linear_crosses_face_edge() {
        let taps = Cube.linear(Vec3::new(0.99, 0.0, 1.0), 4, 4).unwrap();
        let faces: Vec<usize> = taps.texels.iter().map(|t| t.unwrap() / 16).collect();
        assert_eq!(faces, vec![4, 0, 4, 0]);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let taps = Wrap.linear(uv(0.37, 0.81), 8, 8).unwrap();
        let sum: f32 = taps.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_planar_coord_grad_scales_by_extent() {
        let g = Zero.coord_grad(uv(0.5, 0.5), Vec2::new(1.0, 2.0), 8, 4);
        assert_eq!(g, Vec3::new(8.0, 8.0, 0.0));
    }
}
