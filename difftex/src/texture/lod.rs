//! Mip level selection from screen-space derivatives.
//!
//! The level is `0.5 * log2(M) + bias` where `M` is the squared major axis of the pixel's
//! footprint ellipse measured in base-level texels. Without derivatives the bias is the level.

use super::cube::CubeProjection;
use super::params::FilterMode;
use crate::math::*;

/// Pixel footprint: texel-space change of the coordinate per screen-space X and Y step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Footprint {
    pub dx: Vec2,
    pub dy: Vec2,
}

/// Direction derivatives `(d/dX, d/dY)` from a cube mode `uv_da` entry.
pub(crate) fn cube_differentials(uv_da: &[f32]) -> (Vec3, Vec3) {
    (Vec3::new(uv_da[0], uv_da[2], uv_da[4]), Vec3::new(uv_da[1], uv_da[3], uv_da[5]))
}

impl Footprint {
    /// From `(du/dX, du/dY, dv/dX, dv/dY)`.
    pub fn planar(uv_da: &[f32], width: usize, height: usize) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self { dx: Vec2::new(uv_da[0] * w, uv_da[2] * h), dy: Vec2::new(uv_da[1] * w, uv_da[3] * h) }
    }

    /// Direction derivatives pushed through the face projection of `p`.
    pub fn cube(p: &CubeProjection, uv_da: &[f32], size: usize) -> Self {
        let (ddx, ddy) = cube_differentials(uv_da);
        let s = size as f32;
        Self { dx: p.project_differential(ddx) * s, dy: p.project_differential(ddy) * s }
    }

    fn moments(&self) -> (f32, f32, f32, f32) {
        let a = self.dx.length_squared();
        let b = self.dy.length_squared();
        let c = dot(self.dx, self.dy);
        let l2a = (0.25 * (a - b) * (a - b) + c * c).sqrt();
        (a, b, c, l2a)
    }

    /// Squared length of the footprint's major axis.
    pub fn major_sqr(&self) -> f32 {
        let (a, b, _, l2a) = self.moments();
        0.5 * (a + b) + l2a
    }

    /// Gradients with respect to `dx` and `dy` given the gradient `g` of `major_sqr`.
    pub fn major_sqr_grad(&self, g: f32) -> (Vec2, Vec2) {
        let (a, b, c, l2a) = self.moments();
        let (da, db, dc) = if l2a > 0.0 {
            let k = 0.25 * (a - b) / l2a;
            (0.5 + k, 0.5 - k, c / l2a)
        } else {
            (0.5, 0.5, 0.0)
        };
        let gdx = (self.dx * (2.0 * da) + self.dy * dc) * g;
        let gdy = (self.dy * (2.0 * db) + self.dx * dc) * g;
        (gdx, gdy)
    }
}

/// Continuous mip level, `-inf` for a collapsed footprint.
pub(crate) fn estimate_level(footprint: Option<&Footprint>, bias: f32) -> f32 {
    match footprint {
        Some(f) => 0.5 * f.major_sqr().log2() + bias,
        None => bias,
    }
}

/// Derivative of [`estimate_level`] with respect to `major_sqr`.
pub(crate) fn level_grad_major_sqr(footprint: &Footprint) -> f32 {
    0.5 / (footprint.major_sqr() * std::f32::consts::LN_2)
}

/// Levels read by one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MipSelection {
    pub level0: usize,
    pub level1: usize,

    /// Blend weight of `level1`.
    pub frac: f32,

    /// The level was not clamped and the filter blends levels, so level gradients flow.
    pub differentiable: bool,
}

/// Picks the levels for `level`, clamped to `[0, level_max]`.
///
/// Linear-mipmap-nearest rounds half up. Linear-mipmap-linear blends `floor(level)` and the next
/// level, reading a single level at the top of the pyramid.
pub(crate) fn select_levels(filter: FilterMode, level: f32, level_max: usize) -> MipSelection {
    let max = level_max as f32;
    let clamped = if level.is_nan() { 0.0 } else { level.clamp(0.0, max) };
    match filter {
        FilterMode::LinearMipmapLinear => {
            let level0 = (clamped.floor() as usize).min(level_max);
            if level0 == level_max {
                MipSelection { level0, level1: level0, frac: 0.0, differentiable: false }
            } else {
                let differentiable = level > 0.0 && level < max;
                MipSelection { level0, level1: level0 + 1, frac: clamped - level0 as f32, differentiable }
            }
        }
        FilterMode::LinearMipmapNearest => {
            let level0 = ((clamped + 0.5).floor() as usize).min(level_max);
            MipSelection { level0, level1: level0, frac: 0.0, differentiable: false }
        }
        FilterMode::Nearest | FilterMode::Linear => {
            MipSelection { level0: 0, level1: 0, frac: 0.0, differentiable: false }
        }
    }
}
