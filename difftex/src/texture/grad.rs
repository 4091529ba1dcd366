use super::accum::AtomicAccumulator;
use super::boundary::*;
use super::cube::CubeProjection;
use super::kernel::{Kernel, PixelSample};
use super::lod::*;
use super::mip::{MipLayout, MipPyramid, backprop_mip_level};
use super::params::*;
use crate::math::*;
use crate::{Error, Result};
use log::debug;
use rayon::prelude::*;

/// Gradients of a scalar loss with respect to every differentiable sampler input.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureGrads {
    /// Same layout as the texture, including contributions that reached it through the mip
    /// pyramid. `None` for constant textures.
    pub tex: Option<Vec<f32>>,

    pub uv: Vec<f32>,

    /// Present when `uv_da` was given.
    pub uv_da: Option<Vec<f32>>,

    /// Present when `mip_level_bias` was given.
    pub mip_level_bias: Option<Vec<f32>>,
}

/// Backpropagates `dy`, the gradient of the loss with respect to the output of
/// [`texture_fwd`](super::texture_fwd), to the sampler inputs.
///
/// Nearest filtering is piecewise constant, so its coordinate gradients are zero. Level gradients
/// only flow for linear-mipmap-linear filtering while the level is not clamped.
pub fn texture_grad(
    params: &TextureParams,
    inputs: &SampleInputs,
    mips: Option<&MipPyramid>,
    dy: &[f32],
) -> Result<TextureGrads> {
    params.validate(inputs)?;
    if dy.len() != params.out_len() {
        return Err(Error::InvalidBufferSize { name: "dy", expected: params.out_len(), actual: dy.len() });
    }
    match params.boundary_mode {
        BoundaryMode::Cube => backward(params, inputs, mips, Cube, dy),
        BoundaryMode::Wrap => backward(params, inputs, mips, Wrap, dy),
        BoundaryMode::Clamp => backward(params, inputs, mips, Clamp, dy),
        BoundaryMode::Zero => backward(params, inputs, mips, Zero, dy),
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct PixelGrad {
    uv: Vec3,
    uv_da: [f32; 6],
    bias: f32,
}

/// Scatter target for texture gradients across all mip levels.
struct TexelGrads<'a> {
    tex: &'a AtomicAccumulator,
    mip: Option<(&'a AtomicAccumulator, &'a MipLayout)>,
}

impl TexelGrads<'_> {
    fn add<P: BoundaryPolicy>(
        &self,
        kernel: &Kernel<P>,
        level: usize,
        tz: usize,
        texel: usize,
        weight: f32,
        dy: &[f32],
    ) {
        let element = kernel.levels[level].element(tz, texel, dy.len());
        let (acc, base) = match (level, self.mip) {
            (0, _) => (self.tex, 0),
            (_, Some((mip, layout))) => (mip, layout.level(level).offset),
            (_, None) => return,
        };
        for (c, g) in dy.iter().enumerate() {
            acc.add(base + element + c, weight * g);
        }
    }
}

fn backward<P: BoundaryPolicy>(
    params: &TextureParams,
    inputs: &SampleInputs,
    mips: Option<&MipPyramid>,
    policy: P,
    dy: &[f32],
) -> Result<TextureGrads> {
    let kernel = Kernel::new(params, inputs, mips, policy)?;
    debug!(
        "Backpropagating {} pixels with {:?}/{:?}, {} mip levels",
        params.pixel_count(),
        params.filter_mode,
        params.boundary_mode,
        kernel.level_max()
    );

    let tex_acc = (!params.tex_const).then(|| AtomicAccumulator::new(params.tex_len()));
    let layout = mips.filter(|_| kernel.level_max() > 0).map(|m| m.layout());
    let mip_acc = layout.filter(|_| tex_acc.is_some()).map(|l| AtomicAccumulator::new(l.total_len()));
    let texels = tex_acc.as_ref().map(|tex| TexelGrads { tex, mip: mip_acc.as_ref().zip(layout) });

    let channels = params.channels;
    let pixel_grads: Vec<PixelGrad> = (0..params.pixel_count())
        .into_par_iter()
        .map(|pixel| pixel_grad(&kernel, pixel, &dy[pixel * channels..(pixel + 1) * channels], texels.as_ref()))
        .collect();

    let uv_components = params.boundary_mode.uv_components();
    let uv_da_components = params.boundary_mode.uv_da_components();
    let mut uv = Vec::with_capacity(pixel_grads.len() * uv_components);
    let mut uv_da = inputs.uv_da.map(|_| Vec::with_capacity(pixel_grads.len() * uv_da_components));
    let mut bias = inputs.mip_level_bias.map(|_| Vec::with_capacity(pixel_grads.len()));
    for g in &pixel_grads {
        uv.extend((0..uv_components).map(|i| g.uv.axis(i)));
        if let Some(uv_da) = uv_da.as_mut() {
            uv_da.extend_from_slice(&g.uv_da[..uv_da_components]);
        }
        if let Some(bias) = bias.as_mut() {
            bias.push(g.bias);
        }
    }

    let tex = match tex_acc {
        Some(acc) => {
            let mut tex = acc.into_vec();
            if let (Some(acc), Some(layout)) = (mip_acc, layout) {
                reduce_mip_grads(layout, acc.into_vec(), &mut tex)?;
            }
            Some(tex)
        }
        None => None,
    };

    Ok(TextureGrads { tex, uv, uv_da, mip_level_bias: bias })
}

/// Pushes the gradients of levels `1..=level_max` down to the base texture, coarsest first.
fn reduce_mip_grads(layout: &MipLayout, mut mip: Vec<f32>, tex: &mut [f32]) -> Result<()> {
    for level in (2..=layout.level_max()).rev() {
        let (head, tail) = mip.split_at_mut(layout.level(level).offset);
        let src_offset = layout.level(level - 1).offset;
        let src = &mut head[src_offset..src_offset + layout.level_len(level - 1)];
        backprop_mip_level(layout, level, &tail[..layout.level_len(level)], src)?;
    }
    backprop_mip_level(layout, 1, &mip[..layout.level_len(1)], tex)
}

fn pixel_grad<P: BoundaryPolicy>(
    kernel: &Kernel<P>,
    pixel: usize,
    dy: &[f32],
    texels: Option<&TexelGrads>,
) -> PixelGrad {
    let mut grad = PixelGrad::default();
    let sample = kernel.prepare(pixel);

    if kernel.params.filter_mode == FilterMode::Nearest {
        if let (Some(texel), Some(texels)) = (kernel.nearest(sample.coord), texels) {
            texels.add(kernel, 0, sample.tz, texel, 1.0, dy);
        }
        return grad;
    }

    let sel = sample.selection;
    let levels = [(sel.level0, 1.0 - sel.frac), (sel.level1, sel.frac)];
    let used = if sel.level1 == sel.level0 { 1 } else { 2 };
    // dy-weighted sample of each level, the level gradient is their difference.
    let mut level_values = [0.0f32; 2];
    for (i, &(level, weight)) in levels[..used].iter().enumerate() {
        let Some(taps) = kernel.linear(level, sample.coord) else {
            continue;
        };
        let weights = taps.weights();
        let mut t = [0.0f32; 4];
        for k in 0..4 {
            if let Some(texel) = taps.texels[k] {
                t[k] = dy.iter().zip(kernel.texel(level, sample.tz, texel)).map(|(g, v)| g * v).sum();
                if let Some(texels) = texels {
                    texels.add(kernel, level, sample.tz, texel, weight * weights[k], dy);
                }
            }
        }
        level_values[i] = weights.iter().zip(&t).map(|(w, v)| w * v).sum();

        let Vec2 { x: fu, y: fv } = taps.frac;
        let gu = (1.0 - fv) * (t[1] - t[0]) + fv * (t[3] - t[2]);
        let gv = (1.0 - fu) * (t[2] - t[0]) + fu * (t[3] - t[1]);
        let view = &kernel.levels[level];
        grad.uv += kernel.policy.coord_grad(sample.coord, Vec2::new(gu, gv) * weight, view.width, view.height);
    }

    if sel.differentiable {
        let g_level = level_values[1] - level_values[0];
        if kernel.has_bias() {
            grad.bias = g_level;
        }
        if let (Some(footprint), Some(uv_da)) = (sample.footprint, kernel.uv_da(pixel)) {
            let (gdx, gdy) = footprint.major_sqr_grad(g_level * level_grad_major_sqr(&footprint));
            footprint_grad(kernel, &sample, uv_da, gdx, gdy, &mut grad);
        }
    }
    grad
}

/// Chains footprint gradients (in base-level texels) back to `uv_da`, and to the direction in
/// cube mode where the projection depends on it.
fn footprint_grad<P: BoundaryPolicy>(
    kernel: &Kernel<P>,
    sample: &PixelSample,
    uv_da: &[f32],
    gdx: Vec2,
    gdy: Vec2,
    grad: &mut PixelGrad,
) {
    let w = kernel.params.tex_width as f32;
    let h = kernel.params.tex_height as f32;
    if kernel.params.boundary_mode != BoundaryMode::Cube {
        grad.uv_da[..4].copy_from_slice(&[gdx.x * w, gdy.x * w, gdx.y * h, gdy.y * h]);
        return;
    }

    let Some(p) = CubeProjection::new(sample.coord) else {
        return;
    };
    let (ddx, ddy) = cube_differentials(uv_da);
    let gx = gdx * w;
    let gy = gdy * w;
    let ax = p.direction_grad(gx);
    let ay = p.direction_grad(gy);
    grad.uv_da = [ax.x, ay.x, ax.y, ay.y, ax.z, ay.z];
    grad.uv += p.differential_direction_grad(ddx, gx) + p.differential_direction_grad(ddy, gy);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32, tol: f32) {
        assert!((a - b).abs() <= tol, "{} != {} (tol {})", a, b, tol);
    }

    /// 4x4 texture whose value is its column index.
    fn columns() -> Vec<f32> {
        (0..16).map(|i| (i % 4) as f32).collect()
    }

    #[test]
    fn test_linear_uv_grad_follows_slope() {
        let tex = columns();
        let params = TextureParams { boundary_mode: BoundaryMode::Clamp, ..TextureParams::new(1, 1, 1, 4, 4, 1) };
        let uv = [0.4, 0.6];
        let grads = texture_grad(&params, &SampleInputs::new(&tex, &uv), None, &[2.0]).unwrap();
        // One texel per 1/4 of u, so d/du = 4, scaled by dy.
        assert_close(grads.uv[0], 8.0, 1e-4);
        assert_close(grads.uv[1], 0.0, 1e-4);
        let tex_grad = grads.tex.unwrap();
        assert_close(tex_grad.iter().sum(), 2.0, 1e-5);
        assert!(grads.uv_da.is_none());
        assert!(grads.mip_level_bias.is_none());
    }

    #[test]
    fn test_nearest_has_no_uv_grad() {
        let tex = columns();
        let params = TextureParams { filter_mode: FilterMode::Nearest, ..TextureParams::new(1, 1, 1, 4, 4, 1) };
        let uv = [0.4, 0.6];
        let grads = texture_grad(&params, &SampleInputs::new(&tex, &uv), None, &[3.0]).unwrap();
        assert_eq!(grads.uv, vec![0.0, 0.0]);
        let tex_grad = grads.tex.unwrap();
        // u = 0.4 -> column 1, v = 0.6 -> row 2.
        assert_eq!(tex_grad[2 * 4 + 1], 3.0);
        assert_close(tex_grad.iter().sum(), 3.0, 0.0);
    }

    #[test]
    fn test_const_texture_has_no_tex_grad() {
        let tex = columns();
        let params = TextureParams { tex_const: true, ..TextureParams::new(1, 1, 1, 4, 4, 1) };
        let uv = [0.4, 0.6];
        let grads = texture_grad(&params, &SampleInputs::new(&tex, &uv), None, &[1.0]).unwrap();
        assert!(grads.tex.is_none());
        assert_close(grads.uv[0], 4.0, 1e-4);
    }

    #[test]
    fn test_mip_grads_reach_base_texture() {
        let tex = columns();
        let params = TextureParams {
            filter_mode: FilterMode::LinearMipmapLinear,
            boundary_mode: BoundaryMode::Clamp,
            enable_mip: true,
            ..TextureParams::new(1, 1, 1, 4, 4, 1)
        };
        let mips = MipPyramid::build(&params, &tex).unwrap();
        let uv = [0.5, 0.5];
        let bias = [1.5];
        let inputs = SampleInputs::new(&tex, &uv).with_mip_level_bias(&bias);
        let grads = texture_grad(&params, &inputs, Some(&mips), &[1.0]).unwrap();
        // Every level here averages the whole texture evenly.
        for g in grads.tex.unwrap() {
            assert_close(g, 1.0 / 16.0, 1e-6);
        }
        // Levels 1 and 2 both read 1.5 at the centre.
        assert_close(grads.mip_level_bias.unwrap()[0], 0.0, 1e-5);
    }

    #[test]
    fn test_bias_grad_is_level_difference() {
        // Level 1 at u = 0.25 reads its first texel, level 2 the overall mean.
        let tex = columns();
        let params = TextureParams {
            filter_mode: FilterMode::LinearMipmapLinear,
            boundary_mode: BoundaryMode::Clamp,
            enable_mip: true,
            ..TextureParams::new(1, 1, 1, 4, 4, 1)
        };
        let mips = MipPyramid::build(&params, &tex).unwrap();
        let uv = [0.25, 0.5];
        let bias = [1.25];
        let inputs = SampleInputs::new(&tex, &uv).with_mip_level_bias(&bias);
        let grads = texture_grad(&params, &inputs, Some(&mips), &[1.0]).unwrap();
        assert_close(grads.mip_level_bias.unwrap()[0], 1.5 - 0.5, 1e-5);
    }

    #[test]
    fn test_grad_checks_dy_size() {
        let tex = columns();
        let params = TextureParams::new(1, 1, 1, 4, 4, 1);
        let uv = [0.4, 0.6];
        let result = texture_grad(&params, &SampleInputs::new(&tex, &uv), None, &[]);
        assert!(matches!(result, Err(Error::InvalidBufferSize { name: "dy", .. })));
    }
}
