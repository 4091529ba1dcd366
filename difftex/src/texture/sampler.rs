use super::boundary::*;
use super::kernel::Kernel;
use super::mip::MipPyramid;
use super::params::*;
use crate::{Error, Result};
use log::{debug, warn};
use rayon::prelude::*;

/// Samples the texture once per pixel.
///
/// Returns `batch x height x width x channels` values. Mipmapped filter modes read `mips`, which
/// has to be built from `inputs.tex` with the same parameters; other modes ignore it.
pub fn texture_fwd(params: &TextureParams, inputs: &SampleInputs, mips: Option<&MipPyramid>) -> Result<Vec<f32>> {
    params.validate(inputs)?;
    let mut out = vec![0.0; params.out_len()];
    texture_fwd_into(params, inputs, mips, &mut out)?;
    Ok(out)
}

/// Same as [`texture_fwd`], writing into a caller-owned buffer.
pub fn texture_fwd_into(
    params: &TextureParams,
    inputs: &SampleInputs,
    mips: Option<&MipPyramid>,
    out: &mut [f32],
) -> Result<()> {
    params.validate(inputs)?;
    if out.len() != params.out_len() {
        return Err(Error::InvalidBufferSize { name: "out", expected: params.out_len(), actual: out.len() });
    }
    match params.boundary_mode {
        BoundaryMode::Cube => forward(params, inputs, mips, Cube, out),
        BoundaryMode::Wrap => forward(params, inputs, mips, Wrap, out),
        BoundaryMode::Clamp => forward(params, inputs, mips, Clamp, out),
        BoundaryMode::Zero => forward(params, inputs, mips, Zero, out),
    }
}

fn forward<P: BoundaryPolicy>(
    params: &TextureParams,
    inputs: &SampleInputs,
    mips: Option<&MipPyramid>,
    policy: P,
    out: &mut [f32],
) -> Result<()> {
    let kernel = Kernel::new(params, inputs, mips, policy)?;
    if params.filter_mode.is_mipmapped() && kernel.level_max() == 0 {
        warn!(
            "{:?} on a {}x{} texture has no mip levels, sampling the base level",
            params.filter_mode, params.tex_width, params.tex_height
        );
    }
    debug!(
        "Sampling {} pixels with {:?}/{:?}, {} mip levels",
        params.pixel_count(),
        params.filter_mode,
        params.boundary_mode,
        kernel.level_max()
    );

    out.par_chunks_mut(params.channels).enumerate().for_each(|(pixel, out)| sample_pixel(&kernel, pixel, out));
    Ok(())
}

fn sample_pixel<P: BoundaryPolicy>(kernel: &Kernel<P>, pixel: usize, out: &mut [f32]) {
    out.fill(0.0);
    let sample = kernel.prepare(pixel);
    match kernel.params.filter_mode {
        FilterMode::Nearest => {
            if let Some(texel) = kernel.nearest(sample.coord) {
                out.copy_from_slice(kernel.texel(0, sample.tz, texel));
            }
        }
        _ => {
            let sel = sample.selection;
            kernel.add_bilinear(sel.level0, &sample, 1.0 - sel.frac, out);
            if sel.frac > 0.0 {
                kernel.add_bilinear(sel.level1, &sample, sel.frac, out);
            }
        }
    }
}
