use super::params::*;
use crate::{Error, Result};
use arrayvec::ArrayVec;
use log::{debug, trace};
use rayon::prelude::*;

/// Per-level views, indexed by mip level. Level 0 is the base texture.
pub type MipLevels = ArrayVec<MipLevel, { TEX_MAX_MIP_LEVEL + 1 }>;

/// Dimensions and placement of one mip level.
///
/// `offset` is the flat element offset inside the mip buffer. Level 0 lives in the base texture,
/// so its offset is relative to that buffer instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MipLevel {
    pub width: usize,
    pub height: usize,
    pub offset: usize,
}

impl MipLevel {
    pub fn texels_per_slice(&self) -> usize {
        self.width * self.height
    }
}

/// Highest usable mip level for a `width x height` texture.
///
/// Every level keeps both extents at least 1 after halving, so the implied count is
/// `floor(log2(min(width, height)))`. An explicit `limit` may lower it. Fails when the resulting
/// count exceeds [`TEX_MAX_MIP_LEVEL`].
pub fn mip_level_max(width: usize, height: usize, limit: Option<usize>) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidParams(format!("texture size {}x{} is empty", width, height)));
    }
    let implied = width.min(height).ilog2() as usize;
    let levels = limit.map_or(implied, |limit| limit.min(implied));
    if levels > TEX_MAX_MIP_LEVEL {
        return Err(Error::TooManyMipLevels { levels, max: TEX_MAX_MIP_LEVEL });
    }
    Ok(levels)
}

/// Source texels averaged into destination index `x`, clamped to the source extent.
pub(crate) fn box_taps(x: usize, src_extent: usize) -> [usize; 2] {
    let last = src_extent - 1;
    [(2 * x).min(last), (2 * x + 1).min(last)]
}

/// Placement of every mip level of a texture, computed before any texel is touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MipLayout {
    levels: MipLevels,
    slices: usize,
    channels: usize,
    total_len: usize,
}

impl MipLayout {
    /// Fails if the level table or the 32-bit element offsets cannot describe the pyramid.
    pub fn new(params: &TextureParams) -> Result<Self> {
        let width = params.tex_width;
        let height = params.tex_height;
        let slices = params.tex_slices();
        let channels = params.channels;
        let slice_elems = |w: usize, h: usize| slices as u64 * w as u64 * h as u64 * channels as u64;

        let base_len = slice_elems(width, height);
        if base_len > TEX_MAX_ELEMENTS {
            return Err(Error::AddressOverflow { elements: base_len });
        }

        let level_max = if params.enable_mip { mip_level_max(width, height, params.mip_level_limit)? } else { 0 };

        let mut levels = MipLevels::new();
        levels.push(MipLevel { width, height, offset: 0 });
        let mut total: u64 = 0;
        for level in 1..=level_max {
            let w = (width >> level).max(1);
            let h = (height >> level).max(1);
            levels.push(MipLevel { width: w, height: h, offset: total as usize });
            total += slice_elems(w, h);
            if total > TEX_MAX_ELEMENTS {
                return Err(Error::AddressOverflow { elements: total });
            }
        }

        debug!(
            "Mip layout for {}x{} x{} slices x{} channels: {} levels above base, {} mip elements",
            width, height, slices, channels, level_max, total
        );
        Ok(Self { levels, slices, channels, total_len: total as usize })
    }

    pub fn level_max(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn level(&self, level: usize) -> &MipLevel {
        &self.levels[level]
    }

    /// Number of elements in the whole level, all slices and channels included.
    pub fn level_len(&self, level: usize) -> usize {
        self.slices * self.levels[level].texels_per_slice() * self.channels
    }

    pub fn slices(&self) -> usize {
        self.slices
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Length of the mip buffer holding levels `1..=level_max`.
    pub fn total_len(&self) -> usize {
        self.total_len
    }
}

/// Computes mip level `level_out` from level `level_out - 1`.
///
/// Level `level_out - 1` has to be complete in `mip` (or be the base texture `tex`) before the
/// call. Every destination texel is the mean of a 2x2 source block with indices clamped to the
/// source extent; slices and channels are filtered independently.
pub fn build_mip_level(layout: &MipLayout, level_out: usize, tex: &[f32], mip: &mut [f32]) -> Result<()> {
    if level_out == 0 || level_out > layout.level_max() {
        return Err(Error::InvalidParams(format!(
            "mip level {} is outside 1..={}",
            level_out,
            layout.level_max()
        )));
    }
    if tex.len() != layout.level_len(0) {
        return Err(Error::InvalidBufferSize { name: "tex", expected: layout.level_len(0), actual: tex.len() });
    }
    if mip.len() != layout.total_len() {
        return Err(Error::InvalidBufferSize { name: "mip", expected: layout.total_len(), actual: mip.len() });
    }

    let src_mip = *layout.level(level_out - 1);
    let dst_mip = *layout.level(level_out);
    let channels = layout.channels();

    // Previous levels precede the destination level in the mip buffer.
    let (head, tail) = mip.split_at_mut(dst_mip.offset);
    let src: &[f32] =
        if level_out == 1 { tex } else { &head[src_mip.offset..src_mip.offset + layout.level_len(level_out - 1)] };
    let dst = &mut tail[..layout.level_len(level_out)];

    let src_slice_len = src_mip.texels_per_slice() * channels;
    dst.par_chunks_mut(dst_mip.width * channels).enumerate().for_each(|(row, dst_row)| {
        let slice = row / dst_mip.height;
        let y = row % dst_mip.height;
        let src_slice = &src[slice * src_slice_len..(slice + 1) * src_slice_len];
        let [y0, y1] = box_taps(y, src_mip.height);
        for x in 0..dst_mip.width {
            let [x0, x1] = box_taps(x, src_mip.width);
            let t00 = (y0 * src_mip.width + x0) * channels;
            let t10 = (y0 * src_mip.width + x1) * channels;
            let t01 = (y1 * src_mip.width + x0) * channels;
            let t11 = (y1 * src_mip.width + x1) * channels;
            for c in 0..channels {
                let sum = src_slice[t00 + c] + src_slice[t10 + c] + src_slice[t01 + c] + src_slice[t11 + c];
                dst_row[x * channels + c] = 0.25 * sum;
            }
        }
    });

    trace!("Built mip level {} ({}x{})", level_out, dst_mip.width, dst_mip.height);
    Ok(())
}

/// Destination indices whose box taps read source index `x`, with the per-axis weight.
fn gather_taps(x: usize, src_extent: usize, dst_extent: usize) -> ArrayVec<(usize, f32), 2> {
    let mut taps = ArrayVec::new();
    for d in [x / 2, dst_extent - 1] {
        if d >= dst_extent || taps.iter().any(|&(seen, _)| seen == d) {
            continue;
        }
        let count = box_taps(d, src_extent).iter().filter(|&&tap| tap == x).count();
        if count > 0 {
            taps.push((d, 0.5 * count as f32));
        }
    }
    taps
}

/// Adjoint of [`build_mip_level`]: adds the gradient flowing from level `level` into the
/// gradient of level `level - 1`.
///
/// Runs over source rows, so no two threads write the same texel.
pub fn backprop_mip_level(layout: &MipLayout, level: usize, dst_grad: &[f32], src_grad: &mut [f32]) -> Result<()> {
    if level == 0 || level > layout.level_max() {
        return Err(Error::InvalidParams(format!("mip level {} is outside 1..={}", level, layout.level_max())));
    }
    if dst_grad.len() != layout.level_len(level) {
        return Err(Error::InvalidBufferSize {
            name: "mip gradient",
            expected: layout.level_len(level),
            actual: dst_grad.len(),
        });
    }
    if src_grad.len() != layout.level_len(level - 1) {
        return Err(Error::InvalidBufferSize {
            name: "mip gradient",
            expected: layout.level_len(level - 1),
            actual: src_grad.len(),
        });
    }

    let src_mip = *layout.level(level - 1);
    let dst_mip = *layout.level(level);
    let channels = layout.channels();
    let dst_slice_len = dst_mip.texels_per_slice() * channels;

    src_grad.par_chunks_mut(src_mip.width * channels).enumerate().for_each(|(row, src_row)| {
        let slice = row / src_mip.height;
        let y = row % src_mip.height;
        let dst_slice = &dst_grad[slice * dst_slice_len..(slice + 1) * dst_slice_len];
        for (dy, wy) in gather_taps(y, src_mip.height, dst_mip.height) {
            for x in 0..src_mip.width {
                for (dx, wx) in gather_taps(x, src_mip.width, dst_mip.width) {
                    let w = wx * wy;
                    let d = (dy * dst_mip.width + dx) * channels;
                    for c in 0..channels {
                        src_row[x * channels + c] += w * dst_slice[d + c];
                    }
                }
            }
        }
    });

    trace!("Reduced mip gradient {} into level {}", level, level - 1);
    Ok(())
}

/// Owned mip levels `1..=level_max` of one texture.
pub struct MipPyramid {
    layout: MipLayout,
    data: Vec<f32>,
}

impl MipPyramid {
    /// Lays out and builds the pyramid. Nothing is allocated when the layout is rejected.
    pub fn build(params: &TextureParams, tex: &[f32]) -> Result<Self> {
        let layout = MipLayout::new(params)?;
        let mut data = vec![0.0; layout.total_len()];

        // Each level reads the previous one, so levels are built strictly in order.
        for level in 1..=layout.level_max() {
            build_mip_level(&layout, level, tex, &mut data)?;
        }
        Ok(Self { layout, data })
    }

    pub fn layout(&self) -> &MipLayout {
        &self.layout
    }

    pub fn level_max(&self) -> usize {
        self.layout.level_max()
    }

    /// The whole mip buffer, levels `1..=level_max` back to back.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Texels of a level above the base.
    pub fn level_data(&self, level: usize) -> &[f32] {
        assert!(level >= 1 && level <= self.level_max(), "mip level {} out of bounds", level);
        let offset = self.layout.level(level).offset;
        &self.data[offset..offset + self.layout.level_len(level)]
    }

    /// Checks that the pyramid was built for a texture described by `params`.
    pub fn check_compatible(&self, params: &TextureParams) -> Result<()> {
        let expected = MipLayout::new(params)?;
        if expected != self.layout {
            return Err(Error::MipPyramidMismatch(format!(
                "pyramid has {} levels over {}x{}, parameters need {} levels over {}x{}",
                self.level_max(),
                self.layout.level(0).width,
                self.layout.level(0).height,
                expected.level_max(),
                params.tex_width,
                params.tex_height
            )));
        }
        Ok(())
    }
}
