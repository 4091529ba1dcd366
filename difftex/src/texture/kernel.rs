//! Per-pixel state shared by the forward and gradient passes.

use super::boundary::*;
use super::cube::CubeProjection;
use super::lod::*;
use super::mip::MipPyramid;
use super::params::*;
use crate::math::*;
use crate::{Error, Result};
use arrayvec::ArrayVec;

/// One mip level as read by the kernels.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LevelView<'a> {
    pub texels: &'a [f32],
    pub width: usize,
    pub height: usize,

    /// Elements per texture batch item.
    pub stride: usize,
}

impl LevelView<'_> {
    /// Flat index of the first channel of `texel` in texture batch item `tz`.
    pub fn element(&self, tz: usize, texel: usize, channels: usize) -> usize {
        tz * self.stride + texel * channels
    }
}

/// Per-pixel texture coordinates, reinterpreted from the flat input buffer.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Coords<'a> {
    Planar(&'a [Vec2]),
    Cube(&'a [Vec3]),
}

impl<'a> Coords<'a> {
    pub fn new(boundary_mode: BoundaryMode, uv: &'a [f32]) -> Result<Self> {
        let components = boundary_mode.uv_components();
        let expected = uv.len() - uv.len() % components;
        let mismatch = |_: bytemuck::PodCastError| Error::InvalidBufferSize { name: "uv", expected, actual: uv.len() };
        Ok(match boundary_mode {
            BoundaryMode::Cube => Coords::Cube(bytemuck::try_cast_slice(uv).map_err(mismatch)?),
            _ => Coords::Planar(bytemuck::try_cast_slice(uv).map_err(mismatch)?),
        })
    }

    pub fn get(&self, pixel: usize) -> Vec3 {
        match self {
            Coords::Planar(uv) => uv[pixel].into(),
            Coords::Cube(dirs) => dirs[pixel],
        }
    }
}

/// What one pixel reads: its coordinate, texture batch item and mip levels.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PixelSample {
    pub coord: Vec3,
    pub tz: usize,
    pub selection: MipSelection,
    pub footprint: Option<Footprint>,
}

pub(crate) struct Kernel<'a, P: BoundaryPolicy> {
    pub params: &'a TextureParams,
    pub policy: P,
    pub levels: ArrayVec<LevelView<'a>, { TEX_MAX_MIP_LEVEL + 1 }>,
    coords: Coords<'a>,
    uv_da: Option<&'a [f32]>,
    mip_level_bias: Option<&'a [f32]>,
}

impl<'a, P: BoundaryPolicy> Kernel<'a, P> {
    /// Expects validated `params` and `inputs`. Mipmapped filter modes need a pyramid built for
    /// the same texture; other modes read the base level only.
    pub fn new(
        params: &'a TextureParams,
        inputs: &SampleInputs<'a>,
        mips: Option<&'a MipPyramid>,
        policy: P,
    ) -> Result<Self> {
        let channels = params.channels;
        let depth = params.tex_depth();
        let mut levels = ArrayVec::new();
        levels.push(LevelView {
            texels: inputs.tex,
            width: params.tex_width,
            height: params.tex_height,
            stride: depth * params.tex_height * params.tex_width * channels,
        });

        if params.filter_mode.is_mipmapped() {
            let mips = mips.ok_or(Error::MissingMipPyramid(params.filter_mode))?;
            mips.check_compatible(params)?;
            for level in 1..=mips.level_max() {
                let info = mips.layout().level(level);
                levels.push(LevelView {
                    texels: mips.level_data(level),
                    width: info.width,
                    height: info.height,
                    stride: depth * info.texels_per_slice() * channels,
                });
            }
        }

        Ok(Self {
            params,
            policy,
            levels,
            coords: Coords::new(params.boundary_mode, inputs.uv)?,
            uv_da: inputs.uv_da,
            mip_level_bias: inputs.mip_level_bias,
        })
    }

    pub fn level_max(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn channels(&self) -> usize {
        self.params.channels
    }

    pub fn has_bias(&self) -> bool {
        self.mip_level_bias.is_some()
    }

    /// The pixel's screen-space derivatives, if any were given.
    pub fn uv_da(&self, pixel: usize) -> Option<&'a [f32]> {
        let n = self.params.boundary_mode.uv_da_components();
        self.uv_da.map(|da| &da[pixel * n..(pixel + 1) * n])
    }

    pub fn prepare(&self, pixel: usize) -> PixelSample {
        let coord = self.coords.get(pixel);
        let tz = self.params.tex_index(pixel);
        let filter = self.params.filter_mode;
        if !filter.is_mipmapped() {
            let selection = select_levels(filter, 0.0, 0);
            return PixelSample { coord, tz, selection, footprint: None };
        }

        let footprint = self.uv_da(pixel).and_then(|da| match self.params.boundary_mode {
            BoundaryMode::Cube => CubeProjection::new(coord).map(|p| Footprint::cube(&p, da, self.params.tex_width)),
            _ => Some(Footprint::planar(da, self.params.tex_width, self.params.tex_height)),
        });
        let bias = self.mip_level_bias.map_or(0.0, |b| b[pixel]);
        let level = estimate_level(footprint.as_ref(), bias);
        PixelSample { coord, tz, selection: select_levels(filter, level, self.level_max()), footprint }
    }

    /// Channels of one texel.
    pub fn texel(&self, level: usize, tz: usize, texel: usize) -> &'a [f32] {
        let view = &self.levels[level];
        let channels = self.channels();
        let start = view.element(tz, texel, channels);
        &view.texels[start..start + channels]
    }

    pub fn nearest(&self, coord: Vec3) -> Option<usize> {
        let view = &self.levels[0];
        self.policy.nearest(coord, view.width, view.height)
    }

    pub fn linear(&self, level: usize, coord: Vec3) -> Option<LinearTaps> {
        let view = &self.levels[level];
        self.policy.linear(coord, view.width, view.height)
    }

    /// Adds `weight` times the bilinear sample of `level` to `out`.
    pub fn add_bilinear(&self, level: usize, sample: &PixelSample, weight: f32, out: &mut [f32]) {
        let Some(taps) = self.linear(level, sample.coord) else {
            return;
        };
        for (texel, w) in taps.texels.iter().zip(taps.weights()) {
            if let Some(texel) = *texel {
                for (o, t) in out.iter_mut().zip(self.texel(level, sample.tz, texel)) {
                    *o += weight * w * t;
                }
            }
        }
    }
}
