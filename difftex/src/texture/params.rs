use crate::{Error, Result};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Maximum number of mip levels above the base level. Textures cannot exceed 2^31 elements
/// because every offset is a 32-bit element index.
pub const TEX_MAX_MIP_LEVEL: usize = 14;

/// Largest element count addressable with 32-bit signed offsets.
pub const TEX_MAX_ELEMENTS: u64 = i32::MAX as u64;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[num_enum(error_type(name = Error, constructor = Error::InvalidFilterMode))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "kebab-case"))]
pub enum FilterMode {
    /// Nearest texel on the base level.
    Nearest = 0,

    /// Bilinear on the base level.
    Linear = 1,

    /// Bilinear on the nearest mip level.
    LinearMipmapNearest = 2,

    /// Trilinear: bilinear on two adjacent mip levels, blended by the fractional level.
    LinearMipmapLinear = 3,
}

impl FilterMode {
    pub fn is_mipmapped(self) -> bool {
        matches!(self, FilterMode::LinearMipmapNearest | FilterMode::LinearMipmapLinear)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[num_enum(error_type(name = Error, constructor = Error::InvalidBoundaryMode))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "kebab-case"))]
pub enum BoundaryMode {
    /// Six-face cube map addressed by a 3D direction.
    Cube = 0,

    /// Repeat (u, v) with period 1.
    Wrap = 1,

    /// Clamp to the edge texels.
    Clamp = 2,

    /// Taps outside the texture read zero.
    Zero = 3,
}

impl BoundaryMode {
    /// Number of depth slices per texture: one per face for cube maps.
    pub fn depth(self) -> usize {
        if self == BoundaryMode::Cube { 6 } else { 1 }
    }

    /// Floats per pixel in the coordinate buffer.
    pub fn uv_components(self) -> usize {
        if self == BoundaryMode::Cube { 3 } else { 2 }
    }

    /// Floats per pixel in the coordinate derivative buffer.
    pub fn uv_da_components(self) -> usize {
        2 * self.uv_components()
    }
}

/// Parameters of a single forward or backward invocation.
///
/// Built once by the host and passed by reference to every stage, never mutated while a pass is
/// running. Buffers travel separately in [`SampleInputs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureParams {
    pub filter_mode: FilterMode,
    pub boundary_mode: BoundaryMode,

    /// Mip pyramid is used, `uv_da` and/or `mip_level_bias` are given.
    pub enable_mip: bool,

    /// Texture is known to be constant, its gradient is not needed.
    pub tex_const: bool,

    /// Upper bound on the mip level index, `None` for as many as the texture allows.
    pub mip_level_limit: Option<usize>,

    /// Number of channels per texel.
    pub channels: usize,

    /// Image minibatch size.
    pub batch: usize,
    pub img_width: usize,
    pub img_height: usize,

    /// Texture minibatch size, either 1 (shared by all images) or `batch`.
    pub tex_batch: usize,
    pub tex_width: usize,
    pub tex_height: usize,
}

impl TextureParams {
    pub fn new(
        batch: usize,
        img_width: usize,
        img_height: usize,
        tex_width: usize,
        tex_height: usize,
        channels: usize,
    ) -> Self {
        Self {
            filter_mode: FilterMode::Linear,
            boundary_mode: BoundaryMode::Wrap,
            enable_mip: false,
            tex_const: false,
            mip_level_limit: None,
            channels,
            batch,
            img_width,
            img_height,
            tex_batch: 1,
            tex_width,
            tex_height,
        }
    }

    pub fn tex_depth(&self) -> usize {
        self.boundary_mode.depth()
    }

    /// Number of independently filtered 2D slices in the texture.
    pub fn tex_slices(&self) -> usize {
        self.tex_batch * self.tex_depth()
    }

    pub fn pixel_count(&self) -> usize {
        self.batch * self.img_height * self.img_width
    }

    pub fn tex_len(&self) -> usize {
        self.tex_slices() * self.tex_height * self.tex_width * self.channels
    }

    pub fn out_len(&self) -> usize {
        self.pixel_count() * self.channels
    }

    /// Texture batch item read by the given pixel.
    pub fn tex_index(&self, pixel: usize) -> usize {
        if self.tex_batch == 1 { 0 } else { pixel / (self.img_width * self.img_height) }
    }

    /// Checks that the parameters are consistent with each other and with the buffers.
    pub fn validate(&self, inputs: &SampleInputs) -> Result<()> {
        let dims = [
            ("batch", self.batch),
            ("img_width", self.img_width),
            ("img_height", self.img_height),
            ("tex_batch", self.tex_batch),
            ("tex_width", self.tex_width),
            ("tex_height", self.tex_height),
            ("channels", self.channels),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidParams(format!("{} must be positive", name)));
        }
        if self.tex_batch != 1 && self.tex_batch != self.batch {
            return Err(Error::InvalidParams(format!(
                "texture minibatch {} must be 1 or match the image minibatch {}",
                self.tex_batch, self.batch
            )));
        }
        if self.boundary_mode == BoundaryMode::Cube && self.tex_width != self.tex_height {
            return Err(Error::InvalidParams(format!(
                "cube map faces must be square, got {}x{}",
                self.tex_width, self.tex_height
            )));
        }
        if self.enable_mip != self.filter_mode.is_mipmapped() {
            return Err(Error::InvalidParams(format!(
                "enable_mip is {} but filter mode is {:?}",
                self.enable_mip, self.filter_mode
            )));
        }

        check_len("tex", self.tex_len(), inputs.tex.len())?;
        check_len("uv", self.pixel_count() * self.boundary_mode.uv_components(), inputs.uv.len())?;
        if inputs.uv_da.is_some() || inputs.mip_level_bias.is_some() {
            if !self.enable_mip {
                return Err(Error::InvalidParams("uv_da and mip_level_bias need a mipmapped filter mode".into()));
            }
        } else if self.enable_mip {
            return Err(Error::InvalidParams("mipmapped filter modes need uv_da or mip_level_bias".into()));
        }
        if let Some(uv_da) = inputs.uv_da {
            check_len("uv_da", self.pixel_count() * self.boundary_mode.uv_da_components(), uv_da.len())?;
        }
        if let Some(bias) = inputs.mip_level_bias {
            check_len("mip_level_bias", self.pixel_count(), bias.len())?;
        }
        Ok(())
    }
}

fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::InvalidBufferSize { name, expected, actual });
    }
    Ok(())
}

/// Borrowed input buffers of one invocation.
#[derive(Debug, Clone, Copy)]
pub struct SampleInputs<'a> {
    /// `tex_batch x depth x height x width x channels` texels.
    pub tex: &'a [f32],

    /// Per-pixel `(u, v)`, or `(x, y, z)` directions in cube mode.
    pub uv: &'a [f32],

    /// Per-pixel `(du/dX, du/dY, dv/dX, dv/dY)`; six entries per pixel in cube mode.
    pub uv_da: Option<&'a [f32]>,

    /// Per-pixel mip level bias, or the absolute level when `uv_da` is absent.
    pub mip_level_bias: Option<&'a [f32]>,
}

impl<'a> SampleInputs<'a> {
    pub fn new(tex: &'a [f32], uv: &'a [f32]) -> Self {
        Self { tex, uv, uv_da: None, mip_level_bias: None }
    }

    pub fn with_uv_da(self, uv_da: &'a [f32]) -> Self {
        Self { uv_da: Some(uv_da), ..self }
    }

    pub fn with_mip_level_bias(self, mip_level_bias: &'a [f32]) -> Self {
        Self { mip_level_bias: Some(mip_level_bias), ..self }
    }
}

/// Host-facing subset of [`TextureParams`] that can be stored in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct SamplerSettings {
    pub filter_mode: FilterMode,
    pub boundary_mode: BoundaryMode,
    pub max_mip_level: Option<usize>,
    pub tex_const: bool,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            filter_mode: FilterMode::LinearMipmapLinear,
            boundary_mode: BoundaryMode::Wrap,
            max_mip_level: None,
            tex_const: false,
        }
    }
}

impl SamplerSettings {
    pub fn apply(&self, params: TextureParams) -> TextureParams {
        TextureParams {
            filter_mode: self.filter_mode,
            boundary_mode: self.boundary_mode,
            enable_mip: self.filter_mode.is_mipmapped(),
            tex_const: self.tex_const,
            mip_level_limit: self.max_mip_level,
            ..params
        }
    }
}
