//! Differentiable texture sampling.
//!
//! The forward pass filters a texture at per-pixel coordinates with one of four filter modes and
//! four boundary policies; the backward pass produces exact gradients with respect to the
//! texture, the coordinates, their screen-space derivatives and the mip level bias.
//!
//! ```
//! use difftex::texture::*;
//!
//! let texels: Vec<f32> = (1..=16).map(|v| v as f32).collect();
//! let params = TextureParams {
//!     filter_mode: FilterMode::Nearest,
//!     boundary_mode: BoundaryMode::Clamp,
//!     ..TextureParams::new(1, 1, 1, 4, 4, 1)
//! };
//! let uv = [0.9f32, 0.9];
//! let inputs = SampleInputs::new(&texels, &uv);
//! let out = texture_fwd(&params, &inputs, None).unwrap();
//! assert_eq!(out, vec![16.0]);
//! ```

pub mod error;
pub mod math;
pub mod texture;

pub use error::{Error, Result};
