//! Error types for the difftex crate.

use thiserror::Error;

/// Main error type for texture sampling operations.
///
/// Every variant is raised once, ahead of any per-pixel work. Per-pixel edge cases such as
/// out-of-range taps in zero boundary mode are not errors, they contribute zero.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested or implied mip level count does not fit the level table.
    #[error(
        "Mip-map size error: {levels} mip levels requested, at most {max} are supported. \
         Limit the number of mip levels or reduce the texture size"
    )]
    TooManyMipLevels { levels: usize, max: usize },

    /// Texture or mip data would not be addressable with 32-bit element offsets.
    #[error("Mip-map size error: {elements} elements do not fit 32-bit element offsets")]
    AddressOverflow { elements: u64 },

    /// A buffer does not match the shape declared by the texture parameters.
    #[error("Invalid buffer size for {name}: expected {expected}, got {actual}")]
    InvalidBufferSize { name: &'static str, expected: usize, actual: usize },

    /// Texture parameters are mutually inconsistent.
    #[error("Invalid texture parameters: {0}")]
    InvalidParams(String),

    /// A mipmapped filter mode was requested without a mip pyramid.
    #[error("Filter mode {0:?} needs a mip pyramid")]
    MissingMipPyramid(crate::texture::FilterMode),

    /// The mip pyramid was built for a different texture.
    #[error("Mip pyramid mismatch: {0}")]
    MipPyramidMismatch(String),

    /// Integer filter mode constant out of range.
    #[error("Invalid filter mode: {0}")]
    InvalidFilterMode(u8),

    /// Integer boundary mode constant out of range.
    #[error("Invalid boundary mode: {0}")]
    InvalidBoundaryMode(u8),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
