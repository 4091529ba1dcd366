use anyhow::{Context, Result};
use difftex::texture::SamplerSettings;
use std::path::Path;

/// An RGB image with `f32` channels in [0, 1].
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub texels: Vec<f32>,
}

/// Loads an image, cropping it to a centred square when `square` is set.
pub fn load_rgb<P: AsRef<Path>>(path: P, square: bool) -> Result<RgbImage> {
    let path = path.as_ref();
    let mut image = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if square {
        let size = image.width().min(image.height());
        image = image.crop_imm((image.width() - size) / 2, (image.height() - size) / 2, size, size);
    }
    let rgb = image.to_rgb32f();
    Ok(RgbImage { width: rgb.width() as usize, height: rgb.height() as usize, texels: rgb.into_raw() })
}

pub fn save_rgb<P: AsRef<Path>>(path: P, texels: &[f32], width: usize, height: usize) -> Result<()> {
    let path = path.as_ref();
    let bytes: Vec<u8> = texels.iter().map(|&v| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8).collect();
    let image = image::RgbImage::from_raw(width as u32, height as u32, bytes)
        .with_context(|| format!("{} values do not make a {}x{} RGB image", texels.len(), width, height))?;
    image.save(path).with_context(|| format!("Failed to write {}", path.display()))
}

/// Reads sampler settings from a JSON file; missing fields take their defaults.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<SamplerSettings> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse sampler settings in {}", path.display()))
}
