use anyhow::{Context, Result};
use difftex::texture::*;
use log::{debug, info};
use std::path::{Path, PathBuf};

mod io;

const OUT_SIZE: usize = 384;
const CHANNELS: usize = 3;

/// Texture coordinate seen through screen position (x, y), in pixels.
///
/// Planar modes look at a ground plane receding towards the horizon; cube mode unwraps the
/// sphere of directions into a latitude-longitude panorama.
fn view_coord(mode: BoundaryMode, x: f32, y: f32) -> [f32; 3] {
    let sx = x / OUT_SIZE as f32 * 2.0 - 1.0;
    let sy = y / OUT_SIZE as f32 * 2.0 - 1.0;
    match mode {
        BoundaryMode::Cube => {
            let lon = sx * std::f32::consts::PI;
            let lat = sy * std::f32::consts::FRAC_PI_2;
            [lat.cos() * lon.sin(), lat.sin(), lat.cos() * lon.cos()]
        }
        _ => {
            let depth = 2.0 / (sy + 1.25);
            [0.5 + 0.5 * sx * depth, depth - 0.5, 0.0]
        }
    }
}

/// Per-pixel coordinates and their screen-space derivatives, taken as forward differences.
fn view(mode: BoundaryMode) -> (Vec<f32>, Vec<f32>) {
    let components = mode.uv_components();
    let mut uv = Vec::with_capacity(OUT_SIZE * OUT_SIZE * components);
    let mut uv_da = Vec::with_capacity(OUT_SIZE * OUT_SIZE * mode.uv_da_components());
    for y in 0..OUT_SIZE {
        for x in 0..OUT_SIZE {
            let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
            let c = view_coord(mode, fx, fy);
            let cx = view_coord(mode, fx + 1.0, fy);
            let cy = view_coord(mode, fx, fy + 1.0);
            uv.extend_from_slice(&c[..components]);
            for axis in 0..components {
                uv_da.extend_from_slice(&[cx[axis] - c[axis], cy[axis] - c[axis]]);
            }
        }
    }
    (uv, uv_da)
}

fn dump_mips(mips: &MipPyramid, out_dir: &Path) -> Result<()> {
    for level in 1..=mips.level_max() {
        let info = mips.layout().level(level);
        // First slice only, which is face 0 for cube maps.
        let texels = &mips.level_data(level)[..info.texels_per_slice() * CHANNELS];
        io::save_rgb(out_dir.join(format!("mip_{}.png", level)), texels, info.width, info.height)?;
    }
    Ok(())
}

fn norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let image_path = args.next().context("Usage: demo <image> [settings.json] [out_dir]")?;
    let settings = match args.next() {
        Some(path) => io::load_settings(path)?,
        None => SamplerSettings::default(),
    };
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| ".".into()));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("Failed to create {}", out_dir.display()))?;
    info!("Sampler settings: {:?}", settings);

    let cube = settings.boundary_mode == BoundaryMode::Cube;
    let image = io::load_rgb(&image_path, cube)?;
    let tex: Vec<f32> = if cube { image.texels.repeat(6) } else { image.texels };
    info!("Loaded {} ({}x{})", image_path, image.width, image.height);

    let params = settings.apply(TextureParams::new(1, OUT_SIZE, OUT_SIZE, image.width, image.height, CHANNELS));
    let (uv, uv_da) = view(params.boundary_mode);
    let mut inputs = SampleInputs::new(&tex, &uv);
    if params.enable_mip {
        inputs = inputs.with_uv_da(&uv_da);
    }

    let mips = if params.enable_mip { Some(MipPyramid::build(&params, &tex)?) } else { None };
    if let Some(mips) = &mips {
        info!("Built {} mip levels", mips.level_max());
        dump_mips(mips, &out_dir)?;
    }

    let out = texture_fwd(&params, &inputs, mips.as_ref())?;
    io::save_rgb(out_dir.join("render.png"), &out, OUT_SIZE, OUT_SIZE)?;

    // Pull the render towards flat grey and look at where the texture gradient lands.
    let dy: Vec<f32> = out.iter().map(|v| v - 0.5).collect();
    let loss = 0.5 * dy.iter().map(|d| d * d).sum::<f32>();
    let grads = texture_grad(&params, &inputs, mips.as_ref(), &dy)?;
    info!("Loss {:.4}, |d/duv| {:.4}", loss, norm(&grads.uv));
    if let Some(uv_da) = &grads.uv_da {
        debug!("|d/duv_da| {:.4}", norm(uv_da));
    }

    if let Some(tex_grad) = &grads.tex {
        let face = &tex_grad[..image.width * image.height * CHANNELS];
        let max = face.iter().fold(0.0f32, |m, g| m.max(g.abs()));
        info!("|d/dtex| {:.4}, max {:.4}", norm(tex_grad), max);
        let scaled: Vec<f32> = face.iter().map(|g| if max > 0.0 { g.abs() / max } else { 0.0 }).collect();
        io::save_rgb(out_dir.join("tex_grad.png"), &scaled, image.width, image.height)?;
    }
    Ok(())
}
