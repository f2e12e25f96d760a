use anyhow::{bail, Context, Result};
use image::{Rgb32FImage, RgbImage};
use log::debug;
use std::{fs, path::Path};

use envpack::{
    color::srgb_to_linear, cube_from_equirect, read_hdr, EnvLoader, Image, LinearImage, PassExecutor, PngCodec,
    Texture,
};

/// Source formats, by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// Radiance RGBE panorama.
    Hdr,
    /// OpenEXR panorama, already linear.
    Exr,
    /// 8-bit sRGB panorama (PNG/JPEG).
    Ldr,
    /// RGBD cube container.
    Env,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();

        Ok(match ext.as_str() {
            "hdr" => InputKind::Hdr,
            "exr" => InputKind::Exr,
            "png" | "jpg" | "jpeg" => InputKind::Ldr,
            "env" => InputKind::Env,
            _ => bail!("unsupported input format: {}", path.display()),
        })
    }
}

pub fn linear_from_rgb8(rgb: &RgbImage) -> LinearImage {
    Image::from_fn(rgb.width(), rgb.height(), |x, y| {
        rgb.get_pixel(x, y).0.map(|c| srgb_to_linear(c as f32 / 255.0))
    })
}

pub fn linear_from_rgb32f(rgb: &Rgb32FImage) -> LinearImage {
    Image::from_fn(rgb.width(), rgb.height(), |x, y| rgb.get_pixel(x, y).0)
}

/// Resample a panorama into a cube source.
pub fn cube_texture(panorama: &LinearImage, face_size: Option<u32>) -> Result<Texture> {
    let cube = cube_from_equirect(panorama, face_size)?;

    debug!(
        "resampled {}x{} panorama into {}px cube",
        panorama.width,
        panorama.height,
        cube.size()
    );

    Ok(Texture::Cube(cube))
}

/// Load any supported input as a cube texture.
pub fn load_texture<E: PassExecutor>(executor: &mut E, path: &Path, face_size: Option<u32>) -> Result<Texture> {
    let kind = InputKind::from_path(path)?;
    debug!("loading {} as {:?}", path.display(), kind);

    match kind {
        InputKind::Hdr => {
            let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let hdr = read_hdr(&bytes).with_context(|| format!("failed to parse {}", path.display()))?;
            cube_texture(&hdr.to_linear(), face_size)
        }
        InputKind::Exr => {
            let rgb = image::open(path)
                .with_context(|| format!("failed to decode {}", path.display()))?
                .to_rgb32f();
            cube_texture(&linear_from_rgb32f(&rgb), face_size)
        }
        InputKind::Ldr => {
            let rgb = image::open(path)
                .with_context(|| format!("failed to decode {}", path.display()))?
                .to_rgb8();
            cube_texture(&linear_from_rgb8(&rgb), face_size)
        }
        InputKind::Env => {
            let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let cube = EnvLoader::new(PngCodec::default())
                .load(executor, &bytes)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Ok(Texture::Cube(cube))
        }
    }
}
