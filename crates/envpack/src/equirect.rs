//! Cube ↔ latitude-longitude panorama resampling.
//!
//! Panorama row 0 is the zenith (+Y). Before the yaw is applied, column 0
//! looks down +X, the first quarter mark down -Z and the centre column
//! down -X.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Mat3, Vec3};
use log::debug;

use crate::error::{bad_dims, Result};
use crate::pass::{rgba32f_texels, Pass, PassExecutor, PixelFormat, Rect, TargetDescriptor};
use crate::sampler::{sample_panorama, texel_direction};
use crate::texture::{CubeFace, Image, LinearCubemap, LinearImage, Texture, Winding, CUBE_FACE_COUNT};

/// View direction for normalized panorama coordinates.
pub fn direction_for_uv(u: f32, v: f32) -> Vec3 {
    let lon = u * TAU - FRAC_PI_2;
    let lat = v * PI;

    let (sin_lon, cos_lon) = lon.sin_cos();
    let (sin_lat, cos_lat) = lat.sin_cos();

    Vec3::new(-sin_lon * sin_lat, cos_lat, -cos_lon * sin_lat)
}

/// Inverse of [`direction_for_uv`]; `u` is wrapped into `[0, 1)`.
pub fn uv_for_direction(dir: Vec3) -> (f32, f32) {
    let dir = dir.normalize_or_zero();
    if dir == Vec3::ZERO {
        return (0.0, 0.5);
    }

    let lat = dir.y.clamp(-1.0, 1.0).acos();
    let lon = (-dir.x).atan2(-dir.z);

    let u = ((lon + FRAC_PI_2) / TAU).rem_euclid(1.0);
    (u, lat / PI)
}

/// Panorama dimensions for a cube of edge `face_size`.
#[inline]
pub fn panorama_extent(face_size: u32) -> (u32, u32) {
    (face_size * 4, face_size * 2)
}

/// Output of [`EquirectProjector::convert`].
#[derive(Debug)]
pub enum Equirect<T> {
    /// Still owned by the executor, ready to feed another pass.
    Resident { target: T, width: u32, height: u32 },
    /// Read back into CPU memory.
    Readback(LinearImage),
}

impl<T> Equirect<T> {
    pub fn extent(&self) -> (u32, u32) {
        match self {
            Equirect::Resident { width, height, .. } => (*width, *height),
            Equirect::Readback(image) => (image.width, image.height),
        }
    }
}

/// Resamples a cube into a 2:1 float panorama.
#[derive(Debug, Clone)]
pub struct EquirectProjector {
    /// Yaw, radians.
    pub rotation_y: f32,
    /// Read the panorama back immediately instead of leaving it resident.
    pub read_pixels: bool,
}

impl Default for EquirectProjector {
    fn default() -> Self {
        Self {
            rotation_y: 0.0,
            read_pixels: true,
        }
    }
}

impl EquirectProjector {
    pub fn new(rotation_y: f32, read_pixels: bool) -> Self {
        Self {
            rotation_y,
            read_pixels,
        }
    }

    pub fn convert<E: PassExecutor>(&self, executor: &mut E, source: &Texture) -> Result<Equirect<E::Target>> {
        let cube = source.as_cube()?;
        let (width, height) = panorama_extent(cube.size());

        debug!(
            "equirect: {}px cube -> {}x{}, yaw {:.4} rad, {}",
            cube.size(),
            width,
            height,
            self.rotation_y,
            if self.read_pixels { "readback" } else { "resident" }
        );

        let desc = TargetDescriptor::Flat {
            width,
            height,
            format: PixelFormat::Rgba32Float,
        };
        let pass = Pass::CubeToEquirect {
            environment_map: cube,
            rotation: Mat3::from_rotation_y(self.rotation_y),
            env_map_flip: cube.winding().env_map_flip(),
        };

        let target = executor.run_pass(&pass, &desc)?;

        if !self.read_pixels {
            return Ok(Equirect::Resident { target, width, height });
        }

        let bytes = executor.read_pixels(&target, None, Rect::full(width, height))?;
        let pixels = rgba32f_texels(&bytes).into_iter().map(|t| [t[0], t[1], t[2]]).collect();

        Ok(Equirect::Readback(Image::from_pixels(width, height, pixels)?))
    }
}

/// Default cube edge for a panorama: the largest power of two not above a
/// quarter of its width.
pub fn face_size_for_width(width: u32) -> u32 {
    let quarter = (width / 4).max(1);
    1 << (u32::BITS - 1 - quarter.leading_zeros())
}

/// Resample a 2:1 panorama into a cube with a box-filtered mip chain.
pub fn cube_from_equirect(image: &LinearImage, face_size: Option<u32>) -> Result<LinearCubemap> {
    if image.width == 0 || image.height == 0 {
        return Err(bad_dims("panorama is empty"));
    }

    let size = face_size.unwrap_or_else(|| face_size_for_width(image.width));
    if size == 0 || !size.is_power_of_two() {
        return Err(bad_dims(format!("face size {} is not a power of two", size)));
    }

    if image.width != image.height * 2 {
        debug!(
            "panorama {}x{} is not 2:1, sampling it stretched",
            image.width, image.height
        );
    }

    let faces: [LinearImage; CUBE_FACE_COUNT] = std::array::from_fn(|j| {
        let face = CubeFace::ALL[j];
        Image::from_fn(size, size, |x, y| {
            let (u, v) = uv_for_direction(texel_direction(face, x, y, size));
            sample_panorama(image, u, v)
        })
    });

    LinearCubemap::from_base_faces(faces, Winding::Standard)
}
