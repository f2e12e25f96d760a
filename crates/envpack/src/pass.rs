//! The "run a full-screen pass, read back pixels" seam.
//!
//! Encoders describe *what* to render as a [`Pass`] and *where* as a
//! [`TargetDescriptor`]; a [`PassExecutor`] runs it and hands back an opaque
//! target that can be read back or fed into a later pass.

use std::fmt;

use glam::Mat3;

use crate::error::{bad_dims, Result};
use crate::texture::{CubeFace, LinearCubemap, LinearImage, RgbdCubemap, CUBE_FACE_COUNT};

/// Shader programs a pass can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderId {
    RgbdEncode,
    RgbdDecode,
    CubeToEquirect,
    RgbeEncode,
}

impl fmt::Display for ShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderId::RgbdEncode => "rgbd_encode",
            ShaderId::RgbdDecode => "rgbd_decode",
            ShaderId::CubeToEquirect => "cube_to_equi",
            ShaderId::RgbeEncode => "rgbe_encode",
        })
    }
}

/// Source of a 2D pass: a CPU raster, or the output of an earlier pass still
/// held by the executor.
pub enum FlatInput<'a, T> {
    Image(&'a LinearImage),
    Resident(&'a T),
}

/// A full-screen pass together with its uniforms.
pub enum Pass<'a, T> {
    /// Render mip `level` of `environment_map` into a cube target as RGBD.
    /// The lookup direction is `rotation * dir` with X scaled by
    /// `env_map_flip`.
    RgbdEncode {
        environment_map: &'a LinearCubemap,
        level: u32,
        rotation: Mat3,
        env_map_flip: f32,
    },
    /// Reconstruct linear colour from mip `level` of an RGBD cube.
    RgbdDecode {
        environment_map: &'a RgbdCubemap,
        level: u32,
    },
    /// Resample level 0 of `environment_map` into a 2:1 panorama. U is
    /// scaled by `env_map_flip` before the longitude is computed.
    CubeToEquirect {
        environment_map: &'a LinearCubemap,
        rotation: Mat3,
        env_map_flip: f32,
    },
    /// Pack a linear raster into RGBE after multiplying it by `exposure`.
    RgbeEncode { input: FlatInput<'a, T>, exposure: f32 },
}

impl<T> Pass<'_, T> {
    pub fn shader(&self) -> ShaderId {
        match self {
            Pass::RgbdEncode { .. } => ShaderId::RgbdEncode,
            Pass::RgbdDecode { .. } => ShaderId::RgbdDecode,
            Pass::CubeToEquirect { .. } => ShaderId::CubeToEquirect,
            Pass::RgbeEncode { .. } => ShaderId::RgbeEncode,
        }
    }
}

/// Storage format of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba32Float,
}

impl PixelFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8Unorm => 4,
            PixelFormat::Rgba32Float => 16,
        }
    }
}

/// Shape and format of the target a pass renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDescriptor {
    Cube { size: u32, format: PixelFormat },
    Flat { width: u32, height: u32, format: PixelFormat },
}

impl TargetDescriptor {
    #[inline]
    pub fn format(&self) -> PixelFormat {
        match *self {
            TargetDescriptor::Cube { format, .. } | TargetDescriptor::Flat { format, .. } => format,
        }
    }

    /// Width and height of one layer.
    #[inline]
    pub fn extent(&self) -> (u32, u32) {
        match *self {
            TargetDescriptor::Cube { size, .. } => (size, size),
            TargetDescriptor::Flat { width, height, .. } => (width, height),
        }
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        match self {
            TargetDescriptor::Cube { .. } => CUBE_FACE_COUNT,
            TargetDescriptor::Flat { .. } => 1,
        }
    }

    #[inline]
    pub fn is_cube(&self) -> bool {
        matches!(self, TargetDescriptor::Cube { .. })
    }

    /// Resolve the layer index for a readback request.
    pub fn layer_index(&self, layer: Option<CubeFace>) -> Result<usize> {
        match (self, layer) {
            (TargetDescriptor::Cube { .. }, Some(face)) => Ok(face.index()),
            (TargetDescriptor::Flat { .. }, None) => Ok(0),
            (TargetDescriptor::Cube { .. }, None) => Err(bad_dims("cube readback needs a face")),
            (TargetDescriptor::Flat { .. }, Some(face)) => {
                Err(bad_dims(format!("flat target has no face {}", face)))
            }
        }
    }
}

/// Pixel rectangle within one target layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[inline]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn check_within(&self, width: u32, height: u32) -> Result<()> {
        let fits = self.x.checked_add(self.width).map_or(false, |r| r <= width)
            && self.y.checked_add(self.height).map_or(false, |b| b <= height);

        if !fits {
            return Err(bad_dims(format!(
                "read rect {}x{}+{}+{} outside {}x{} target",
                self.width, self.height, self.x, self.y, width, height
            )));
        }

        Ok(())
    }
}

/// Executes full-screen passes and reads their results back.
///
/// Implementations are used by one caller at a time; the render target
/// returned by [`run_pass`](Self::run_pass) is released when dropped.
pub trait PassExecutor {
    type Target;

    fn run_pass(&mut self, pass: &Pass<'_, Self::Target>, desc: &TargetDescriptor) -> Result<Self::Target>;

    /// Tightly packed pixels of `rect` in the target's format, rows top to
    /// bottom. `layer` selects the face of a cube target.
    fn read_pixels(&mut self, target: &Self::Target, layer: Option<CubeFace>, rect: Rect) -> Result<Vec<u8>>;

    /// Run `f` with `cube` kept resident, so passes inside it that sample the
    /// same cube can share one upload. The cube is released when `f`
    /// returns.
    fn with_resident_cube<R, F>(&mut self, cube: &LinearCubemap, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let _ = cube;
        f(self)
    }
}

/// Split tightly packed RGBA32F readback bytes into texels.
pub fn rgba32f_texels(bytes: &[u8]) -> Vec<[f32; 4]> {
    bytes
        .chunks_exact(16)
        .map(|px| {
            let c = |i: usize| f32::from_le_bytes([px[i], px[i + 1], px[i + 2], px[i + 3]]);
            [c(0), c(4), c(8), c(12)]
        })
        .collect()
}
