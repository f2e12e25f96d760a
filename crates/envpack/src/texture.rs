//! In-memory texture model shared by every codec in the crate.
//!
//! A cubemap is stored level-major, face-minor: `levels[i][j]` is mip level
//! `i` of face `j`, faces in [`CubeFace::ALL`] order. Level 0 is the full
//! resolution face set and each following level halves the edge length down
//! to 1×1, so a cube of size `s` always carries `floor(log2(s)) + 1` levels.

use std::fmt;

use crate::error::{bad_dims, CodecError, Result};

/// Number of faces in a cubemap.
pub const CUBE_FACE_COUNT: usize = 6;

/// Cube faces in the order used by every encoder, decoder and file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

impl CubeFace {
    pub const ALL: [CubeFace; CUBE_FACE_COUNT] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CubeFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CubeFace::PositiveX => "+X",
            CubeFace::NegativeX => "-X",
            CubeFace::PositiveY => "+Y",
            CubeFace::NegativeY => "-Y",
            CubeFace::PositiveZ => "+Z",
            CubeFace::NegativeZ => "-Z",
        };

        f.write_str(s)
    }
}

/// Orientation of the face data.
///
/// Cubes rendered into a render target come out mirrored along X relative to
/// cubes uploaded from files; samplers negate the X component of the lookup
/// direction for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Winding {
    #[default]
    Standard,
    RenderTarget,
}

impl Winding {
    /// The `envMapFlip` uniform value for this winding.
    #[inline]
    pub fn env_map_flip(self) -> f32 {
        match self {
            Winding::Standard => 1.0,
            Winding::RenderTarget => -1.0,
        }
    }
}

/// A row-major raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<P> {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<P>,
}

/// Linear-light RGB raster.
pub type LinearImage = Image<[f32; 3]>;

/// Four 8-bit channels per pixel: RGBD faces and RGBE rasters.
pub type Rgba8Image = Image<[u8; 4]>;

impl<P: Copy> Image<P> {
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<P>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| bad_dims("image dimensions overflow"))?;

        if pixels.len() != expected {
            return Err(bad_dims(format!(
                "{}x{} image needs {} pixels, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: u32, height: u32, value: P) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> P) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);

        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }

        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> P {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn row(&self, y: u32) -> &[P] {
        let w = self.width as usize;
        let start = y as usize * w;
        &self.pixels[start..start + w]
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }
}

impl Rgba8Image {
    /// Tightly packed RGBA bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn from_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(bad_dims("RGBA8 byte length is not a multiple of 4"));
        }

        let pixels: &[[u8; 4]] = bytemuck::cast_slice(bytes);
        Self::from_pixels(width, height, pixels.to_vec())
    }
}

impl LinearImage {
    /// Halve both dimensions (never below 1) by averaging 2×2 blocks.
    pub fn downsample(&self) -> LinearImage {
        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);

        Image::from_fn(w, h, |x, y| {
            let x0 = (x * 2).min(self.width - 1);
            let x1 = (x * 2 + 1).min(self.width - 1);
            let y0 = (y * 2).min(self.height - 1);
            let y1 = (y * 2 + 1).min(self.height - 1);

            let taps = [
                self.pixel(x0, y0),
                self.pixel(x1, y0),
                self.pixel(x0, y1),
                self.pixel(x1, y1),
            ];

            let mut sum = [0.0f32; 3];
            for t in taps {
                sum[0] += t[0];
                sum[1] += t[1];
                sum[2] += t[2];
            }

            [sum[0] * 0.25, sum[1] * 0.25, sum[2] * 0.25]
        })
    }

    /// Multiply every channel by `factor`.
    pub fn scaled(&self, factor: f32) -> LinearImage {
        Image {
            width: self.width,
            height: self.height,
            pixels: self
                .pixels
                .iter()
                .map(|p| [p[0] * factor, p[1] * factor, p[2] * factor])
                .collect(),
        }
    }
}

/// Number of mip levels in a full chain for a face of `size` pixels.
#[inline]
pub fn mip_count_for(size: u32) -> usize {
    if size == 0 {
        0
    } else {
        (u32::BITS - size.leading_zeros()) as usize
    }
}

/// A cube texture with a complete mip chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Cubemap<P> {
    size: u32,
    levels: Vec<[Image<P>; CUBE_FACE_COUNT]>,
    winding: Winding,
}

/// Floating-point source cube.
pub type LinearCubemap = Cubemap<[f32; 3]>;

/// Quantized RGBD cube, one RGBA8 image per (level, face).
pub type RgbdCubemap = Cubemap<[u8; 4]>;

impl<P: Copy> Cubemap<P> {
    /// Build a cube from an explicit mip chain, checking that the size is a
    /// power of two, the chain is complete and every level halves exactly.
    pub fn from_levels(levels: Vec<[Image<P>; CUBE_FACE_COUNT]>, winding: Winding) -> Result<Self> {
        let size = levels
            .first()
            .map(|faces| faces[0].width)
            .ok_or_else(|| bad_dims("cubemap has no mip levels"))?;

        if !size.is_power_of_two() {
            return Err(bad_dims(format!("cube face size {} is not a power of two", size)));
        }

        let expected = mip_count_for(size);
        if levels.len() != expected {
            return Err(bad_dims(format!(
                "cube of size {} needs {} mip levels, got {}",
                size,
                expected,
                levels.len()
            )));
        }

        for (level, faces) in levels.iter().enumerate() {
            let want = size >> level;

            for (face, image) in CubeFace::ALL.iter().zip(faces.iter()) {
                if image.width != want || image.height != want {
                    return Err(bad_dims(format!(
                        "level {} face {} is {}x{}, expected {}x{}",
                        level, face, image.width, image.height, want, want
                    )));
                }

                if image.pixels.len() != (want * want) as usize {
                    return Err(bad_dims(format!(
                        "level {} face {} holds {} pixels, expected {}",
                        level,
                        face,
                        image.pixels.len(),
                        want * want
                    )));
                }
            }
        }

        Ok(Self {
            size,
            levels,
            winding,
        })
    }

    /// Edge length of the level 0 faces.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn mip_count(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn winding(&self) -> Winding {
        self.winding
    }

    /// Level 0 faces, the conventional face array.
    #[inline]
    pub fn faces(&self) -> &[Image<P>; CUBE_FACE_COUNT] {
        &self.levels[0]
    }

    #[inline]
    pub fn level(&self, level: usize) -> &[Image<P>; CUBE_FACE_COUNT] {
        &self.levels[level]
    }

    #[inline]
    pub fn levels(&self) -> &[[Image<P>; CUBE_FACE_COUNT]] {
        &self.levels
    }

    #[inline]
    pub fn face(&self, level: usize, face: CubeFace) -> &Image<P> {
        &self.levels[level][face.index()]
    }

    pub fn into_levels(self) -> Vec<[Image<P>; CUBE_FACE_COUNT]> {
        self.levels
    }
}

impl LinearCubemap {
    /// Build a cube from its level 0 faces, generating the rest of the chain
    /// with a 2×2 box filter.
    pub fn from_base_faces(faces: [LinearImage; CUBE_FACE_COUNT], winding: Winding) -> Result<Self> {
        let size = faces[0].width;
        if size == 0 || !size.is_power_of_two() {
            return Err(bad_dims(format!("cube face size {} is not a power of two", size)));
        }

        for (face, image) in CubeFace::ALL.iter().zip(faces.iter()) {
            if image.width != size || image.height != size {
                return Err(bad_dims(format!(
                    "face {} is {}x{}, expected {}x{}",
                    face, image.width, image.height, size, size
                )));
            }
        }

        let count = mip_count_for(size);
        let mut levels = Vec::with_capacity(count);
        levels.push(faces);

        while levels.len() < count {
            let prev = &levels[levels.len() - 1];
            let next: [LinearImage; CUBE_FACE_COUNT] = std::array::from_fn(|j| prev[j].downsample());
            levels.push(next);
        }

        Self::from_levels(levels, winding)
    }
}

/// Topology of a texture, for [`CodecError::InvalidInputKind`] reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Cube,
    Flat,
}

impl fmt::Display for TextureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextureKind::Cube => "cube",
            TextureKind::Flat => "2d",
        })
    }
}

/// A loaded environment: either a cube with mips or a flat panorama.
#[derive(Debug, Clone, PartialEq)]
pub enum Texture {
    Cube(LinearCubemap),
    Flat(LinearImage),
}

impl Texture {
    #[inline]
    pub fn kind(&self) -> TextureKind {
        match self {
            Texture::Cube(_) => TextureKind::Cube,
            Texture::Flat(_) => TextureKind::Flat,
        }
    }

    pub fn as_cube(&self) -> Result<&LinearCubemap> {
        match self {
            Texture::Cube(cube) => Ok(cube),
            other => Err(CodecError::InvalidInputKind {
                expected: TextureKind::Cube,
                got: other.kind(),
            }),
        }
    }
}

impl From<LinearCubemap> for Texture {
    fn from(cube: LinearCubemap) -> Self {
        Texture::Cube(cube)
    }
}

impl From<LinearImage> for Texture {
    fn from(image: LinearImage) -> Self {
        Texture::Flat(image)
    }
}
