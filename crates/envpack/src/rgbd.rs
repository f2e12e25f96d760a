//! RGBD quantization of floating-point cube mip chains.
//!
//! A linear colour is stored as `(rgb * D, D)` where `D = floor(255 / max) / 255`
//! clamped to `[1/255, 1]`, so the brightest channel lands just under 1.0.
//! The payload is sRGB-encoded before the 8-bit write; decoders undo the
//! transfer function and divide by `D`.

use glam::Mat3;
use log::debug;

use crate::color::{from_unorm8, linear_to_srgb, srgb_to_linear, to_unorm8};
use crate::error::{bad_dims, Result};
use crate::pass::{rgba32f_texels, Pass, PassExecutor, PixelFormat, Rect, TargetDescriptor};
use crate::texture::{
    CubeFace, Image, LinearCubemap, LinearImage, Rgba8Image, RgbdCubemap, Texture, Winding, CUBE_FACE_COUNT,
};

#[inline]
fn sanitize(v: f32) -> f32 {
    if v > 0.0 && v.is_finite() {
        v
    } else if v == f32::INFINITY {
        f32::MAX
    } else {
        0.0
    }
}

/// Shared divisor for `color`, as the 8-bit value written to the D channel.
pub fn divisor(color: [f32; 3]) -> u8 {
    to_unorm8(encode_fragment(color)[3])
}

/// RGBD encode as evaluated by the fragment shader, before the target write.
pub fn encode_fragment(color: [f32; 3]) -> [f32; 4] {
    let c = color.map(sanitize);
    let max_rgb = c[0].max(c[1]).max(c[2]);

    let d = (255.0 / max_rgb).max(1.0);
    let d = (d.floor() / 255.0).clamp(0.0, 1.0);

    [
        linear_to_srgb(c[0] * d).clamp(0.0, 1.0),
        linear_to_srgb(c[1] * d).clamp(0.0, 1.0),
        linear_to_srgb(c[2] * d).clamp(0.0, 1.0),
        d,
    ]
}

/// Quantized RGBD pixel for `color`.
#[inline]
pub fn encode_pixel(color: [f32; 3]) -> [u8; 4] {
    encode_fragment(color).map(to_unorm8)
}

/// Inverse of the encode transform on normalized channels. `d == 0` is black.
pub fn decode_fragment(rgbd: [f32; 4]) -> [f32; 3] {
    let d = rgbd[3];
    if d <= 0.0 {
        return [0.0; 3];
    }

    [
        srgb_to_linear(rgbd[0]) / d,
        srgb_to_linear(rgbd[1]) / d,
        srgb_to_linear(rgbd[2]) / d,
    ]
}

#[inline]
pub fn decode_pixel(rgbd: [u8; 4]) -> [f32; 3] {
    decode_fragment(rgbd.map(from_unorm8))
}

/// Quantizes a cube source into an RGBD cube with the same mip count.
#[derive(Debug, Clone, Default)]
pub struct RgbdEncoder {
    /// Yaw applied to every lookup direction, radians.
    pub rotation_y: f32,
}

impl RgbdEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rotation_y(rotation_y: f32) -> Self {
        Self { rotation_y }
    }

    /// Render every (level, face) of `source` through the RGBD pass and read
    /// it back. Levels are produced in ascending order, faces in
    /// [`CubeFace::ALL`] order.
    pub fn encode<E: PassExecutor>(&self, executor: &mut E, source: &Texture) -> Result<RgbdCubemap> {
        let cube = source.as_cube()?;

        debug!(
            "RGBD encode: {} px, {} levels, yaw {:.4} rad, flip {}",
            cube.size(),
            cube.mip_count(),
            self.rotation_y,
            cube.winding().env_map_flip()
        );

        let levels = executor.with_resident_cube(cube, |executor| self.encode_levels(executor, cube))?;

        RgbdCubemap::from_levels(levels, Winding::Standard)
    }

    fn encode_levels<E: PassExecutor>(
        &self,
        executor: &mut E,
        cube: &LinearCubemap,
    ) -> Result<Vec<[Rgba8Image; CUBE_FACE_COUNT]>> {
        let size = cube.size();
        let rotation = Mat3::from_rotation_y(self.rotation_y);
        let env_map_flip = cube.winding().env_map_flip();
        let mut levels = Vec::with_capacity(cube.mip_count());

        for level in 0..cube.mip_count() {
            let level_size = size >> level;
            let desc = TargetDescriptor::Cube {
                size: level_size,
                format: PixelFormat::Rgba8Unorm,
            };

            let pass = Pass::RgbdEncode {
                environment_map: cube,
                level: level as u32,
                rotation,
                env_map_flip,
            };

            let target = executor.run_pass(&pass, &desc)?;

            let mut faces = Vec::with_capacity(CUBE_FACE_COUNT);
            for face in CubeFace::ALL {
                let bytes = executor.read_pixels(&target, Some(face), Rect::full(level_size, level_size))?;
                faces.push(Rgba8Image::from_bytes(level_size, level_size, &bytes)?);
            }

            levels.push(six(faces)?);
        }

        Ok(levels)
    }
}

/// Reconstructs a floating-point cube from RGBD faces.
#[derive(Debug, Clone, Copy, Default)]
pub struct RgbdDecoder;

impl RgbdDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode through the executor's inverse pass, one level at a time.
    pub fn decode<E: PassExecutor>(&self, executor: &mut E, encoded: &RgbdCubemap) -> Result<LinearCubemap> {
        debug!("RGBD decode: {} px, {} levels", encoded.size(), encoded.mip_count());

        let mut levels = Vec::with_capacity(encoded.mip_count());

        for level in 0..encoded.mip_count() {
            let level_size = encoded.size() >> level;
            let desc = TargetDescriptor::Cube {
                size: level_size,
                format: PixelFormat::Rgba32Float,
            };

            let pass = Pass::RgbdDecode {
                environment_map: encoded,
                level: level as u32,
            };

            let target = executor.run_pass(&pass, &desc)?;

            let mut faces = Vec::with_capacity(CUBE_FACE_COUNT);
            for face in CubeFace::ALL {
                let bytes = executor.read_pixels(&target, Some(face), Rect::full(level_size, level_size))?;
                let pixels = rgba32f_texels(&bytes).into_iter().map(|t| [t[0], t[1], t[2]]).collect();
                faces.push(Image::from_pixels(level_size, level_size, pixels)?);
            }

            levels.push(six(faces)?);
        }

        LinearCubemap::from_levels(levels, encoded.winding())
    }

    /// Per-pixel division on the CPU, without an executor.
    pub fn decode_cpu(&self, encoded: &RgbdCubemap) -> Result<LinearCubemap> {
        let levels = encoded
            .levels()
            .iter()
            .map(|faces| {
                std::array::from_fn(|j| {
                    let face = &faces[j];
                    LinearImage {
                        width: face.width,
                        height: face.height,
                        pixels: face.pixels.iter().map(|p| decode_pixel(*p)).collect(),
                    }
                })
            })
            .collect();

        LinearCubemap::from_levels(levels, encoded.winding())
    }
}

fn six<P>(faces: Vec<Image<P>>) -> Result<[Image<P>; CUBE_FACE_COUNT]> {
    let count = faces.len();
    faces
        .try_into()
        .map_err(|_| bad_dims(format!("expected {} faces, got {}", CUBE_FACE_COUNT, count)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CpuExecutor, CpuTarget};
    use crate::error::CodecError;
    use crate::texture::TextureKind;

    fn solid_cube(size: u32, color: [f32; 3]) -> LinearCubemap {
        LinearCubemap::from_base_faces(std::array::from_fn(|_| Image::filled(size, size, color)), Winding::Standard)
            .unwrap()
    }

    /// Worst-case reconstruction error for divisor `d`: half an sRGB step at
    /// full scale, expanded by the division.
    fn step_bound(d: u8) -> f32 {
        1.15 / d as f32
    }

    #[test]
    fn mid_grey_cube_round_trips_within_one_step() {
        let source = Texture::Cube(solid_cube(8, [0.5, 0.5, 0.5]));
        let mut exec = CpuExecutor::new();

        let encoded = RgbdEncoder::new().encode(&mut exec, &source).unwrap();
        let decoded = RgbdDecoder::new().decode(&mut exec, &encoded).unwrap();

        for faces in decoded.levels() {
            for face in faces {
                for p in &face.pixels {
                    for c in p {
                        assert!((c - 0.5).abs() <= 1.0 / 255.0, "decoded {}", c);
                    }
                }
            }
        }
    }

    #[test]
    fn hdr_colours_round_trip_within_divisor_step() {
        let colours = [
            [12.0, 3.0, 0.1],
            [0.02, 0.9, 0.4],
            [250.0, 1.0, 64.0],
            [1.0, 1.0, 1.0],
            [0.0, 0.0, 0.0],
        ];

        for colour in colours {
            let d = divisor(colour);
            let back = decode_pixel(encode_pixel(colour));

            for (orig, dec) in colour.iter().zip(back.iter()) {
                assert!(
                    (orig - dec).abs() <= step_bound(d),
                    "{:?} -> {:?} (d = {})",
                    colour,
                    back,
                    d
                );
            }
        }
    }

    #[test]
    fn divisor_is_largest_that_keeps_channels_in_range() {
        assert_eq!(divisor([0.5, 0.1, 0.0]), 255);
        assert_eq!(divisor([2.0, 0.1, 0.0]), 127);
        assert_eq!(divisor([12.0, 3.0, 0.1]), 21);
        assert_eq!(divisor([1000.0, 0.0, 0.0]), 1);
        assert_eq!(divisor([0.0, 0.0, 0.0]), 255);
    }

    #[test]
    fn zero_divisor_decodes_to_black() {
        assert_eq!(decode_pixel([200, 100, 50, 0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn executor_and_cpu_decoders_agree() {
        let source = Texture::Cube(solid_cube(4, [3.0, 0.25, 0.75]));
        let mut exec = CpuExecutor::new();

        let encoded = RgbdEncoder::new().encode(&mut exec, &source).unwrap();
        let via_pass = RgbdDecoder::new().decode(&mut exec, &encoded).unwrap();
        let direct = RgbdDecoder::new().decode_cpu(&encoded).unwrap();

        assert_eq!(via_pass, direct);
    }

    #[test]
    fn keeps_mip_count_and_exposes_level_zero() {
        let source = Texture::Cube(solid_cube(16, [0.2, 0.4, 0.6]));
        let encoded = RgbdEncoder::new().encode(&mut CpuExecutor::new(), &source).unwrap();

        assert_eq!(encoded.mip_count(), 5);
        assert_eq!(encoded.faces(), encoded.level(0));
        assert_eq!(encoded.level(4)[0].width, 1);
    }

    #[test]
    fn yaw_rotates_faces() {
        let faces: [LinearImage; CUBE_FACE_COUNT] = std::array::from_fn(|j| {
            let colour = if j == CubeFace::PositiveX.index() {
                [1.0, 0.0, 0.0]
            } else {
                [0.0, 0.0, 0.0]
            };
            Image::filled(4, 4, colour)
        });
        let source = Texture::Cube(LinearCubemap::from_base_faces(faces, Winding::Standard).unwrap());

        let encoder = RgbdEncoder::with_rotation_y(std::f32::consts::FRAC_PI_2);
        let encoded = encoder.encode(&mut CpuExecutor::new(), &source).unwrap();
        let decoded = RgbdDecoder::new().decode_cpu(&encoded).unwrap();

        for p in &decoded.face(0, CubeFace::PositiveZ).pixels {
            assert!((p[0] - 1.0).abs() <= step_bound(255));
            assert!(p[1].abs() < 1e-6 && p[2].abs() < 1e-6);
        }
    }

    /// Records whether encode passes run while their source is resident.
    #[derive(Default)]
    struct ResidencyLog {
        inner: CpuExecutor,
        resident: bool,
        scopes: usize,
        passes_outside: usize,
    }

    impl PassExecutor for ResidencyLog {
        type Target = CpuTarget;

        fn run_pass(&mut self, pass: &Pass<'_, CpuTarget>, desc: &TargetDescriptor) -> Result<CpuTarget> {
            if !self.resident {
                self.passes_outside += 1;
            }
            self.inner.run_pass(pass, desc)
        }

        fn read_pixels(&mut self, target: &CpuTarget, layer: Option<CubeFace>, rect: Rect) -> Result<Vec<u8>> {
            self.inner.read_pixels(target, layer, rect)
        }

        fn with_resident_cube<R, F>(&mut self, _cube: &LinearCubemap, f: F) -> Result<R>
        where
            F: FnOnce(&mut Self) -> Result<R>,
        {
            self.scopes += 1;
            self.resident = true;
            let out = f(self);
            self.resident = false;
            out
        }
    }

    #[test]
    fn source_is_made_resident_once_per_encode() {
        let source = Texture::Cube(solid_cube(8, [0.5, 1.0, 2.0]));
        let mut exec = ResidencyLog::default();

        let encoded = RgbdEncoder::new().encode(&mut exec, &source).unwrap();

        assert_eq!(encoded.mip_count(), 4);
        assert_eq!(exec.scopes, 1);
        assert_eq!(exec.passes_outside, 0);
        assert!(!exec.resident);
    }

    #[test]
    fn flat_input_is_rejected() {
        let source = Texture::Flat(Image::filled(16, 8, [1.0; 3]));
        let err = RgbdEncoder::new().encode(&mut CpuExecutor::new(), &source).unwrap_err();

        assert!(matches!(
            err,
            CodecError::InvalidInputKind {
                expected: TextureKind::Cube,
                ..
            }
        ));
    }
}
