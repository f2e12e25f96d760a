//! Shared-exponent RGBE pixels, Radiance convention.
//!
//! Mantissas are bytes and the exponent is biased by 136, so a stored pixel
//! `(m, E)` means `m * 2^(E - 136)`. `E == 0` is black.

use log::debug;

use crate::color::to_unorm8;
use crate::equirect::Equirect;
use crate::error::Result;
use crate::pass::{FlatInput, Pass, PassExecutor, PixelFormat, Rect, TargetDescriptor};
use crate::texture::{LinearImage, Rgba8Image};

pub const RGBE_EXPONENT_BIAS: i32 = 136;

/// RGBE encode as evaluated by the fragment shader: normalized channels
/// before the 8-bit target write.
pub fn encode_fragment(color: [f32; 3]) -> [f32; 4] {
    let c = color.map(|v| if v.is_finite() { v as f64 } else if v > 0.0 { f32::MAX as f64 } else { 0.0 });
    let max_component = c[0].max(c[1]).max(c[2]).max(0.0) / 255.0;

    let e = ((max_component.log2().ceil()) + RGBE_EXPONENT_BIAS as f64).clamp(0.0, 255.0);
    let scale = (RGBE_EXPONENT_BIAS as f64 - e).exp2();

    let m = |v: f64| ((v * scale) / 255.0).clamp(0.0, 1.0) as f32;

    [m(c[0]), m(c[1]), m(c[2]), (e / 255.0) as f32]
}

#[inline]
pub fn encode_pixel(color: [f32; 3]) -> [u8; 4] {
    encode_fragment(color).map(to_unorm8)
}

pub fn decode_pixel(rgbe: [u8; 4]) -> [f32; 3] {
    let e = rgbe[3];
    if e == 0 {
        return [0.0; 3];
    }

    let f = 2f32.powi(e as i32 - RGBE_EXPONENT_BIAS);
    [rgbe[0] as f32 * f, rgbe[1] as f32 * f, rgbe[2] as f32 * f]
}

/// Decode a whole RGBE raster to linear light.
pub fn decode_image(image: &Rgba8Image) -> LinearImage {
    LinearImage {
        width: image.width,
        height: image.height,
        pixels: image.pixels.iter().map(|p| decode_pixel(*p)).collect(),
    }
}

/// Packs a linear 2D raster into RGBE through the executor.
#[derive(Debug, Clone)]
pub struct RgbeEncoder {
    /// Multiplier applied to every channel before packing.
    pub exposure: f32,
}

impl Default for RgbeEncoder {
    fn default() -> Self {
        Self { exposure: 1.0 }
    }
}

impl RgbeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exposure(exposure: f32) -> Self {
        Self { exposure }
    }

    /// Encode a CPU raster.
    pub fn encode_image<E: PassExecutor>(&self, executor: &mut E, image: &LinearImage) -> Result<Rgba8Image> {
        self.run(executor, FlatInput::Image(image), image.width, image.height)
    }

    /// Encode projector output, reading a resident panorama straight from
    /// the executor.
    pub fn encode<E: PassExecutor>(&self, executor: &mut E, source: &Equirect<E::Target>) -> Result<Rgba8Image> {
        match source {
            Equirect::Resident { target, width, height } => {
                self.run(executor, FlatInput::Resident(target), *width, *height)
            }
            Equirect::Readback(image) => self.encode_image(executor, image),
        }
    }

    fn run<E: PassExecutor>(
        &self,
        executor: &mut E,
        input: FlatInput<'_, E::Target>,
        width: u32,
        height: u32,
    ) -> Result<Rgba8Image> {
        debug!("RGBE encode: {}x{}, exposure {}", width, height, self.exposure);

        let desc = TargetDescriptor::Flat {
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
        };
        let pass = Pass::RgbeEncode {
            input,
            exposure: self.exposure,
        };

        let target = executor.run_pass(&pass, &desc)?;
        let bytes = executor.read_pixels(&target, None, Rect::full(width, height))?;

        Rgba8Image::from_bytes(width, height, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuExecutor;
    use crate::texture::Image;

    #[test]
    fn full_scale_mantissa_has_unit_scale() {
        assert_eq!(encode_pixel([255.0, 255.0, 255.0]), [255, 255, 255, 136]);
    }

    #[test]
    fn unit_white_packs_half_mantissa() {
        let rgbe = encode_pixel([1.0, 1.0, 1.0]);
        assert_eq!(rgbe, [128, 128, 128, 129]);
        assert_eq!(decode_pixel(rgbe), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn black_has_zero_exponent() {
        assert_eq!(encode_pixel([0.0, 0.0, 0.0]), [0, 0, 0, 0]);
        assert_eq!(decode_pixel([12, 40, 3, 0]), [0.0, 0.0, 0.0]);
        assert_eq!(encode_pixel([-4.0, f32::NAN, 0.0]), [0, 0, 0, 0]);
    }

    #[test]
    fn relative_error_is_bounded_by_mantissa_precision() {
        let colours = [[0.18, 0.02, 3.5], [1000.0, 10.0, 0.1], [0.001, 0.001, 0.0005]];

        for colour in colours {
            let back = decode_pixel(encode_pixel(colour));
            let max = colour.iter().cloned().fold(0.0f32, f32::max);

            for (a, b) in colour.iter().zip(back.iter()) {
                assert!((a - b).abs() <= max / 128.0, "{:?} -> {:?}", colour, back);
            }
        }
    }

    #[test]
    fn exposure_scales_before_packing() {
        let image = Image::filled(8, 2, [0.5f32, 0.5, 0.5]);
        let packed = RgbeEncoder::with_exposure(2.0)
            .encode_image(&mut CpuExecutor::new(), &image)
            .unwrap();

        assert!(packed.pixels.iter().all(|p| *p == encode_pixel([1.0, 1.0, 1.0])));
        assert_eq!(decode_image(&packed).pixels[0], [1.0, 1.0, 1.0]);
    }
}
