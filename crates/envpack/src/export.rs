//! End-to-end exporters and the `.env` loader.
//!
//! Rotations are taken in degrees of yaw, as entered by a user, and
//! converted to radians before they reach the passes.

use log::info;

use crate::container::{self, ContainerOptions, ImageCodec, PngCodec};
use crate::equirect::{panorama_extent, EquirectProjector};
use crate::error::Result;
use crate::hdr::HdrWriter;
use crate::pass::PassExecutor;
use crate::rgbd::{RgbdDecoder, RgbdEncoder};
use crate::rgbe::RgbeEncoder;
use crate::rle::check_scanline_width;
use crate::texture::{LinearCubemap, Texture};

/// Cube texture → `.env` container bytes.
#[derive(Debug, Clone, Default)]
pub struct EnvExporter<C = PngCodec> {
    pub codec: C,
    pub options: ContainerOptions,
}

impl<C: ImageCodec> EnvExporter<C> {
    pub fn new(codec: C, options: ContainerOptions) -> Self {
        Self { codec, options }
    }

    pub fn to_bytes<E: PassExecutor>(&self, executor: &mut E, texture: &Texture, rotation_deg: f32) -> Result<Vec<u8>> {
        let encoder = RgbdEncoder::with_rotation_y(rotation_deg.to_radians());
        let encoded = encoder.encode(executor, texture)?;
        let bytes = container::serialize(&encoded, &self.codec, &self.options)?;

        info!(
            "env export: {}px, {} levels, {} bytes",
            encoded.size(),
            encoded.mip_count(),
            bytes.len()
        );

        Ok(bytes)
    }
}

/// Cube texture → Radiance `.hdr` panorama bytes.
#[derive(Debug, Clone)]
pub struct HdrExporter {
    /// Multiplier applied to the panorama before packing.
    pub exposure: f32,
    pub writer: HdrWriter,
}

impl Default for HdrExporter {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            writer: HdrWriter::default(),
        }
    }
}

impl HdrExporter {
    pub fn new(exposure: f32, writer: HdrWriter) -> Self {
        Self { exposure, writer }
    }

    pub fn to_bytes<E: PassExecutor>(&self, executor: &mut E, texture: &Texture, rotation_deg: f32) -> Result<Vec<u8>> {
        let cube = texture.as_cube()?;
        let (width, height) = panorama_extent(cube.size());
        check_scanline_width(width as usize)?;

        let projector = EquirectProjector::new(rotation_deg.to_radians(), false);
        let panorama = projector.convert(executor, texture)?;

        let rgbe = RgbeEncoder::with_exposure(self.exposure).encode(executor, &panorama)?;
        let bytes = self.writer.to_bytes(&rgbe)?;

        info!("hdr export: {}x{}, {} bytes", width, height, bytes.len());

        Ok(bytes)
    }
}

/// `.env` container bytes → floating-point cube.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader<C = PngCodec> {
    pub codec: C,
    pub decoder: RgbdDecoder,
}

impl<C: ImageCodec> EnvLoader<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            decoder: RgbdDecoder::new(),
        }
    }

    /// Decode through the executor's inverse pass.
    pub fn load<E: PassExecutor>(&self, executor: &mut E, bytes: &[u8]) -> Result<LinearCubemap> {
        let encoded = container::deserialize(bytes, &self.codec)?;
        self.decoder.decode(executor, &encoded)
    }

    /// Decode with per-pixel division, no executor needed.
    pub fn load_cpu(&self, bytes: &[u8]) -> Result<LinearCubemap> {
        let encoded = container::deserialize(bytes, &self.codec)?;
        self.decoder.decode_cpu(&encoded)
    }
}
