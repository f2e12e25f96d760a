//! Reference executor that evaluates every pass on the CPU.
//!
//! Fragment outputs are written through the same quantization a render
//! target applies (round-to-nearest UNORM8, or raw f32), so readbacks match
//! what a GPU would return for the same shader.

use glam::{Mat3, Vec3};
use log::trace;

use crate::color::{from_unorm8, to_unorm8};
use crate::equirect;
use crate::error::{bad_dims, CodecError, Result};
use crate::pass::{FlatInput, Pass, PassExecutor, PixelFormat, Rect, TargetDescriptor};
use crate::rgbd;
use crate::rgbe;
use crate::sampler::{sample_cube, sample_cube_nearest, texel_direction};
use crate::texture::{CubeFace, LinearCubemap, TextureKind};

/// Texture filtering used for cube lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Render target memory: one byte buffer per layer in the target format.
#[derive(Debug, Clone)]
pub struct CpuTarget {
    desc: TargetDescriptor,
    layers: Vec<Vec<u8>>,
}

impl CpuTarget {
    fn new(desc: TargetDescriptor) -> Self {
        let (w, h) = desc.extent();
        let len = w as usize * h as usize * desc.format().bytes_per_pixel();

        Self {
            desc,
            layers: vec![vec![0u8; len]; desc.layer_count()],
        }
    }

    fn write(&mut self, layer: usize, x: u32, y: u32, value: [f32; 4]) {
        let (w, _) = self.desc.extent();
        let bpp = self.desc.format().bytes_per_pixel();
        let at = (y as usize * w as usize + x as usize) * bpp;
        let dst = &mut self.layers[layer][at..at + bpp];

        match self.desc.format() {
            PixelFormat::Rgba8Unorm => {
                for (d, v) in dst.iter_mut().zip(value) {
                    *d = to_unorm8(v);
                }
            }
            PixelFormat::Rgba32Float => {
                for (chunk, v) in dst.chunks_exact_mut(4).zip(value) {
                    chunk.copy_from_slice(&v.to_le_bytes());
                }
            }
        }
    }

    fn texel(&self, layer: usize, x: u32, y: u32) -> [f32; 4] {
        let (w, _) = self.desc.extent();
        let bpp = self.desc.format().bytes_per_pixel();
        let at = (y as usize * w as usize + x as usize) * bpp;
        let src = &self.layers[layer][at..at + bpp];

        match self.desc.format() {
            PixelFormat::Rgba8Unorm => [
                from_unorm8(src[0]),
                from_unorm8(src[1]),
                from_unorm8(src[2]),
                from_unorm8(src[3]),
            ],
            PixelFormat::Rgba32Float => {
                let c = |i: usize| f32::from_le_bytes([src[i], src[i + 1], src[i + 2], src[i + 3]]);
                [c(0), c(4), c(8), c(12)]
            }
        }
    }

    fn fill(&mut self, mut shade: impl FnMut(usize, u32, u32) -> [f32; 4]) {
        let (w, h) = self.desc.extent();

        for layer in 0..self.desc.layer_count() {
            for y in 0..h {
                for x in 0..w {
                    let value = shade(layer, x, y);
                    self.write(layer, x, y, value);
                }
            }
        }
    }
}

/// Executes passes on the calling thread.
#[derive(Debug, Clone, Default)]
pub struct CpuExecutor {
    pub filter: Filter,
}

impl CpuExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: Filter) -> Self {
        Self { filter }
    }

    fn sample(&self, cube: &LinearCubemap, level: usize, dir: Vec3) -> [f32; 3] {
        match self.filter {
            Filter::Linear => sample_cube(cube, level, dir),
            Filter::Nearest => sample_cube_nearest(cube, level, dir),
        }
    }
}

fn expect_cube(desc: &TargetDescriptor) -> Result<()> {
    if desc.is_cube() {
        Ok(())
    } else {
        Err(CodecError::InvalidInputKind {
            expected: TextureKind::Cube,
            got: TextureKind::Flat,
        })
    }
}

fn expect_flat(desc: &TargetDescriptor) -> Result<()> {
    if desc.is_cube() {
        Err(CodecError::InvalidInputKind {
            expected: TextureKind::Flat,
            got: TextureKind::Cube,
        })
    } else {
        Ok(())
    }
}

impl PassExecutor for CpuExecutor {
    type Target = CpuTarget;

    fn run_pass(&mut self, pass: &Pass<'_, CpuTarget>, desc: &TargetDescriptor) -> Result<CpuTarget> {
        let (width, height) = desc.extent();
        if width == 0 || height == 0 {
            return Err(bad_dims("render target has zero extent"));
        }

        trace!("cpu pass {} -> {:?}", pass.shader(), desc);

        let mut target = CpuTarget::new(*desc);

        match pass {
            Pass::RgbdEncode {
                environment_map,
                level,
                rotation,
                env_map_flip,
            } => {
                expect_cube(desc)?;
                let level = *level as usize;
                if level >= environment_map.mip_count() {
                    return Err(bad_dims(format!("source has no mip level {}", level)));
                }

                let identity = *rotation == Mat3::IDENTITY
                    && *env_map_flip == 1.0
                    && environment_map.size() >> level == width;

                if identity {
                    target.fill(|layer, x, y| {
                        let colour = environment_map.level(level)[layer].pixel(x, y);
                        rgbd::encode_fragment(colour)
                    });
                } else {
                    target.fill(|layer, x, y| {
                        let dir = texel_direction(CubeFace::ALL[layer], x, y, width);
                        let mut dir = *rotation * dir;
                        dir.x *= env_map_flip;
                        rgbd::encode_fragment(self.sample(environment_map, level, dir))
                    });
                }
            }

            Pass::RgbdDecode { environment_map, level } => {
                expect_cube(desc)?;
                let level = *level as usize;
                if level >= environment_map.mip_count() || environment_map.size() >> level != width {
                    return Err(bad_dims(format!(
                        "decode target {}px does not match mip level {}",
                        width, level
                    )));
                }

                target.fill(|layer, x, y| {
                    let rgbd = environment_map.level(level)[layer].pixel(x, y);
                    let [r, g, b] = rgbd::decode_fragment(rgbd.map(from_unorm8));
                    [r, g, b, 1.0]
                });
            }

            Pass::CubeToEquirect {
                environment_map,
                rotation,
                env_map_flip,
            } => {
                expect_flat(desc)?;

                target.fill(|_, x, y| {
                    let u = (x as f32 + 0.5) / width as f32;
                    let v = (y as f32 + 0.5) / height as f32;
                    let dir = equirect::direction_for_uv(env_map_flip * u, v);
                    let [r, g, b] = self.sample(environment_map, 0, (*rotation * dir).normalize());
                    [r, g, b, 1.0]
                });
            }

            Pass::RgbeEncode { input, exposure } => {
                expect_flat(desc)?;

                match input {
                    FlatInput::Image(image) => {
                        if (image.width, image.height) != (width, height) {
                            return Err(bad_dims("RGBE target size differs from input"));
                        }

                        target.fill(|_, x, y| {
                            let [r, g, b] = image.pixel(x, y);
                            rgbe::encode_fragment([r * exposure, g * exposure, b * exposure])
                        });
                    }
                    FlatInput::Resident(source) => {
                        expect_flat(&source.desc)?;
                        if source.desc.extent() != (width, height) {
                            return Err(bad_dims("RGBE target size differs from input"));
                        }

                        target.fill(|_, x, y| {
                            let t = source.texel(0, x, y);
                            rgbe::encode_fragment([t[0] * exposure, t[1] * exposure, t[2] * exposure])
                        });
                    }
                }
            }
        }

        Ok(target)
    }

    fn read_pixels(&mut self, target: &CpuTarget, layer: Option<CubeFace>, rect: Rect) -> Result<Vec<u8>> {
        let layer = target.desc.layer_index(layer)?;
        let (width, height) = target.desc.extent();
        rect.check_within(width, height)?;

        let bpp = target.desc.format().bytes_per_pixel();
        let stride = width as usize * bpp;
        let row_len = rect.width as usize * bpp;
        let data = &target.layers[layer];

        let mut out = Vec::with_capacity(row_len * rect.height as usize);
        for y in rect.y..rect.y + rect.height {
            let start = y as usize * stride + rect.x as usize * bpp;
            out.extend_from_slice(&data[start..start + row_len]);
        }

        Ok(out)
    }
}
