//! Headless wgpu implementation of [`PassExecutor`].
//!
//! Each pass is a full-screen triangle per target layer. Sources are
//! uploaded as RGBA32F (linear cubes, panoramas) or RGBA8 (RGBD cubes);
//! cube lookups need `FLOAT32_FILTERABLE`, and an adapter without it is
//! reported as [`CodecError::CapabilityUnavailable`]. The GL backend is
//! refused the same way: it drops draws into single layers of a cube
//! target and reads back black faces.
//!
//! Unlike [`CpuExecutor`](crate::cpu::CpuExecutor), hardware cube filtering
//! blends across face seams, so texels on face borders can differ by a
//! filter tap.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::Mat3;
use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::error::{bad_dims, CodecError, Result};
use crate::pass::{FlatInput, Pass, PassExecutor, PixelFormat, Rect, ShaderId, TargetDescriptor};
use crate::texture::{CubeFace, Image, LinearCubemap, LinearImage, RgbdCubemap, CUBE_FACE_COUNT};

const FULLSCREEN_WGSL: &str = include_str!("../shaders/fullscreen.wgsl");

/// Uniform block shared by every shader; `mat3x3` columns are padded to 16
/// bytes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PassUniforms {
    rotation: [[f32; 4]; 3],
    face: u32,
    level: f32,
    env_map_flip: f32,
    exposure: f32,
}

impl PassUniforms {
    fn new(rotation: Mat3, face: u32, level: u32, env_map_flip: f32, exposure: f32) -> Self {
        Self {
            rotation: [
                rotation.x_axis.extend(0.0).to_array(),
                rotation.y_axis.extend(0.0).to_array(),
                rotation.z_axis.extend(0.0).to_array(),
            ],
            face,
            level: level as f32,
            env_map_flip,
            exposure,
        }
    }
}

fn shader_source(shader: ShaderId) -> &'static str {
    match shader {
        ShaderId::RgbdEncode => include_str!("../shaders/rgbd_encode.wgsl"),
        ShaderId::RgbdDecode => include_str!("../shaders/rgbd_decode.wgsl"),
        ShaderId::CubeToEquirect => include_str!("../shaders/cube_to_equi.wgsl"),
        ShaderId::RgbeEncode => include_str!("../shaders/rgbe_encode.wgsl"),
    }
}

fn output_format(shader: ShaderId) -> PixelFormat {
    match shader {
        ShaderId::RgbdEncode | ShaderId::RgbeEncode => PixelFormat::Rgba8Unorm,
        ShaderId::RgbdDecode | ShaderId::CubeToEquirect => PixelFormat::Rgba32Float,
    }
}

fn wgpu_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

fn align_bpr(value: usize) -> usize {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    ((value + align - 1) / align) * align
}

struct PassPipeline {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

/// Output of a GPU pass, kept on the device until dropped.
#[derive(Debug)]
pub struct GpuTarget {
    texture: wgpu::Texture,
    desc: TargetDescriptor,
}

/// Identity of a borrowed cube while it is resident.
fn cube_addr(cube: &LinearCubemap) -> usize {
    cube as *const LinearCubemap as usize
}

fn check_adapter(info: &wgpu::AdapterInfo, features: wgpu::Features) -> Result<()> {
    if info.backend == wgpu::Backend::Gl {
        return Err(CodecError::CapabilityUnavailable(format!(
            "{} runs on the GL backend, which cannot render into cube layers",
            info.name
        )));
    }

    if !features.contains(wgpu::Features::FLOAT32_FILTERABLE) {
        return Err(CodecError::CapabilityUnavailable(format!(
            "{} cannot filter 32-bit float textures",
            info.name
        )));
    }

    Ok(())
}

pub struct GpuExecutor {
    device: wgpu::Device,
    queue: wgpu::Queue,
    sampler: wgpu::Sampler,
    pipelines: HashMap<ShaderId, PassPipeline>,
    resident_cube: Option<(usize, wgpu::TextureView)>,
}

impl GpuExecutor {
    /// Open the first high-performance adapter, blocking until it is ready.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| CodecError::CapabilityUnavailable("no GPU adapter found".into()))?;

        let info = adapter.get_info();
        check_adapter(&info, adapter.features())?;

        let features = wgpu::Features::FLOAT32_FILTERABLE;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("envpack device"),
                    required_features: features,
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| CodecError::CapabilityUnavailable(e.to_string()))?;

        info!("gpu executor on {} ({:?})", info.name, info.backend);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("envpack cube sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            sampler,
            pipelines: HashMap::new(),
            resident_cube: None,
        })
    }

    fn resident_view(&self, cube: &LinearCubemap) -> Option<&wgpu::TextureView> {
        match &self.resident_cube {
            Some((addr, view)) if *addr == cube_addr(cube) => Some(view),
            _ => None,
        }
    }

    fn pipeline(&mut self, shader: ShaderId) -> &PassPipeline {
        let device = &self.device;

        self.pipelines.entry(shader).or_insert_with(|| {
            debug!("compiling {} pipeline", shader);

            let source = format!("{}\n{}", FULLSCREEN_WGSL, shader_source(shader));
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{}.wgsl", shader)),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            let mut entries = vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }];

            let (view_dimension, filterable, sampled) = match shader {
                ShaderId::RgbdEncode | ShaderId::CubeToEquirect => (wgpu::TextureViewDimension::Cube, true, true),
                ShaderId::RgbdDecode => (wgpu::TextureViewDimension::D2Array, true, false),
                ShaderId::RgbeEncode => (wgpu::TextureViewDimension::D2, false, false),
            };

            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            });

            if sampled {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                });
            }

            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("envpack pass layout"),
                entries: &entries,
            });

            let pipe_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("envpack pass pipeline layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("envpack pass pipeline"),
                layout: Some(&pipe_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: "vs_main",
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu_format(output_format(shader)),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

            PassPipeline { pipeline, layout }
        })
    }

    fn layered_texture(&self, label: &str, size: (u32, u32, u32), mips: u32, format: wgpu::TextureFormat) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: size.2,
            },
            mip_level_count: mips,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    fn write_layer(&self, texture: &wgpu::Texture, level: u32, layer: u32, width: u32, height: u32, bytes: &[u8], bpp: u32) {
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: level,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * bpp),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn upload_linear(&self, image: &LinearImage) -> Vec<u8> {
        let texels: Vec<[f32; 4]> = image.pixels.iter().map(|p| [p[0], p[1], p[2], 1.0]).collect();
        bytemuck::cast_slice(&texels).to_vec()
    }

    fn upload_linear_cube(&self, cube: &LinearCubemap) -> wgpu::TextureView {
        debug!("uploading {}px cube, {} levels", cube.size(), cube.mip_count());

        let texture = self.layered_texture(
            "envpack linear cube",
            (cube.size(), cube.size(), CUBE_FACE_COUNT as u32),
            cube.mip_count() as u32,
            wgpu::TextureFormat::Rgba32Float,
        );

        for (level, faces) in cube.levels().iter().enumerate() {
            for (layer, face) in faces.iter().enumerate() {
                let bytes = self.upload_linear(face);
                self.write_layer(&texture, level as u32, layer as u32, face.width, face.height, &bytes, 16);
            }
        }

        texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        })
    }

    fn upload_rgbd_cube(&self, cube: &RgbdCubemap) -> wgpu::TextureView {
        let texture = self.layered_texture(
            "envpack rgbd cube",
            (cube.size(), cube.size(), CUBE_FACE_COUNT as u32),
            cube.mip_count() as u32,
            wgpu::TextureFormat::Rgba8Unorm,
        );

        for (level, faces) in cube.levels().iter().enumerate() {
            for (layer, face) in faces.iter().enumerate() {
                self.write_layer(&texture, level as u32, layer as u32, face.width, face.height, face.as_bytes(), 4);
            }
        }

        texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        })
    }

    fn upload_panorama(&self, image: &Image<[f32; 3]>) -> wgpu::TextureView {
        let texture = self.layered_texture(
            "envpack panorama",
            (image.width, image.height, 1),
            1,
            wgpu::TextureFormat::Rgba32Float,
        );

        let bytes = self.upload_linear(image);
        self.write_layer(&texture, 0, 0, image.width, image.height, &bytes, 16);

        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }
}

impl PassExecutor for GpuExecutor {
    type Target = GpuTarget;

    fn run_pass(&mut self, pass: &Pass<'_, GpuTarget>, desc: &TargetDescriptor) -> Result<GpuTarget> {
        let shader = pass.shader();
        let (width, height) = desc.extent();

        if width == 0 || height == 0 {
            return Err(bad_dims("render target has zero extent"));
        }
        if desc.format() != output_format(shader) {
            return Err(bad_dims(format!("{} renders {:?}, not {:?}", shader, output_format(shader), desc.format())));
        }

        let wants_cube = matches!(shader, ShaderId::RgbdEncode | ShaderId::RgbdDecode);
        if desc.is_cube() != wants_cube {
            return Err(bad_dims(format!("{} cannot render into {:?}", shader, desc)));
        }

        self.pipeline(shader);

        let uploaded;
        let (source, rotation, level, env_map_flip, exposure) = match pass {
            Pass::RgbdEncode {
                environment_map,
                level,
                rotation,
                env_map_flip,
            } => {
                if *level as usize >= environment_map.mip_count() {
                    return Err(bad_dims(format!("source has no mip level {}", level)));
                }
                let view = match self.resident_view(environment_map) {
                    Some(view) => view,
                    None => {
                        uploaded = self.upload_linear_cube(environment_map);
                        &uploaded
                    }
                };
                (view, *rotation, *level, *env_map_flip, 1.0)
            }
            Pass::RgbdDecode { environment_map, level } => {
                if *level as usize >= environment_map.mip_count() || environment_map.size() >> level != width {
                    return Err(bad_dims(format!("decode target {}px does not match mip level {}", width, level)));
                }
                uploaded = self.upload_rgbd_cube(environment_map);
                (&uploaded, Mat3::IDENTITY, *level, 1.0, 1.0)
            }
            Pass::CubeToEquirect {
                environment_map,
                rotation,
                env_map_flip,
            } => {
                let view = match self.resident_view(environment_map) {
                    Some(view) => view,
                    None => {
                        uploaded = self.upload_linear_cube(environment_map);
                        &uploaded
                    }
                };
                (view, *rotation, 0, *env_map_flip, 1.0)
            }
            Pass::RgbeEncode { input, exposure } => {
                uploaded = match input {
                    FlatInput::Image(image) => {
                        if (image.width, image.height) != (width, height) {
                            return Err(bad_dims("RGBE target size differs from input"));
                        }
                        self.upload_panorama(image)
                    }
                    FlatInput::Resident(target) => {
                        if target.desc.is_cube()
                            || target.desc.extent() != (width, height)
                            || target.desc.format() != PixelFormat::Rgba32Float
                        {
                            return Err(bad_dims("RGBE input must be a flat RGBA32F target of the same size"));
                        }
                        target.texture.create_view(&wgpu::TextureViewDescriptor::default())
                    }
                };
                (&uploaded, Mat3::IDENTITY, 0, 1.0, *exposure)
            }
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("envpack pass target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: desc.layer_count() as u32,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format()),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let pipeline = &self.pipelines[&shader];

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("envpack pass encoder"),
        });

        for layer in 0..desc.layer_count() as u32 {
            let uniforms = PassUniforms::new(rotation, layer, level, env_map_flip, exposure);
            let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("envpack pass uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let mut entries = vec![
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(source),
                },
            ];
            if matches!(shader, ShaderId::RgbdEncode | ShaderId::CubeToEquirect) {
                entries.push(wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                });
            }

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("envpack pass bind group"),
                layout: &pipeline.layout,
                entries: &entries,
            });

            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("envpack pass target layer"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            });

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("envpack pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rpass.set_pipeline(&pipeline.pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        Ok(GpuTarget { texture, desc: *desc })
    }

    fn read_pixels(&mut self, target: &GpuTarget, layer: Option<CubeFace>, rect: Rect) -> Result<Vec<u8>> {
        let layer = target.desc.layer_index(layer)?;
        let (width, height) = target.desc.extent();
        rect.check_within(width, height)?;

        let bpp = target.desc.format().bytes_per_pixel();
        let tight_bpr = bpp * rect.width as usize;
        let padded_bpr = align_bpr(tight_bpr);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("envpack readback staging"),
            size: (padded_bpr * rect.height as usize) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("envpack readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: layer as u32,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bpr as u32),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver)
            .map_err(|_| CodecError::CapabilityUnavailable("readback callback dropped".into()))?
            .map_err(|e| CodecError::CapabilityUnavailable(format!("readback map failed: {}", e)))?;

        let data = slice.get_mapped_range();
        let mut tight = Vec::with_capacity(tight_bpr * rect.height as usize);
        for row in 0..rect.height as usize {
            let start = row * padded_bpr;
            tight.extend_from_slice(&data[start..start + tight_bpr]);
        }
        drop(data);
        staging.unmap();

        Ok(tight)
    }

    fn with_resident_cube<R, F>(&mut self, cube: &LinearCubemap, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let view = self.upload_linear_cube(cube);
        self.resident_cube = Some((cube_addr(cube), view));

        let out = f(self);
        self.resident_cube = None;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuExecutor;
    use crate::rgbd::RgbdEncoder;
    use crate::texture::{Texture, Winding};

    fn gpu() -> Option<GpuExecutor> {
        match GpuExecutor::new() {
            Ok(exec) => Some(exec),
            Err(e) => {
                eprintln!("skipping: {}", e);
                None
            }
        }
    }

    fn adapter(backend: wgpu::Backend) -> wgpu::AdapterInfo {
        wgpu::AdapterInfo {
            name: "test adapter".into(),
            vendor: 0,
            device: 0,
            device_type: wgpu::DeviceType::Cpu,
            driver: String::new(),
            driver_info: String::new(),
            backend,
        }
    }

    #[test]
    fn uniform_block_is_64_bytes() {
        assert_eq!(std::mem::size_of::<PassUniforms>(), 64);
    }

    #[test]
    fn gl_and_unfilterable_adapters_are_refused() {
        let filterable = wgpu::Features::FLOAT32_FILTERABLE;

        assert!(check_adapter(&adapter(wgpu::Backend::Vulkan), filterable).is_ok());
        assert!(matches!(
            check_adapter(&adapter(wgpu::Backend::Gl), filterable),
            Err(CodecError::CapabilityUnavailable(_))
        ));
        assert!(matches!(
            check_adapter(&adapter(wgpu::Backend::Metal), wgpu::Features::empty()),
            Err(CodecError::CapabilityUnavailable(_))
        ));
    }

    #[test]
    fn resident_cube_is_released_after_encode() {
        let Some(mut exec) = gpu() else { return };

        let faces = std::array::from_fn(|_| Image::filled(4, 4, [0.5f32, 0.5, 0.5]));
        let source = Texture::Cube(LinearCubemap::from_base_faces(faces, Winding::Standard).unwrap());
        let encoded = RgbdEncoder::new().encode(&mut exec, &source).unwrap();

        assert!(exec.resident_cube.is_none());
        for p in &encoded.face(0, CubeFace::PositiveX).pixels {
            assert_ne!(p[3], 0, "{:?}", p);
        }
    }

    #[test]
    fn rgbd_matches_cpu_within_one_step() {
        let Some(mut exec) = gpu() else { return };

        let faces = std::array::from_fn(|j| {
            Image::from_fn(8, 8, |x, y| [x as f32 * 0.5, y as f32 * 2.0, j as f32 * 10.0])
        });
        let source = Texture::Cube(LinearCubemap::from_base_faces(faces, Winding::Standard).unwrap());

        let on_gpu = RgbdEncoder::new().encode(&mut exec, &source).unwrap();
        let on_cpu = RgbdEncoder::new().encode(&mut CpuExecutor::new(), &source).unwrap();

        for (a, b) in on_gpu.levels().iter().zip(on_cpu.levels()) {
            for (fa, fb) in a.iter().zip(b.iter()) {
                for (pa, pb) in fa.pixels.iter().zip(fb.pixels.iter()) {
                    for c in 0..4 {
                        assert!((pa[c] as i32 - pb[c] as i32).abs() <= 1, "{:?} vs {:?}", pa, pb);
                    }
                }
            }
        }
    }
}
