//! envpack: environment-map codecs.
//!
//! - RGBD: floating-point cube mip chains quantized to 8 bits per channel
//!   with a shared divisor in alpha, `D = floor(255 / max) / 255`.
//! - `.env`: the RGBD mip chain as PNG faces behind a JSON manifest.
//! - RGBE / `.hdr`: cube resampled to a 2:1 equirect panorama, packed as
//!   shared-exponent pixels (bias 136) and written as a Radiance file with
//!   new-style RLE scanlines.
//!
//! Every pixel transform runs as a full-screen pass behind [`PassExecutor`].
//! [`CpuExecutor`] is always available; the `gpu` feature adds a wgpu
//! implementation with the same numeric behaviour.
//!
//! Face order everywhere: +X, -X, +Y, -Y, +Z, -Z. Mip chains are stored
//! level-major, face-minor, from the full-size level down to 1×1.

pub mod color;
pub mod container;
pub mod cpu;
mod cursor;
pub mod equirect;
pub mod error;
pub mod export;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod hdr;
pub mod pass;
pub mod rgbd;
pub mod rgbe;
pub mod rle;
pub mod sampler;
pub mod texture;

pub use container::{ByteOrder, ContainerInfo, ContainerOptions, ImageCodec, Manifest, MipEntry, PngCodec};
pub use cpu::CpuExecutor;
pub use equirect::{cube_from_equirect, Equirect, EquirectProjector};
pub use error::{CodecError, Result};
pub use export::{EnvExporter, EnvLoader, HdrExporter};
#[cfg(feature = "gpu")]
pub use gpu::GpuExecutor;
pub use hdr::{read_hdr, HdrImage, HdrWriter};
pub use pass::{Pass, PassExecutor, PixelFormat, Rect, ShaderId, TargetDescriptor};
pub use rgbd::{RgbdDecoder, RgbdEncoder};
pub use rgbe::RgbeEncoder;
pub use texture::{
    CubeFace, Cubemap, Image, LinearCubemap, LinearImage, Rgba8Image, RgbdCubemap, Texture, TextureKind, Winding,
    CUBE_FACE_COUNT,
};
