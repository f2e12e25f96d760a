//! `.env` cube texture container.
//!
//! ```text
//! 00 : u32   version = 1
//! 04 : u32   json_len
//! 08 : [u8]  UTF-8 JSON manifest (json_len bytes)
//! .. : [u8]  compressed face images, back to back
//! ```
//!
//! The manifest is `{"generator", "imageSize", "mipmaps": [{"length",
//! "position"}]}`, one `mipmaps` entry per (level, face), level-major and
//! face-minor in +X,-X,+Y,-Y,+Z,-Z order. Positions are relative to the end
//! of the JSON. Header words are little-endian by default; readers accept
//! either byte order.

use std::fs::File;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{malformed, Result};
use crate::hdr::DEFAULT_GENERATOR;
use crate::texture::{mip_count_for, Image, Rgba8Image, RgbdCubemap, Winding, CUBE_FACE_COUNT};

pub const CONTAINER_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MipEntry {
    pub length: u64,
    pub position: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub generator: String,
    pub image_size: u32,
    pub mipmaps: Vec<MipEntry>,
}

impl Manifest {
    /// Entry count a manifest must have for its image size.
    pub fn expected_entries(&self) -> usize {
        if self.image_size == 0 {
            return 0;
        }

        let levels = (self.image_size as f64).log2().round() as usize + 1;
        CUBE_FACE_COUNT * levels
    }

    /// Entry for `face` of mip `level`.
    pub fn entry(&self, level: usize, face: usize) -> Option<&MipEntry> {
        self.mipmaps.get(level * CUBE_FACE_COUNT + face)
    }
}

/// Byte order of the two header words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    /// What browser `DataView` writes by default.
    Big,
}

impl ByteOrder {
    fn put_u32(self, out: &mut Vec<u8>, v: u32) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn get_u32(self, b: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerOptions {
    pub generator: String,
    pub byte_order: ByteOrder,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            generator: DEFAULT_GENERATOR.to_string(),
            byte_order: ByteOrder::Little,
        }
    }
}

/// Lossless per-face raster compression.
pub trait ImageCodec {
    /// Append the compressed form of `image` to `out`.
    fn compress(&self, image: &Rgba8Image, out: &mut Vec<u8>) -> Result<()>;

    fn decompress(&self, bytes: &[u8]) -> Result<Rgba8Image>;
}

/// PNG through the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct PngCodec {
    pub compression: CompressionType,
    pub filter: FilterType,
}

impl Default for PngCodec {
    fn default() -> Self {
        Self {
            compression: CompressionType::Default,
            filter: FilterType::Adaptive,
        }
    }
}

impl PngCodec {
    pub fn new(compression: CompressionType, filter: FilterType) -> Self {
        Self { compression, filter }
    }

    /// Level 1 deflate without filtering.
    pub fn fast() -> Self {
        Self::new(CompressionType::Fast, FilterType::NoFilter)
    }
}

impl ImageCodec for PngCodec {
    fn compress(&self, image: &Rgba8Image, out: &mut Vec<u8>) -> Result<()> {
        let encoder = PngEncoder::new_with_quality(&mut *out, self.compression, self.filter);
        encoder.write_image(image.as_bytes(), image.width, image.height, ExtendedColorType::Rgba8)?;
        Ok(())
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Rgba8Image> {
        let rgba = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8();
        Rgba8Image::from_bytes(rgba.width(), rgba.height(), rgba.as_raw())
    }
}

/// Header and manifest of a container, without the image payload decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub version: u32,
    pub byte_order: ByteOrder,
    pub manifest: Manifest,
    /// Size of the image data region.
    pub data_len: usize,
}

/// Compress every (level, face) of `cube` and lay out a container.
pub fn serialize<C: ImageCodec>(cube: &RgbdCubemap, codec: &C, options: &ContainerOptions) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut mipmaps = Vec::with_capacity(cube.mip_count() * CUBE_FACE_COUNT);

    for (level, faces) in cube.levels().iter().enumerate() {
        for (face, image) in faces.iter().enumerate() {
            let position = data.len();
            codec.compress(image, &mut data)?;

            trace!(
                "level {} face {}: {} bytes at {}",
                level,
                face,
                data.len() - position,
                position
            );

            mipmaps.push(MipEntry {
                length: (data.len() - position) as u64,
                position: position as u64,
            });
        }
    }

    let manifest = Manifest {
        generator: options.generator.clone(),
        image_size: cube.size(),
        mipmaps,
    };
    let json = serde_json::to_vec(&manifest)?;

    let json_len = u32::try_from(json.len()).map_err(|_| malformed("manifest too large"))?;

    let mut out = Vec::with_capacity(HEADER_LEN + json.len() + data.len());
    options.byte_order.put_u32(&mut out, CONTAINER_VERSION);
    options.byte_order.put_u32(&mut out, json_len);
    out.extend_from_slice(&json);
    out.extend_from_slice(&data);

    debug!(
        "container: {}px, {} images, {} bytes ({:?})",
        cube.size(),
        manifest.mipmaps.len(),
        out.len(),
        options.byte_order
    );

    Ok(out)
}

/// Parse the header and manifest, checking every entry against the buffer.
pub fn read_manifest(bytes: &[u8]) -> Result<ContainerInfo> {
    if bytes.len() < HEADER_LEN {
        return Err(malformed("truncated header"));
    }

    let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];

    let byte_order = [ByteOrder::Little, ByteOrder::Big]
        .into_iter()
        .find(|order| order.get_u32(word(0)) == CONTAINER_VERSION)
        .ok_or_else(|| malformed(format!("unsupported version word {:02x?}", word(0))))?;

    let version = byte_order.get_u32(word(0));
    let json_len = byte_order.get_u32(word(4)) as usize;

    let json_end = HEADER_LEN
        .checked_add(json_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| malformed("manifest runs past end of file"))?;

    let manifest: Manifest =
        serde_json::from_slice(&bytes[HEADER_LEN..json_end]).map_err(|e| malformed(format!("bad manifest: {}", e)))?;

    if manifest.image_size == 0 || !manifest.image_size.is_power_of_two() {
        return Err(malformed(format!("image size {} is not a power of two", manifest.image_size)));
    }

    if manifest.mipmaps.len() != manifest.expected_entries() {
        return Err(malformed(format!(
            "{} mip entries for a {}px cube, expected {}",
            manifest.mipmaps.len(),
            manifest.image_size,
            manifest.expected_entries()
        )));
    }

    let data_len = bytes.len() - json_end;

    for (index, entry) in manifest.mipmaps.iter().enumerate() {
        let fits = entry
            .position
            .checked_add(entry.length)
            .map_or(false, |end| end <= data_len as u64);

        if !fits {
            return Err(malformed(format!(
                "image {} ({} bytes at {}) lies outside the {} byte data region",
                index, entry.length, entry.position, data_len
            )));
        }
    }

    Ok(ContainerInfo {
        version,
        byte_order,
        manifest,
        data_len,
    })
}

/// Decode a container into its RGBD cube.
pub fn deserialize<C: ImageCodec>(bytes: &[u8], codec: &C) -> Result<RgbdCubemap> {
    let info = read_manifest(bytes)?;
    let data = &bytes[bytes.len() - info.data_len..];
    let size = info.manifest.image_size;

    debug!(
        "container v{} ({:?}) from {:?}: {}px",
        info.version, info.byte_order, info.manifest.generator, size
    );

    let mut levels = Vec::with_capacity(mip_count_for(size));

    for level in 0..mip_count_for(size) {
        let want = size >> level;
        let mut faces: Vec<Rgba8Image> = Vec::with_capacity(CUBE_FACE_COUNT);

        for face in 0..CUBE_FACE_COUNT {
            let entry = info
                .manifest
                .entry(level, face)
                .ok_or_else(|| malformed("missing mip entry"))?;

            let start = entry.position as usize;
            let image = codec.decompress(&data[start..start + entry.length as usize])?;

            if image.width != want || image.height != want {
                return Err(malformed(format!(
                    "level {} face {} decoded to {}x{}, expected {}x{}",
                    level, face, image.width, image.height, want, want
                )));
            }

            faces.push(image);
        }

        let faces: [Image<[u8; 4]>; CUBE_FACE_COUNT] = faces
            .try_into()
            .map_err(|_| malformed("face count mismatch"))?;
        levels.push(faces);
    }

    RgbdCubemap::from_levels(levels, Winding::Standard)
}

/// Read and decode a container file; memory-mapped when possible.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>, C: ImageCodec>(path: P, codec: &C) -> Result<RgbdCubemap> {
    let file = File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    deserialize(&map, codec)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>, C: ImageCodec>(path: P, codec: &C) -> Result<RgbdCubemap> {
    let bytes = std::fs::read(path)?;
    deserialize(&bytes, codec)
}

pub fn write_file<P: AsRef<Path>, C: ImageCodec>(
    path: P,
    cube: &RgbdCubemap,
    codec: &C,
    options: &ContainerOptions,
) -> Result<()> {
    use std::io::Write;

    let bytes = serialize(cube, codec, options)?;

    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    file.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_cube(size: u32) -> RgbdCubemap {
        let levels = (0..mip_count_for(size))
            .map(|level| {
                let s = size >> level;
                std::array::from_fn(|face| {
                    Image::from_fn(s, s, |x, y| [x as u8, y as u8, face as u8 * 40, 255 - level as u8])
                })
            })
            .collect();

        RgbdCubemap::from_levels(levels, Winding::Standard).unwrap()
    }

    /// Rewrite the manifest of a container in place.
    fn with_manifest(bytes: &[u8], edit: impl FnOnce(&mut Manifest)) -> Vec<u8> {
        let info = read_manifest(bytes).unwrap();
        let mut manifest = info.manifest;
        edit(&mut manifest);

        let json = serde_json::to_vec(&manifest).unwrap();
        let mut out = Vec::new();
        ByteOrder::Little.put_u32(&mut out, CONTAINER_VERSION);
        ByteOrder::Little.put_u32(&mut out, json.len() as u32);
        out.extend_from_slice(&json);
        out.extend_from_slice(&bytes[bytes.len() - info.data_len..]);
        out
    }

    #[test]
    fn container_round_trips_losslessly() {
        let cube = pattern_cube(8);
        let bytes = serialize(&cube, &PngCodec::fast(), &ContainerOptions::default()).unwrap();

        assert_eq!(deserialize(&bytes, &PngCodec::default()).unwrap(), cube);
    }

    #[test]
    fn header_is_little_endian_by_default() {
        let bytes = serialize(&pattern_cube(2), &PngCodec::fast(), &ContainerOptions::default()).unwrap();

        assert_eq!(&bytes[..4], &[1, 0, 0, 0]);
        let json_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let manifest: serde_json::Value = serde_json::from_slice(&bytes[8..8 + json_len]).unwrap();

        assert_eq!(manifest["generator"], "envpack");
        assert_eq!(manifest["imageSize"], 2);
        assert_eq!(manifest["mipmaps"].as_array().unwrap().len(), 12);
        assert_eq!(manifest["mipmaps"][0]["position"], 0);
    }

    #[test]
    fn big_endian_headers_are_detected() {
        let cube = pattern_cube(4);
        let options = ContainerOptions {
            generator: "browser".into(),
            byte_order: ByteOrder::Big,
        };
        let bytes = serialize(&cube, &PngCodec::fast(), &options).unwrap();

        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);

        let info = read_manifest(&bytes).unwrap();
        assert_eq!(info.byte_order, ByteOrder::Big);
        assert_eq!(info.manifest.generator, "browser");
        assert_eq!(deserialize(&bytes, &PngCodec::default()).unwrap(), cube);
    }

    #[test]
    fn offsets_are_contiguous() {
        let bytes = serialize(&pattern_cube(4), &PngCodec::fast(), &ContainerOptions::default()).unwrap();
        let info = read_manifest(&bytes).unwrap();

        let mut next = 0;
        for entry in &info.manifest.mipmaps {
            assert_eq!(entry.position, next);
            next += entry.length;
        }
        assert_eq!(next as usize, info.data_len);
    }

    #[test]
    fn wrong_entry_count_is_rejected() {
        let bytes = serialize(&pattern_cube(4), &PngCodec::fast(), &ContainerOptions::default()).unwrap();
        let bad = with_manifest(&bytes, |m| {
            m.mipmaps.pop();
        });

        assert!(matches!(read_manifest(&bad), Err(crate::CodecError::MalformedContainer(_))));
    }

    #[test]
    fn out_of_range_entries_are_rejected() {
        let bytes = serialize(&pattern_cube(2), &PngCodec::fast(), &ContainerOptions::default()).unwrap();
        let bad = with_manifest(&bytes, |m| m.mipmaps[3].length = 1 << 20);

        assert!(matches!(read_manifest(&bad), Err(crate::CodecError::MalformedContainer(_))));
    }

    #[test]
    fn truncated_and_unknown_headers_are_rejected() {
        assert!(read_manifest(&[1, 0, 0]).is_err());
        assert!(read_manifest(&[2, 0, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(read_manifest(&[1, 0, 0, 0, 200, 0, 0, 0, b'{']).is_err());
    }

    #[test]
    fn swapped_faces_fail_size_check() {
        let bytes = serialize(&pattern_cube(4), &PngCodec::fast(), &ContainerOptions::default()).unwrap();
        let bad = with_manifest(&bytes, |m| m.mipmaps.swap(0, 6));

        let err = deserialize(&bad, &PngCodec::default()).unwrap_err();
        assert!(matches!(err, crate::CodecError::MalformedContainer(_)));
    }

    #[test]
    fn expected_entries_follows_rounded_log2() {
        let manifest = |image_size| Manifest {
            generator: String::new(),
            image_size,
            mipmaps: Vec::new(),
        };

        assert_eq!(manifest(1).expected_entries(), 6);
        assert_eq!(manifest(256).expected_entries(), 54);
        assert_eq!(manifest(0).expected_entries(), 0);
    }
}
