//! Radiance `.hdr` files.
//!
//! ```text
//! #?RADIANCE
//! # Made with <generator>
//! EXPOSURE=1
//! GAMMA=1
//! PRIMARIES=0 0 0 0 0 0 0 0
//! FORMAT=32-bit_rle_rgbe
//!
//! -Y <height> +X <width>
//! <height new-style RLE scanlines, top row first>
//! ```

use std::str;

use log::{debug, warn};

use crate::cursor::line;
use crate::error::{bad_hdr, Result};
use crate::rgbe;
use crate::rle::{check_scanline_width, decode_scanline, encode_scanline, MAX_RUN};
use crate::texture::{Image, LinearImage, Rgba8Image};

pub const RGBE_FORMAT: &str = "32-bit_rle_rgbe";
pub const DEFAULT_GENERATOR: &str = "envpack";

/// Serializes RGBE rasters.
#[derive(Debug, Clone)]
pub struct HdrWriter {
    /// Written into the `# Made with` comment line.
    pub generator: String,
}

impl Default for HdrWriter {
    fn default() -> Self {
        Self {
            generator: DEFAULT_GENERATOR.to_string(),
        }
    }
}

impl HdrWriter {
    pub fn new(generator: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
        }
    }

    pub fn header(&self, width: u32, height: u32) -> String {
        format!(
            "#?RADIANCE\n# Made with {}\nEXPOSURE=1\nGAMMA=1\nPRIMARIES=0 0 0 0 0 0 0 0\nFORMAT={}\n\n-Y {} +X {}\n",
            self.generator, RGBE_FORMAT, height, width
        )
    }

    /// Whole file as bytes. Nothing is produced if the width cannot be
    /// represented as new-style scanlines.
    pub fn to_bytes(&self, image: &Rgba8Image) -> Result<Vec<u8>> {
        check_scanline_width(image.width as usize)?;

        let header = self.header(image.width, image.height);
        let mut out = Vec::with_capacity(header.len() + image.pixel_count() * 4);
        out.extend_from_slice(header.as_bytes());

        let mut plane = Vec::with_capacity(image.width as usize);
        for y in 0..image.height {
            encode_scanline(image.row(y), &mut plane, &mut out)?;
        }

        debug!(
            "wrote {}x{} radiance image, {} bytes",
            image.width,
            image.height,
            out.len()
        );

        Ok(out)
    }
}

/// A decoded Radiance file.
#[derive(Debug, Clone, PartialEq)]
pub struct HdrImage {
    pub rgbe: Rgba8Image,
    /// Product of every `EXPOSURE=` line, 1.0 if there were none.
    pub exposure: f32,
}

impl HdrImage {
    /// Radiance in linear units with the recorded exposure undone.
    pub fn to_linear(&self) -> LinearImage {
        let image = rgbe::decode_image(&self.rgbe);

        if self.exposure == 1.0 || self.exposure <= 0.0 {
            image
        } else {
            image.scaled(1.0 / self.exposure)
        }
    }
}

fn header_line<'a>(p: &mut &'a [u8]) -> Result<&'a str> {
    let raw = line(p).ok_or_else(|| bad_hdr("header is not terminated"))?;
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    str::from_utf8(raw).map_err(|_| bad_hdr("header is not ASCII"))
}

/// Reject extents the remaining bytes cannot possibly describe, before
/// anything is allocated. Every scanline takes at least one 4-byte record,
/// and no byte expands to more than `MAX_RUN` pixels.
fn check_extent(width: u32, height: u32, remaining: usize) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(bad_hdr("image has zero extent"));
    }

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| bad_hdr(format!("{}x{} image is too large", width, height)))?;

    if height as usize > remaining / 4 || pixels > remaining.saturating_mul(MAX_RUN) {
        return Err(bad_hdr(format!(
            "{}x{} image cannot fit in {} bytes",
            width, height, remaining
        )));
    }

    Ok(pixels)
}

fn parse_resolution(s: &str) -> Result<(u32, u32)> {
    let parts: Vec<&str> = s.split_whitespace().collect();

    match parts.as_slice() {
        ["-Y", h, "+X", w] => {
            let h = h.parse::<u32>().map_err(|_| bad_hdr(format!("bad height {:?}", h)))?;
            let w = w.parse::<u32>().map_err(|_| bad_hdr(format!("bad width {:?}", w)))?;
            Ok((w, h))
        }
        [a, _, b, _] if a.len() == 2 && b.len() == 2 => {
            Err(bad_hdr(format!("unsupported orientation {:?}", s)))
        }
        _ => Err(bad_hdr(format!("bad resolution line {:?}", s))),
    }
}

/// Parse a Radiance file held in memory.
pub fn read_hdr(bytes: &[u8]) -> Result<HdrImage> {
    let mut p = bytes;

    let magic = header_line(&mut p)?;
    if !magic.starts_with("#?") {
        return Err(bad_hdr("missing #? signature"));
    }

    let mut exposure = 1.0f32;
    let mut format_seen = false;

    loop {
        let l = header_line(&mut p)?;
        if l.is_empty() {
            break;
        }

        if let Some(format) = l.strip_prefix("FORMAT=") {
            if format.trim() != RGBE_FORMAT {
                return Err(bad_hdr(format!("unsupported pixel format {:?}", format.trim())));
            }
            format_seen = true;
        } else if let Some(value) = l.strip_prefix("EXPOSURE=") {
            match value.trim().parse::<f32>() {
                Ok(e) if e > 0.0 => exposure *= e,
                _ => warn!("ignoring bad exposure line {:?}", l),
            }
        }
    }

    if !format_seen {
        debug!("no FORMAT line, assuming {}", RGBE_FORMAT);
    }

    let (width, height) = parse_resolution(header_line(&mut p)?)?;
    let pixels = check_extent(width, height, p.len())?;
    debug!("reading {}x{} radiance image ({} pixels)", width, height, pixels);

    let mut rgbe = Image::filled(width, height, [0u8; 4]);
    for row in rgbe.pixels.chunks_exact_mut(width as usize) {
        decode_scanline(&mut p, row)?;
    }

    if !p.is_empty() {
        debug!("{} trailing bytes after last scanline", p.len());
    }

    Ok(HdrImage { rgbe, exposure })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn sample_image() -> Rgba8Image {
        Image::from_fn(16, 3, |x, y| {
            if x < 6 {
                [128, 128, 128, 129]
            } else {
                [x as u8 * 7, y as u8, 255, 136]
            }
        })
    }

    #[test]
    fn header_matches_radiance_layout() {
        let bytes = HdrWriter::new("unit-test").to_bytes(&sample_image()).unwrap();
        let text = String::from_utf8_lossy(&bytes[..120]);

        assert!(text.starts_with(
            "#?RADIANCE\n# Made with unit-test\nEXPOSURE=1\nGAMMA=1\nPRIMARIES=0 0 0 0 0 0 0 0\nFORMAT=32-bit_rle_rgbe\n\n-Y 3 +X 16\n"
        ));
    }

    #[test]
    fn written_file_reads_back() {
        let image = sample_image();
        let bytes = HdrWriter::default().to_bytes(&image).unwrap();
        let read = read_hdr(&bytes).unwrap();

        assert_eq!(read.rgbe, image);
        assert_eq!(read.exposure, 1.0);
        assert_eq!(read.to_linear().pixel(0, 0), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn narrow_images_are_refused() {
        let image = Image::filled(4, 4, [0u8; 4]);
        let err = HdrWriter::default().to_bytes(&image).unwrap_err();

        assert!(matches!(err, CodecError::UnsupportedScanlineWidth(4)));
    }

    #[test]
    fn exposure_lines_are_undone() {
        let mut bytes = b"#?RGBE\nFORMAT=32-bit_rle_rgbe\nEXPOSURE=2\nEXPOSURE=2\n\n-Y 1 +X 2\n".to_vec();
        bytes.extend_from_slice(&[128, 128, 128, 129, 0, 0, 0, 0]);

        let read = read_hdr(&bytes).unwrap();
        assert_eq!(read.exposure, 4.0);
        assert_eq!(read.to_linear().pixels, vec![[0.25, 0.25, 0.25], [0.0, 0.0, 0.0]]);
    }

    #[test]
    fn rejects_foreign_formats_and_layouts() {
        let xyze = b"#?RADIANCE\nFORMAT=32-bit_rle_xyze\n\n-Y 1 +X 8\n";
        assert!(matches!(read_hdr(xyze), Err(CodecError::MalformedHdr(_))));

        let flipped = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n+Y 1 +X 8\n";
        assert!(matches!(read_hdr(flipped), Err(CodecError::MalformedHdr(_))));

        assert!(read_hdr(b"P6\n1 1\n").is_err());
    }

    #[test]
    fn huge_extents_are_rejected_before_allocating() {
        let overflow = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 4000000000 +X 4000000000\n";
        assert!(matches!(read_hdr(overflow), Err(CodecError::MalformedHdr(_))));

        let mut large = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 100000 +X 100000\n".to_vec();
        large.extend_from_slice(&[2, 2, 0x7f, 0xff]);
        assert!(matches!(read_hdr(&large), Err(CodecError::MalformedHdr(_))));

        let zero = b"#?RADIANCE\n\n-Y 0 +X 8\n";
        assert!(matches!(read_hdr(zero), Err(CodecError::MalformedHdr(_))));
    }

    #[test]
    fn crlf_headers_are_accepted() {
        let mut bytes = b"#?RADIANCE\r\nFORMAT=32-bit_rle_rgbe\r\nEXPOSURE=2\r\n\r\n-Y 1 +X 2\r\n".to_vec();
        bytes.extend_from_slice(&[128, 128, 128, 129, 0, 0, 0, 0]);

        let read = read_hdr(&bytes).unwrap();
        assert_eq!((read.rgbe.width, read.rgbe.height), (2, 1));
        assert_eq!(read.exposure, 2.0);
        assert_eq!(read.rgbe.pixel(0, 0), [128, 128, 128, 129]);
    }

    #[test]
    fn truncated_pixels_are_an_error() {
        let image = sample_image();
        let bytes = HdrWriter::default().to_bytes(&image).unwrap();

        let err = read_hdr(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedHdr(_)));
    }
}
