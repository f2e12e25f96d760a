//! Radiance scanline run-length coding.
//!
//! New-style scanlines start with `02 02 hi lo` (width, big-endian) and then
//! hold the R, G, B and E planes one after another, each compressed with
//! the adaptive byte RLE below. Within a plane a token `n < 128` is followed
//! by `n` literal bytes; a token `128 + n` is followed by one byte repeated
//! `n` times.
//!
//! Widths outside `8..=0x7fff` cannot carry the marker. Readers fall back to
//! flat or old-style pixels (`01 01 01 n` repeats the previous pixel, with
//! consecutive repeats shifting `n` left by another 8 bits).

use crate::cursor::{byte, take};
use crate::error::{bad_hdr, CodecError, Result};

/// Shortest run worth a run token.
pub const MIN_RUN: usize = 4;
/// Longest run a single token can carry.
pub const MAX_RUN: usize = 127;
/// Longest literal span a single token can carry.
pub const MAX_LITERAL: usize = 128;

pub const MIN_SCANLINE_WIDTH: usize = 8;
pub const MAX_SCANLINE_WIDTH: usize = 0x7fff;

pub fn check_scanline_width(width: usize) -> Result<()> {
    if (MIN_SCANLINE_WIDTH..=MAX_SCANLINE_WIDTH).contains(&width) {
        Ok(())
    } else {
        Err(CodecError::UnsupportedScanlineWidth(width))
    }
}

/// Append the RLE of one channel plane to `out`.
///
/// Byte-for-byte compatible with the classic `rgbe.c` encoder, including
/// its habit of emitting a short run (2 or 3 bytes) as a run token when it
/// sits exactly between the last emission point and the next long run.
pub fn encode_channel(data: &[u8], out: &mut Vec<u8>) {
    let len = data.len();
    let mut i = 0;

    while i < len {
        let mut run_start = i;
        let mut run_count = 0;
        let mut prev_run_count = 0;

        while run_count < MIN_RUN && run_start < len {
            run_start += run_count;
            prev_run_count = run_count;
            run_count = 1;

            while run_start + run_count < len
                && run_count < MAX_RUN
                && data[run_start] == data[run_start + run_count]
            {
                run_count += 1;
            }
        }

        if prev_run_count > 1 && prev_run_count == run_start - i {
            out.push(128 + prev_run_count as u8);
            out.push(data[i]);
            i = run_start;
        }

        while i < run_start {
            let count = (run_start - i).min(MAX_LITERAL);
            out.push(count as u8);
            out.extend_from_slice(&data[i..i + count]);
            i += count;
        }

        if run_count >= MIN_RUN {
            out.push(128 + run_count as u8);
            out.push(data[run_start]);
            i += run_count;
        }
    }
}

/// Expand one channel plane from `src` into `out`, consuming exactly the
/// tokens needed to fill it.
pub fn decode_channel(src: &mut &[u8], out: &mut [u8]) -> Result<()> {
    let len = out.len();
    let mut i = 0;

    while i < len {
        let code = byte(src).ok_or_else(|| bad_hdr("truncated scanline"))?;

        if code > 128 {
            let n = (code & 127) as usize;
            let value = byte(src).ok_or_else(|| bad_hdr("truncated scanline"))?;

            if i + n > len {
                return Err(bad_hdr("run overflows scanline"));
            }

            out[i..i + n].fill(value);
            i += n;
        } else {
            let n = code as usize;
            if n == 0 {
                return Err(bad_hdr("zero-length literal in scanline"));
            }
            if i + n > len {
                return Err(bad_hdr("literal overflows scanline"));
            }

            let bytes = take(src, n).ok_or_else(|| bad_hdr("truncated scanline"))?;
            out[i..i + n].copy_from_slice(bytes);
            i += n;
        }
    }

    Ok(())
}

/// Append one new-style scanline: marker, then the four compressed planes.
/// `plane` is scratch space reused across calls.
pub fn encode_scanline(pixels: &[[u8; 4]], plane: &mut Vec<u8>, out: &mut Vec<u8>) -> Result<()> {
    let width = pixels.len();
    check_scanline_width(width)?;

    out.extend_from_slice(&[0x02, 0x02, (width >> 8) as u8, (width & 0xff) as u8]);

    for c in 0..4 {
        plane.clear();
        plane.extend(pixels.iter().map(|px| px[c]));
        encode_channel(plane, out);
    }

    Ok(())
}

/// Read one scanline of `out.len()` pixels, whichever encoding it uses.
pub fn decode_scanline(src: &mut &[u8], out: &mut [[u8; 4]]) -> Result<()> {
    let width = out.len();

    if check_scanline_width(width).is_err() {
        return decode_flat(src, out);
    }

    let head = match src.get(..4) {
        Some(head) => head,
        None => return Err(bad_hdr("truncated scanline")),
    };

    if head[0] != 2 || head[1] != 2 || head[2] & 0x80 != 0 {
        return decode_flat(src, out);
    }

    let encoded_width = (head[2] as usize) << 8 | head[3] as usize;
    if encoded_width != width {
        return Err(bad_hdr(format!(
            "scanline marker says {} pixels, image is {} wide",
            encoded_width, width
        )));
    }
    *src = &src[4..];

    let mut plane = vec![0u8; width];
    for c in 0..4 {
        decode_channel(src, &mut plane)?;

        for (px, v) in out.iter_mut().zip(plane.iter()) {
            px[c] = *v;
        }
    }

    Ok(())
}

/// Flat pixels, with old-style repeat records.
fn decode_flat(src: &mut &[u8], out: &mut [[u8; 4]]) -> Result<()> {
    let mut shift = 0u32;
    let mut i = 0;

    while i < out.len() {
        let px = take(src, 4).ok_or_else(|| bad_hdr("truncated scanline"))?;

        if px[0] == 1 && px[1] == 1 && px[2] == 1 {
            if i == 0 {
                return Err(bad_hdr("repeat record before first pixel"));
            }

            let count = (px[3] as usize)
                .checked_shl(shift)
                .filter(|n| i + n <= out.len())
                .ok_or_else(|| bad_hdr("repeat record overflows scanline"))?;

            let prev = out[i - 1];
            out[i..i + count].fill(prev);
            i += count;
            shift += 8;
        } else {
            out[i] = [px[0], px[1], px[2], px[3]];
            i += 1;
            shift = 0;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_channel(data, &mut out);
        out
    }

    fn decode(mut src: &[u8], len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        decode_channel(&mut src, &mut out).unwrap();
        assert!(src.is_empty(), "{} bytes left over", src.len());
        out
    }

    #[test]
    fn long_run_then_literals() {
        let data = [10, 10, 10, 10, 10, 7, 7, 3];
        let encoded = encode(&data);

        assert_eq!(encoded, vec![133, 10, 3, 7, 7, 3]);
        assert_eq!(decode(&encoded, data.len()), data);
    }

    #[test]
    fn short_run_adjacent_to_long_run_is_folded() {
        assert_eq!(encode(&[5, 5, 5, 9, 9, 9, 9, 9]), vec![131, 5, 133, 9]);
        assert_eq!(encode(&[7, 7]), vec![130, 7]);
    }

    #[test]
    fn short_run_after_literals_stays_literal() {
        let data = [1, 2, 2, 9, 9, 9, 9];
        assert_eq!(encode(&data), vec![3, 1, 2, 2, 132, 9]);
    }

    #[test]
    fn spans_are_capped() {
        let runs = vec![42u8; 300];
        let encoded = encode(&runs);
        assert_eq!(encoded, vec![255, 42, 255, 42, 174, 42]);
        assert_eq!(decode(&encoded, 300), runs);

        let literals: Vec<u8> = (0..200).map(|i| (i % 2) as u8 * 3 + (i % 7) as u8).collect();
        let encoded = encode(&literals);
        assert_eq!(encoded[0], 128);
        assert_eq!(decode(&encoded, literals.len()), literals);
    }

    #[test]
    fn tokens_describe_their_payload() {
        let data: Vec<u8> = (0..500u32).map(|i| ((i / 9) % 5 * (i % 3)) as u8).collect();
        let encoded = encode(&data);

        let mut p = &encoded[..];
        let mut total = 0;
        while let Some(code) = byte(&mut p) {
            if code > 128 {
                let n = (code - 128) as usize;
                assert!((2..=MAX_RUN).contains(&n));
                byte(&mut p).unwrap();
                total += n;
            } else {
                let n = code as usize;
                assert!((1..=MAX_LITERAL).contains(&n));
                take(&mut p, n).unwrap();
                total += n;
            }
        }

        assert_eq!(total, data.len());
        assert_eq!(decode(&encoded, data.len()), data);
    }

    #[test]
    fn scanline_carries_marker_and_planes() {
        let pixels: Vec<[u8; 4]> = (0..16).map(|x| [x as u8, 1, 200, 130]).collect();
        let mut out = Vec::new();
        encode_scanline(&pixels, &mut Vec::new(), &mut out).unwrap();

        assert_eq!(&out[..4], &[2, 2, 0, 16]);

        let mut src = &out[..];
        let mut back = vec![[0u8; 4]; 16];
        decode_scanline(&mut src, &mut back).unwrap();
        assert_eq!(back, pixels);
        assert!(src.is_empty());
    }

    #[test]
    fn width_outside_new_rle_is_rejected() {
        let mut out = Vec::new();

        for width in [0usize, 7, 0x8000] {
            let pixels = vec![[0u8; 4]; width];
            let err = encode_scanline(&pixels, &mut Vec::new(), &mut out).unwrap_err();
            assert!(matches!(err, CodecError::UnsupportedScanlineWidth(w) if w == width));
        }
        assert!(out.is_empty());
    }

    #[test]
    fn old_style_repeats_shift_their_counts() {
        let mut src: &[u8] = &[9, 8, 7, 6, 1, 1, 1, 2, 1, 1, 1, 1, 4, 4, 4, 4];
        // 1 + 2 + (1 << 8) + 1 pixels
        let mut out = vec![[0u8; 4]; 260];

        decode_scanline(&mut src, &mut out).unwrap();
        assert!(src.is_empty());
        assert!(out[..259].iter().all(|p| *p == [9, 8, 7, 6]));
        assert_eq!(out[259], [4, 4, 4, 4]);
    }

    #[test]
    fn flat_scanline_reads_raw_pixels() {
        let mut src: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8];
        let mut out = vec![[0u8; 4]; 2];

        decode_scanline(&mut src, &mut out).unwrap();
        assert_eq!(out, vec![[1, 2, 3, 4], [5, 6, 7, 8]]);
    }

    #[test]
    fn corrupt_planes_are_rejected() {
        let mut out = [0u8; 4];

        assert!(decode_channel(&mut &[0u8, 1][..], &mut out).is_err());
        assert!(decode_channel(&mut &[133u8, 1][..], &mut out).is_err());
        assert!(decode_channel(&mut &[3u8, 1][..], &mut out).is_err());

        let mut px = vec![[0u8; 4]; 8];
        assert!(matches!(
            decode_scanline(&mut &[2u8, 2, 0, 9][..], &mut px),
            Err(CodecError::MalformedHdr(_))
        ));
    }
}
