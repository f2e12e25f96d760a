//! Transfer functions and 8-bit normalization.

/// sRGB opto-electronic transfer function.
#[inline]
pub fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        v.powf(0.416_666_66) * 1.055 - 0.055
    }
}

/// Inverse of [`linear_to_srgb`].
#[inline]
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.040_45 {
        v * 0.077_399_38
    } else {
        (v * 0.947_867_3 + 0.052_132_7).powf(2.4)
    }
}

/// Float to UNORM8 conversion as performed by a render target write:
/// clamp to `[0, 1]`, scale, round to nearest. NaN becomes 0.
#[inline]
pub fn to_unorm8(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }

    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
pub fn from_unorm8(v: u8) -> f32 {
    v as f32 / 255.0
}
