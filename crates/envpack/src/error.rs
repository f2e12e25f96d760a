use std::io;

use crate::texture::TextureKind;

pub type Result<T> = std::result::Result<T, CodecError>;

/// Failures surfaced by the codecs. An operation that returns an error has
/// produced no output.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid input kind: expected {expected} texture, got {got}")]
    InvalidInputKind {
        expected: TextureKind,
        got: TextureKind,
    },

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("malformed radiance file: {0}")]
    MalformedHdr(String),

    #[error("unsupported scanline width {0} (new-style RLE needs 8..=32767)")]
    UnsupportedScanlineWidth(usize),

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

#[cold]
pub(crate) fn bad_dims(msg: impl Into<String>) -> CodecError {
    CodecError::InvalidDimensions(msg.into())
}

#[cold]
pub(crate) fn malformed(msg: impl Into<String>) -> CodecError {
    CodecError::MalformedContainer(msg.into())
}

#[cold]
pub(crate) fn bad_hdr(msg: impl Into<String>) -> CodecError {
    CodecError::MalformedHdr(msg.into())
}
