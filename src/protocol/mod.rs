//! Clipboard payload codec
//!
//! Binary layout carried inside every encrypted frame. All integers are
//! little-endian.
//!
//! ```text
//! Text:  [tag=0 (u32)] [len (u64)] [utf-8 bytes]
//! Image: [tag=1 (u32)] [width (u32)] [height (u32)] [len (u64)] [pixel bytes]
//! ```

use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use thiserror::Error;

/// Variant tag for text payloads
pub const TAG_TEXT: u32 = 0;

/// Variant tag for image payloads
pub const TAG_IMAGE: u32 = 1;

/// Clipboard content exchanged between endpoints
#[derive(Clone, PartialEq, Eq)]
pub enum ClipboardPayload {
    /// UTF-8 text
    Text(String),

    /// Raw image pixels
    Image {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

impl ClipboardPayload {
    /// Wire tag for this variant
    pub fn tag(&self) -> u32 {
        match self {
            Self::Text(_) => TAG_TEXT,
            Self::Image { .. } => TAG_IMAGE,
        }
    }

    /// Size of the encoded payload in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Text(text) => 4 + 8 + text.len(),
            Self::Image { pixels, .. } => 4 + 4 + 4 + 8 + pixels.len(),
        }
    }
}

// Clipboard contents can be large or private; only shapes are printed.
impl fmt::Debug for ClipboardPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "Text(<{} bytes>)", text.len()),
            Self::Image {
                width,
                height,
                pixels,
            } => write!(f, "Image({}x{}, <{} bytes>)", width, height, pixels.len()),
        }
    }
}

/// Codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer ended inside a fixed-size field
    #[error("Payload truncated: needed {needed} more bytes for {field}")]
    Truncated { field: &'static str, needed: usize },

    /// Tag is neither text nor image
    #[error("Unknown clipboard variant tag: {0}")]
    UnknownVariant(u32),

    /// Declared length runs past the end of the buffer
    #[error("Declared {field} length {declared} exceeds remaining {remaining} bytes")]
    LengthOverrun {
        field: &'static str,
        declared: u64,
        remaining: usize,
    },

    /// Text bytes are not UTF-8
    #[error("Text payload is not valid UTF-8")]
    InvalidUtf8,

    /// Bytes left over after a complete payload
    #[error("{0} unexpected trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Serialize a payload into its binary layout
pub fn encode(payload: &ClipboardPayload) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(payload.encoded_len());
    buf.put_u32_le(payload.tag());

    match payload {
        ClipboardPayload::Text(text) => {
            buf.put_u64_le(text.len() as u64);
            buf.put_slice(text.as_bytes());
        }
        ClipboardPayload::Image {
            width,
            height,
            pixels,
        } => {
            buf.put_u32_le(*width);
            buf.put_u32_le(*height);
            buf.put_u64_le(pixels.len() as u64);
            buf.put_slice(pixels);
        }
    }

    buf.to_vec()
}

/// Parse a payload from its binary layout.
///
/// Nothing is returned unless the whole buffer is one well-formed payload.
pub fn decode(mut buf: &[u8]) -> Result<ClipboardPayload, CodecError> {
    let tag = read_u32(&mut buf, "variant tag")?;

    let payload = match tag {
        TAG_TEXT => {
            let bytes = read_sized(&mut buf, "text")?;
            let text = String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
            ClipboardPayload::Text(text)
        }
        TAG_IMAGE => {
            let width = read_u32(&mut buf, "image width")?;
            let height = read_u32(&mut buf, "image height")?;
            let pixels = read_sized(&mut buf, "image")?;
            ClipboardPayload::Image {
                width,
                height,
                pixels,
            }
        }
        other => return Err(CodecError::UnknownVariant(other)),
    };

    if buf.has_remaining() {
        return Err(CodecError::TrailingBytes(buf.remaining()));
    }

    Ok(payload)
}

fn ensure(buf: &[u8], field: &'static str, len: usize) -> Result<(), CodecError> {
    if buf.remaining() < len {
        return Err(CodecError::Truncated {
            field,
            needed: len - buf.remaining(),
        });
    }
    Ok(())
}

fn read_u32(buf: &mut &[u8], field: &'static str) -> Result<u32, CodecError> {
    ensure(*buf, field, 4)?;
    Ok(buf.get_u32_le())
}

/// Read a u64 length followed by that many bytes
fn read_sized(buf: &mut &[u8], field: &'static str) -> Result<Vec<u8>, CodecError> {
    ensure(*buf, field, 8)?;
    let declared = buf.get_u64_le();

    let len = match usize::try_from(declared) {
        Ok(len) if len <= buf.remaining() => len,
        _ => {
            return Err(CodecError::LengthOverrun {
                field,
                declared,
                remaining: buf.remaining(),
            })
        }
    };

    let (bytes, rest) = buf.split_at(len);
    *buf = rest;
    Ok(bytes.to_vec())
}
