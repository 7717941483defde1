//! Message codec for wire framing
//!
//! Frames are one JSON object per line, UTF-8, `\n` terminated. A line
//! that fails to parse is consumed before the error is returned, so the
//! stream stays aligned and the caller can keep reading frames.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{ClientFrame, ServerFrame};

/// Maximum frame size (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("Frame exceeds maximum length")]
    FrameTooLong,
}

impl CodecError {
    /// Whether this error poisons the connection or only the current frame
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Codec for ServerFrame (decoding) and ClientFrame (encoding)
/// Used by the client side
pub struct ClientCodec {
    discarding: bool,
}

impl ClientCodec {
    pub fn new() -> Self {
        Self { discarding: false }
    }
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ClientCodec {
    type Item = ServerFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, &mut self.discarding)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame_eof(src, &mut self.discarding)
    }
}

impl Encoder<ClientFrame> for ClientCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ClientFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst)
    }
}

/// Codec for ClientFrame (decoding) and ServerFrame (encoding)
/// Used by the server side
pub struct ServerCodec {
    discarding: bool,
}

impl ServerCodec {
    pub fn new() -> Self {
        Self { discarding: false }
    }
}

impl Default for ServerCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ServerCodec {
    type Item = ClientFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, &mut self.discarding)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame_eof(src, &mut self.discarding)
    }
}

impl Encoder<ServerFrame> for ServerCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ServerFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst)
    }
}

/// Decode the next newline-terminated frame
///
/// An overlong line flips `discarding`; input is then dropped up to the
/// next newline before decoding resumes (the `LinesCodec` discipline).
fn decode_frame<T: DeserializeOwned>(
    src: &mut BytesMut,
    discarding: &mut bool,
) -> Result<Option<T>, CodecError> {
    loop {
        // Never scan more than one byte past the frame limit
        let read_to = MAX_FRAME_SIZE.saturating_add(1).min(src.len());
        let newline = src[..read_to].iter().position(|b| *b == b'\n');

        if *discarding {
            match newline {
                Some(offset) => {
                    src.advance(offset + 1);
                    *discarding = false;
                    continue;
                }
                None => {
                    src.advance(read_to);
                    if src.is_empty() {
                        return Ok(None);
                    }
                    continue;
                }
            }
        }

        return match newline {
            Some(offset) => {
                // Consume the line before parsing so a parse failure
                // leaves the buffer aligned on the next frame
                let line = src.split_to(offset + 1);
                let frame = serde_json::from_slice(trim_line(&line[..offset]))?;
                Ok(Some(frame))
            }
            None if src.len() > MAX_FRAME_SIZE => {
                *discarding = true;
                Err(CodecError::FrameTooLong)
            }
            None => Ok(None),
        };
    }
}

/// Decode at end-of-stream: a trailing unterminated line is still a frame
fn decode_frame_eof<T: DeserializeOwned>(
    src: &mut BytesMut,
    discarding: &mut bool,
) -> Result<Option<T>, CodecError> {
    if let Some(frame) = decode_frame(src, discarding)? {
        return Ok(Some(frame));
    }
    if src.is_empty() {
        return Ok(None);
    }
    let line = src.split_to(src.len());
    let frame = serde_json::from_slice(trim_line(&line))?;
    Ok(Some(frame))
}

/// Encode one frame followed by the line terminator
fn encode_frame<T: Serialize>(item: &T, dst: &mut BytesMut) -> Result<(), CodecError> {
    let json = serde_json::to_vec(item)?;
    dst.reserve(json.len() + 1);
    dst.extend_from_slice(&json);
    dst.put_u8(b'\n');
    Ok(())
}

/// Strip a trailing carriage return
fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
