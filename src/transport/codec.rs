//! Multipart wire framing.
//!
//! One message on the wire is a single length-delimited frame (4-byte
//! big-endian prefix) whose payload is a sequence of parts, each introduced
//! by its own 4-byte big-endian length. An empty part is a valid delimiter
//! frame.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// One multi-part message.
pub type Multipart = Vec<Bytes>;

/// Codec framing `Multipart` values onto a byte stream.
pub struct MultipartCodec {
    inner: LengthDelimitedCodec,
}

impl MultipartCodec {
    /// `max_message_length` bounds the whole encoded message, all parts
    /// included, to keep a hostile peer from ballooning memory.
    pub fn new(max_message_length: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_message_length)
                .new_codec(),
        }
    }
}

impl Decoder for MultipartCodec {
    type Item = Multipart;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Multipart>, io::Error> {
        let Some(mut frame) = self.inner.decode(src)? else {
            return Ok(None);
        };

        let mut parts = Multipart::new();
        while frame.has_remaining() {
            if frame.remaining() < 4 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated part header",
                ));
            }
            let length = frame.get_u32() as usize;
            if frame.remaining() < length {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "part length exceeds message",
                ));
            }
            parts.push(frame.split_to(length).freeze());
        }

        Ok(Some(parts))
    }
}

impl Encoder<Multipart> for MultipartCodec {
    type Error = io::Error;

    fn encode(&mut self, parts: Multipart, dst: &mut BytesMut) -> Result<(), io::Error> {
        let total: usize = parts.iter().map(|part| 4 + part.len()).sum();
        let mut payload = BytesMut::with_capacity(total);
        for part in &parts {
            payload.put_u32(part.len() as u32);
            payload.extend_from_slice(part);
        }
        self.inner.encode(payload.freeze(), dst)
    }
}
