//! RFC6455 frame codec and handshake key derivation.
//!
//! # Responsibilities
//! - Encode server frames: FIN always set, never masked, 7/16/64-bit length
//! - Decode client frame headers: mask required, fragmentation rejected
//! - Derive the `Sec-WebSocket-Accept` value

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use crate::error::ProtocolError;

/// RFC6455 §1.3 handshake GUID.
const HANDSHAKE_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `Sec-WebSocket-Accept` for a client's `Sec-WebSocket-Key`.
pub fn key_response(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(HANDSHAKE_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_bits(bits: u8) -> Option<OpCode> {
        match bits {
            0 => Some(OpCode::Continuation),
            1 => Some(OpCode::Text),
            2 => Some(OpCode::Binary),
            8 => Some(OpCode::Close),
            9 => Some(OpCode::Ping),
            10 => Some(OpCode::Pong),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            OpCode::Continuation => 0,
            OpCode::Text => 1,
            OpCode::Binary => 2,
            OpCode::Close => 8,
            OpCode::Ping => 9,
            OpCode::Pong => 10,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpCode::Continuation => "continue",
            OpCode::Text => "text",
            OpCode::Binary => "binary",
            OpCode::Close => "close",
            OpCode::Ping => "ping",
            OpCode::Pong => "pong",
        };
        f.write_str(name)
    }
}

/// Decoded header of one client frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub opcode: OpCode,
    pub header_length: usize,
    pub payload_length: usize,
    pub mask: [u8; 4],
}

/// Encode the header of a server frame carrying `length` payload bytes.
///
/// Server→client frames are never masked and never fragmented.
pub fn encode_frame(length: usize, opcode: OpCode) -> Vec<u8> {
    let mut header = Vec::with_capacity(10);
    header.push(0x80 | opcode.bits());

    if length < 126 {
        header.push(length as u8);
    } else if length < 65536 {
        header.push(126);
        header.extend_from_slice(&(length as u16).to_be_bytes());
    } else {
        header.push(127);
        header.extend_from_slice(&(length as u64).to_be_bytes());
    }

    header
}

/// Decode a client frame header from `data`.
///
/// Returns `Ok(None)` while the header is still incomplete. The caller is
/// responsible for waiting out the payload and for enforcing its maximum
/// incoming frame length.
pub fn decode_frame(data: &[u8]) -> Result<Option<FrameHeader>, ProtocolError> {
    const PREFIX_LENGTH: usize = 2;
    const MASK_LENGTH: usize = 4;

    if data.len() < PREFIX_LENGTH {
        return Ok(None);
    }

    let flags = data[0];
    let bits = flags & 0x0f;
    let opcode = OpCode::from_bits(bits).ok_or(ProtocolError::UnknownOpcode(bits))?;

    let final_frame = flags & 0x80 != 0;
    if !final_frame || opcode == OpCode::Continuation {
        return Err(ProtocolError::FragmentedFrame);
    }

    // RFC6455: "The server MUST close the connection upon receiving a frame
    // that is not masked."
    if data[1] & 0x80 == 0 {
        return Err(ProtocolError::UnmaskedFrame);
    }

    let short_length = (data[1] & 0x7f) as usize;
    let (payload_length, extended_length) = match short_length {
        126 => {
            if data.len() < PREFIX_LENGTH + 2 + MASK_LENGTH {
                return Ok(None);
            }
            (u16::from_be_bytes([data[2], data[3]]) as usize, 2)
        }
        127 => {
            if data.len() < PREFIX_LENGTH + 8 + MASK_LENGTH {
                return Ok(None);
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[2..10]);
            (u64::from_be_bytes(bytes) as usize, 8)
        }
        length => {
            if data.len() < PREFIX_LENGTH + MASK_LENGTH {
                return Ok(None);
            }
            (length, 0)
        }
    };

    let header_length = PREFIX_LENGTH + extended_length + MASK_LENGTH;
    let mut mask = [0u8; 4];
    mask.copy_from_slice(&data[PREFIX_LENGTH + extended_length..header_length]);

    Ok(Some(FrameHeader {
        opcode,
        header_length,
        payload_length,
        mask,
    }))
}

/// XOR the payload with the client-provided mask, in place.
pub fn unmask(payload: &mut [u8], mask: [u8; 4]) {
    for (index, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[index % 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_response_matches_rfc6455_vector() {
        assert_eq!(
            key_response("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    fn masked(header: Vec<u8>) -> Vec<u8> {
        let mut frame = header;
        frame[1] |= 0x80;
        frame.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);
        frame
    }

    #[test]
    fn frame_header_round_trips_across_length_encodings() {
        for length in [0usize, 1, 125, 126, 127, 65535, 65536] {
            let frame = masked(encode_frame(length, OpCode::Binary));
            let header = decode_frame(&frame).unwrap().unwrap();
            assert_eq!(header.payload_length, length, "length {length}");
            assert_eq!(header.opcode, OpCode::Binary);
            assert_eq!(header.header_length, frame.len());
            assert_eq!(header.mask, [0xaa, 0xbb, 0xcc, 0xdd]);
        }
    }

    #[test]
    fn encoded_lengths_use_expected_markers() {
        assert_eq!(encode_frame(125, OpCode::Text).len(), 2);
        assert_eq!(encode_frame(126, OpCode::Text)[1], 126);
        assert_eq!(encode_frame(65535, OpCode::Text).len(), 4);
        assert_eq!(encode_frame(65536, OpCode::Text)[1], 127);
        assert_eq!(encode_frame(65536, OpCode::Text).len(), 10);
    }

    #[test]
    fn unmasked_client_frames_are_rejected() {
        let frame = encode_frame(5, OpCode::Text);
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::UnmaskedFrame)
        ));
    }

    #[test]
    fn fragments_are_rejected() {
        // FIN clear.
        let mut frame = masked(encode_frame(3, OpCode::Text));
        frame[0] &= 0x7f;
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::FragmentedFrame)
        ));

        // Continuation opcode.
        let frame = masked(encode_frame(3, OpCode::Continuation));
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::FragmentedFrame)
        ));
    }

    #[test]
    fn short_headers_ask_for_more_bytes() {
        assert!(decode_frame(&[]).unwrap().is_none());
        assert!(decode_frame(&[0x81]).unwrap().is_none());
        // 16-bit length marker without the extended length and mask.
        assert!(decode_frame(&[0x81, 0x80 | 126, 0x01]).unwrap().is_none());
    }

    #[test]
    fn unmask_inverts_client_masking() {
        let mask = [1u8, 2, 3, 4];
        let mut payload = b"frame payload".to_vec();
        unmask(&mut payload, mask);
        assert_ne!(payload.as_slice(), b"frame payload");
        unmask(&mut payload, mask);
        assert_eq!(payload.as_slice(), b"frame payload");
    }

    #[test]
    fn control_opcodes_are_recognized() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(!OpCode::Text.is_control());
        assert_eq!(OpCode::from_bits(3), None);
        assert_eq!(OpCode::Close.to_string(), "close");
    }
}
