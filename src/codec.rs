//! The wire-level frame codec, kept free of I/O so it can be driven by whatever
//! buffer-filling strategy the caller's transport loop uses (see `read.rs`).

use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::frame::{Frame, OpCode, Role};
use crate::mask::{apply_mask, generate_mask_key};

/// Result of a single decode attempt over a caller-owned accumulation buffer.
#[derive(Debug)]
pub enum Decoded {
    /// At least this many additional bytes must be appended to the buffer
    /// before decoding can make progress.
    NeedMore(usize),
    /// A complete frame was parsed and consumed from the front of the buffer.
    Frame(Frame),
}

pub struct FrameCodec {
    role: Role,
    max_frame_size: usize,
    permessage_deflate: bool,
}

impl FrameCodec {
    pub fn new(role: Role, max_frame_size: usize, permessage_deflate: bool) -> Self {
        Self {
            role,
            max_frame_size,
            permessage_deflate,
        }
    }

    /// Attempts to decode one frame from the front of `buf`. Never blocks and
    /// never touches a transport; on `NeedMore`, the caller is expected to read
    /// more bytes into `buf` and call `decode` again without discarding what is
    /// already buffered.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Decoded, Error> {
        if buf.len() < 2 {
            return Ok(Decoded::NeedMore(2 - buf.len()));
        }

        let first_byte = buf[0];
        let second_byte = buf[1];

        let fin = first_byte & 0b1000_0000 != 0;
        let rsv1 = first_byte & 0b0100_0000 != 0;
        let rsv2 = first_byte & 0b0010_0000 != 0;
        let rsv3 = first_byte & 0b0001_0000 != 0;
        let opcode = OpCode::from(first_byte & 0b0000_1111)?;

        if rsv2 || rsv3 || (rsv1 && !self.permessage_deflate) {
            return Err(Error::RSVNotZero);
        }

        let masked = second_byte & 0b1000_0000 != 0;
        let length7 = (second_byte & 0b0111_1111) as usize;

        match self.role {
            Role::Server if !masked => return Err(Error::InvalidMaskDirection),
            Role::Client if masked => return Err(Error::InvalidMaskDirection),
            _ => {}
        }

        let ext_len_bytes = match length7 {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let mask_bytes = if masked { 4 } else { 0 };
        let header_len = 2 + ext_len_bytes + mask_bytes;

        if buf.len() < header_len {
            return Ok(Decoded::NeedMore(header_len - buf.len()));
        }

        let payload_len: u64 = match ext_len_bytes {
            2 => u16::from_be_bytes([buf[2], buf[3]]) as u64,
            8 => {
                let len = u64::from_be_bytes(buf[2..10].try_into().expect("8-byte slice"));
                if len & (1 << 63) != 0 {
                    return Err(Error::InvalidPayloadLength);
                }
                len
            }
            _ => length7 as u64,
        };

        if opcode.is_control() && (payload_len > 125 || !fin) {
            return Err(if !fin {
                Error::ControlFramesFragmented
            } else {
                Error::ControlFramePayloadSize
            });
        }

        if payload_len > self.max_frame_size as u64 {
            return Err(Error::MaxFrameSize);
        }
        let payload_len = payload_len as usize;

        let total_len = header_len + payload_len;
        if buf.len() < total_len {
            return Ok(Decoded::NeedMore(total_len - buf.len()));
        }

        let mask_key = if masked {
            let offset = 2 + ext_len_bytes;
            Some([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ])
        } else {
            None
        };

        buf.advance(header_len);
        let mut payload = buf.split_to(payload_len).to_vec();

        if let Some(key) = mask_key {
            apply_mask(&mut payload, key);
        }

        Ok(Decoded::Frame(Frame {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            mask_key,
            payload,
        }))
    }

    /// Appends the wire representation of `frame` to `buf`. Payload length is
    /// encoded using the smallest of the three forms (7-bit, 16-bit, 64-bit), and
    /// a client connection always generates a fresh random mask key here,
    /// ignoring anything already set on `frame.mask_key`.
    pub fn encode(&self, frame: &Frame, buf: &mut BytesMut) -> Result<(), Error> {
        if frame.opcode.is_control() && frame.payload.len() > 125 {
            return Err(Error::ControlFramePayloadSize);
        }

        let mut first_byte = (frame.fin as u8) << 7 | frame.opcode.as_u8();
        if frame.rsv1 {
            first_byte |= 0b0100_0000;
        }
        buf.put_u8(first_byte);

        let masks = self.role == Role::Client;
        let mask_bit = if masks { 0b1000_0000 } else { 0 };
        let len = frame.payload.len();

        if len <= 125 {
            buf.put_u8(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(len as u16);
        } else {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(len as u64);
        }

        if masks {
            let key = generate_mask_key();
            buf.put_slice(&key);
            let mut payload = frame.payload.clone();
            apply_mask(&mut payload, key);
            buf.put_slice(&payload);
        } else {
            buf.put_slice(&frame.payload);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_codec() -> FrameCodec {
        FrameCodec::new(Role::Server, DEFAULT_TEST_MAX_FRAME, false)
    }

    fn client_codec() -> FrameCodec {
        FrameCodec::new(Role::Client, DEFAULT_TEST_MAX_FRAME, false)
    }

    const DEFAULT_TEST_MAX_FRAME: usize = 1 << 20;

    #[test]
    fn roundtrips_an_unmasked_server_text_frame() {
        let codec = server_codec();
        let frame = Frame::new(true, OpCode::Text, b"hello".to_vec());

        let encoder = FrameCodec::new(Role::Server, DEFAULT_TEST_MAX_FRAME, false);
        let mut buf = BytesMut::new();
        encoder.encode(&frame, &mut buf).unwrap();

        match codec.decode(&mut buf).unwrap() {
            Decoded::Frame(decoded) => {
                assert_eq!(decoded.fin, frame.fin);
                assert_eq!(decoded.opcode, frame.opcode);
                assert_eq!(decoded.payload, frame.payload);
            }
            Decoded::NeedMore(_) => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn roundtrips_a_masked_client_frame() {
        let encoder = client_codec();
        let frame = Frame::new(true, OpCode::Binary, vec![1, 2, 3, 4, 5]);

        let mut buf = BytesMut::new();
        encoder.encode(&frame, &mut buf).unwrap();
        assert_ne!(&buf[2..6], &[0, 0, 0, 0], "mask key should not be trivially zero most of the time");

        let decoder = server_codec();
        match decoder.decode(&mut buf).unwrap() {
            Decoded::Frame(decoded) => {
                assert_eq!(decoded.payload, frame.payload);
                assert!(decoded.mask_key.is_some());
            }
            Decoded::NeedMore(_) => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn partial_header_requests_more_bytes() {
        let codec = server_codec();
        let mut buf = BytesMut::from(&[0b1000_0001u8][..]);
        match codec.decode(&mut buf).unwrap() {
            Decoded::NeedMore(n) => assert_eq!(n, 1),
            Decoded::Frame(_) => panic!("should not have enough bytes yet"),
        }
    }

    #[test]
    fn partial_payload_requests_remaining_bytes() {
        let codec = server_codec();
        // fin=1 text opcode, unmasked, length=5, but only 2 payload bytes present
        let mut buf = BytesMut::from(&[0b1000_0001u8, 5, b'h', b'e'][..]);
        match codec.decode(&mut buf).unwrap() {
            Decoded::NeedMore(n) => assert_eq!(n, 3),
            Decoded::Frame(_) => panic!("should not have enough bytes yet"),
        }
    }

    #[test]
    fn server_rejects_unmasked_client_frame() {
        let codec = server_codec();
        let mut buf = BytesMut::from(&[0b1000_0001u8, 0][..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn client_rejects_masked_server_frame() {
        let codec = client_codec();
        let mut buf = BytesMut::from(&[0b1000_0001u8, 0b1000_0000, 1, 2, 3, 4][..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn rejects_reserved_bits_without_extension() {
        let codec = server_codec();
        let mut buf = BytesMut::from(&[0b1100_0001u8, 0b1000_0000, 0, 0, 0, 0][..]);
        assert!(matches!(codec.decode(&mut buf), Err(Error::RSVNotZero)));
    }

    #[test]
    fn rejects_fragmented_control_frame() {
        let codec = server_codec();
        // fin=0, ping opcode, masked empty payload
        let mut buf = BytesMut::from(&[0b0000_1001u8, 0b1000_0000, 0, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::ControlFramesFragmented)
        ));
    }

    #[test]
    fn rejects_oversized_control_payload() {
        let codec = server_codec();
        let mut header = vec![0b1000_1001u8, 0b1111_1110, 0, 126];
        header.extend_from_slice(&[0, 0, 0, 0]);
        header.extend(vec![0u8; 126]);
        let mut buf = BytesMut::from(&header[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::ControlFramePayloadSize)
        ));
    }

    #[test]
    fn length_boundaries_roundtrip() {
        for len in [0usize, 1, 125, 126, 65535, 65536] {
            let encoder = server_codec();
            let frame = Frame::new(true, OpCode::Binary, vec![7u8; len]);
            let mut buf = BytesMut::new();
            encoder.encode(&frame, &mut buf).unwrap();

            let decoder = FrameCodec::new(Role::Server, 1 << 17, false);
            match decoder.decode(&mut buf).unwrap() {
                Decoded::Frame(decoded) => assert_eq!(decoded.payload.len(), len),
                Decoded::NeedMore(_) => panic!("frame of len {len} should have decoded fully"),
            }
        }
    }

    #[test]
    fn frame_exceeding_max_size_is_rejected() {
        let codec = FrameCodec::new(Role::Server, 16, false);
        // fin=1 binary opcode, masked, length7=126 -> 2-byte extended length of 17
        let mut buf = BytesMut::from(&[0b1000_0010u8, 0b1111_1110, 0, 17, 0, 0, 0, 0][..]);
        assert!(matches!(codec.decode(&mut buf), Err(Error::MaxFrameSize)));
    }
}
