//! Pure frame codec over a cumulative byte buffer.
//!
//! ```ignore
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! Decoding never consumes bytes until a whole frame is present: a short
//! buffer yields `Ok(None)` and the caller reads more from the transport.

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::errors::Error;
use crate::frame::{Frame, Opcode};
use crate::mask;
use crate::{CLIENT, SERVER};

#[derive(Debug)]
pub(crate) struct FrameCodec<const SIDE: bool> {
    max_payload_len: usize,
}

impl<const SIDE: bool> FrameCodec<SIDE> {
    pub fn new(max_payload_len: usize) -> Self {
        Self { max_payload_len }
    }

    /// Attempts to decode one frame from the front of `src`.
    ///
    /// `Ok(None)` means more bytes are needed and `src` is untouched; on
    /// success `src` is advanced by exactly the frame size.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        if src.len() < 2 {
            return Ok(None);
        }
        // An upstream HTTP parser that failed to hand off residual bytes
        // shows up here as the start of a status or request line.
        if src[0] == b'H' && src[1] == b'T' {
            return Err(Error::StreamMisdirection);
        }

        let (b1, b2) = (src[0], src[1]);
        let fin = b1 & 0x80 != 0;
        let opcode = Opcode::from_wire(b1 & 0x0F)
            .ok_or(Error::Protocol("reserved or unknown opcode"))?;
        let masked = b2 & 0x80 != 0;

        if SERVER == SIDE && !masked {
            return Err(Error::Protocol("expected masked frame from client"));
        }
        if CLIENT == SIDE && masked {
            return Err(Error::Protocol("expected unmasked frame from server"));
        }

        let (header_len, payload_len) = match (b2 & 0x7F) as usize {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (4, u64::from(u16::from_be_bytes([src[2], src[3]])))
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let len = u64::from_be_bytes([
                    src[2], src[3], src[4], src[5], src[6], src[7], src[8], src[9],
                ]);
                if len >> 32 != 0 {
                    return Err(Error::TooBig(len));
                }
                (10, len)
            }
            n => (2, n as u64),
        };

        if payload_len > self.max_payload_len as u64 {
            return Err(Error::TooBig(payload_len));
        }
        let payload_len = payload_len as usize;

        let mask_len = if masked { 4 } else { 0 };
        let total = header_len + mask_len + payload_len;
        if src.len() < total {
            return Ok(None);
        }

        let key = masked.then(|| {
            [
                src[header_len],
                src[header_len + 1],
                src[header_len + 2],
                src[header_len + 3],
            ]
        });
        let body = header_len + mask_len;
        let mut payload = src[body..body + payload_len].to_vec();
        src.advance(total);
        if let Some(key) = key {
            mask::apply_mask(&mut payload, key);
        }

        trace!(fin, ?opcode, masked, payload_len, "decoded frame");
        Ok(Some(Frame {
            fin,
            opcode,
            masked,
            payload,
        }))
    }

    /// Serializes one frame into `dst`. FIN is always set; client-side
    /// codecs mask the payload with a fresh random key.
    pub fn encode(&self, opcode: Opcode, payload: &[u8], dst: &mut BytesMut) -> Result<(), Error> {
        let len = payload.len();
        if len as u64 > u64::from(u32::MAX) {
            return Err(Error::TooBig(len as u64));
        }
        if opcode.is_control() && len > 125 {
            return Err(Error::Application(
                "control frame payload limited to 125 bytes",
            ));
        }

        let masked = CLIENT == SIDE;
        let mask_bit: u8 = if masked { 0x80 } else { 0 };

        dst.reserve(14 + len);
        dst.put_u8(0x80 | opcode as u8);
        if len <= 125 {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= 65535 {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        if masked {
            let key = mask::random_key();
            dst.put_slice(&key);
            let body = dst.len();
            dst.put_slice(payload);
            mask::apply_mask(&mut dst[body..], key);
        } else {
            dst.put_slice(payload);
        }

        trace!(?opcode, masked, payload_len = len, "encoded frame");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 16 * 1024 * 1024;

    fn server() -> FrameCodec<SERVER> {
        FrameCodec::new(MAX)
    }

    fn client() -> FrameCodec<CLIENT> {
        FrameCodec::new(MAX)
    }

    fn masked_text(payload: &[u8]) -> BytesMut {
        let mut src = BytesMut::new();
        FrameCodec::<CLIENT>::new(MAX)
            .encode(Opcode::Text, payload, &mut src)
            .unwrap();
        src
    }

    #[test]
    fn decode_unmasked_text() {
        let mut src = BytesMut::from(&[0x81, 0x05, b'H', b'e', b'l', b'l', b'o'][..]);
        let frame = client().decode(&mut src).unwrap().unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
        assert!(!frame.masked);
        assert_eq!(frame.payload, b"Hello");
        assert!(src.is_empty());
    }

    #[test]
    fn decode_masked_text() {
        // RFC 6455 section 5.7 sample: "Hello" masked with 37 fa 21 3d
        let mut src = BytesMut::from(
            &[0x81, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58][..],
        );
        let frame = server().decode(&mut src).unwrap().unwrap();
        assert!(frame.masked);
        assert_eq!(frame.payload, b"Hello");
    }

    #[test]
    fn mask_key_round_trips() {
        let mut wire = masked_text(b"ping me");
        let frame = server().decode(&mut wire).unwrap().unwrap();
        assert_eq!(frame.payload, b"ping me");
    }

    #[test]
    fn byte_at_a_time_matches_single_read() {
        let wire = masked_text(b"fragmented transport");
        let mut src = BytesMut::new();
        let codec = server();
        for (i, byte) in wire.iter().enumerate() {
            src.put_u8(*byte);
            let step = codec.decode(&mut src).unwrap();
            if i + 1 < wire.len() {
                assert!(step.is_none(), "decoded early at byte {i}");
                assert_eq!(src.len(), i + 1, "need-more must not consume");
            } else {
                assert_eq!(step.unwrap().payload, b"fragmented transport");
            }
        }
        assert!(src.is_empty());
    }

    #[test]
    fn mask_policy_is_role_asymmetric() {
        let mut masked = masked_text(b"hi");
        assert!(matches!(
            client().decode(&mut masked),
            Err(Error::Protocol(_))
        ));

        let mut unmasked = BytesMut::from(&[0x81, 0x02, b'h', b'i'][..]);
        assert!(matches!(
            server().decode(&mut unmasked),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn ht_sniff_fires_on_http_bytes() {
        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\n"[..]);
        assert!(matches!(
            client().decode(&mut src),
            Err(Error::StreamMisdirection)
        ));
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let mut src = BytesMut::from(&[0x83, 0x00][..]);
        assert!(matches!(client().decode(&mut src), Err(Error::Protocol(_))));
    }

    #[test]
    fn length_encoding_boundaries() {
        let codec = FrameCodec::<SERVER>::new(usize::MAX);
        for (len, header) in [
            (125usize, vec![0x82, 125]),
            (126, vec![0x82, 126, 0, 126]),
            (65535, vec![0x82, 126, 0xFF, 0xFF]),
            (65536, vec![0x82, 127, 0, 0, 0, 0, 0, 1, 0, 0]),
        ] {
            let payload = vec![0xAB; len];
            let mut dst = BytesMut::new();
            codec.encode(Opcode::Binary, &payload, &mut dst).unwrap();
            assert_eq!(&dst[..header.len()], &header[..], "header for len {len}");

            let decoded = FrameCodec::<CLIENT>::new(usize::MAX)
                .decode(&mut dst)
                .unwrap()
                .unwrap();
            assert_eq!(decoded.payload, payload, "round trip for len {len}");
        }
    }

    #[test]
    fn sixty_four_bit_lengths_are_capped_at_u32() {
        // 2^32 - 1 is representable: decode just waits for the payload.
        let permissive = FrameCodec::<CLIENT>::new(u32::MAX as usize);
        let mut max_ok = BytesMut::from(&[0x82, 127, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF][..]);
        assert!(permissive.decode(&mut max_ok).unwrap().is_none());

        // 2^32 is refused outright.
        let mut too_big = BytesMut::from(&[0x82, 127, 0, 0, 0, 1, 0, 0, 0, 0][..]);
        assert!(matches!(
            permissive.decode(&mut too_big),
            Err(Error::TooBig(_))
        ));
    }

    #[test]
    fn declared_length_over_cap_is_refused_before_buffering() {
        let codec = FrameCodec::<CLIENT>::new(16);
        let mut src = BytesMut::from(&[0x82, 126, 0x10, 0x00][..]);
        assert!(matches!(codec.decode(&mut src), Err(Error::TooBig(4096))));
    }

    #[test]
    fn oversized_control_payload_is_an_application_error() {
        let mut dst = BytesMut::new();
        let err = server()
            .encode(Opcode::Ping, &[0u8; 126], &mut dst)
            .unwrap_err();
        assert!(matches!(err, Error::Application(_)));
    }

    #[test]
    fn close_frame_wire_bytes() {
        let mut dst = BytesMut::new();
        server()
            .encode(Opcode::Close, &1000u16.to_be_bytes(), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], &[0x88, 0x02, 0x03, 0xE8]);
    }

    #[test]
    fn fin_clear_is_surfaced_not_rejected() {
        let mut src = BytesMut::from(&[0x01, 0x03, b'H', b'e', b'l'][..]);
        let frame = client().decode(&mut src).unwrap().unwrap();
        assert!(!frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
    }
}
