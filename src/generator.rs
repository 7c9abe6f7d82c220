use crate::frame::Frame;
use crate::mask::apply_mask;
use bytes::{BufMut, BytesMut};

/// Serializes one frame into `out`, RFC 6455 section 5.2 layout: flag/opcode
/// byte, mask bit plus minimally encoded length, optional mask key, payload.
/// The stored payload stays untouched; masking happens on the emitted copy.
pub fn encode_frame(frame: &Frame, out: &mut BytesMut) {
    let mut first_byte = (frame.fin as u8) << 7 | frame.opcode.as_u8();
    if frame.rsv1 {
        first_byte |= 0b0100_0000;
    }
    if frame.rsv2 {
        first_byte |= 0b0010_0000;
    }
    if frame.rsv3 {
        first_byte |= 0b0001_0000;
    }

    let mask_bit: u8 = if frame.mask.is_some() { 0b1000_0000 } else { 0 };
    let payload_len = frame.payload.len();

    out.reserve(MAX_OVERHEAD + payload_len);
    out.put_u8(first_byte);

    // Lengths up to 125 ride in the second byte, up to 65535 in an extra
    // u16, anything larger in an extra u64.
    if payload_len <= 125 {
        out.put_u8(mask_bit | payload_len as u8);
    } else if payload_len <= 65535 {
        out.put_u8(mask_bit | 126);
        out.put_u16(payload_len as u16);
    } else {
        out.put_u8(mask_bit | 127);
        out.put_u64(payload_len as u64);
    }

    match frame.mask {
        Some(key) => {
            out.put_slice(&key);
            let start = out.len();
            out.put_slice(&frame.payload);
            apply_mask(&mut out[start..], key);
        }
        None => out.put_slice(&frame.payload),
    }
}

/// Worst-case header size: 2 fixed bytes, 8 length bytes, 4 mask bytes.
const MAX_OVERHEAD: usize = 14;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::parser::FrameParser;

    fn encode(frame: &Frame) -> BytesMut {
        let mut out = BytesMut::new();
        encode_frame(frame, &mut out);
        out
    }

    #[test]
    fn test_unmasked_text_frame_layout() {
        let out = encode(&Frame::text(b"Hello".to_vec()));
        assert_eq!(&out[..], &[0x81, 0x05, 0x48, 0x65, 0x6C, 0x6C, 0x6F]);
    }

    #[test]
    fn test_masked_text_frame_layout() {
        let mut frame = Frame::text(b"Hello".to_vec());
        frame.mask = Some([0x37, 0xFA, 0x21, 0x3D]);
        let out = encode(&frame);
        assert_eq!(
            &out[..],
            &[0x81, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58]
        );
        // the frame's own payload is still plaintext
        assert_eq!(frame.payload, b"Hello");
    }

    #[test]
    fn test_sixteen_bit_length_layout() {
        let out = encode(&Frame::binary(vec![0x44; 256]));
        assert_eq!(&out[..4], &[0x82, 0x7E, 0x01, 0x00]);
        assert_eq!(out.len(), 4 + 256);
    }

    #[test]
    fn test_sixty_four_bit_length_layout() {
        let out = encode(&Frame::binary(vec![0x77; 65536]));
        assert_eq!(
            &out[..10],
            &[0x82, 0x7F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(out.len(), 10 + 65536);
    }

    #[test]
    fn test_boundary_lengths_use_minimal_encoding() {
        let out = encode(&Frame::binary(vec![0; 125]));
        assert_eq!(out[1], 125);

        let out = encode(&Frame::binary(vec![0; 126]));
        assert_eq!(&out[1..4], &[126, 0x00, 0x7E]);

        let out = encode(&Frame::binary(vec![0; 65535]));
        assert_eq!(&out[1..4], &[126, 0xFF, 0xFF]);
    }

    #[test]
    fn test_round_trip_through_parser() {
        let frames = vec![
            Frame::text(b"Hello".to_vec()),
            Frame::binary(vec![0xAB; 300]),
            Frame::continuation(false, b"frag".to_vec()),
            Frame::ping(Vec::new()),
            Frame::pong(b"pong".to_vec()),
        ];

        for original in frames {
            let mut buf = encode(&original);
            let mut parser = FrameParser::new(Role::Client, None);
            let parsed = parser.feed(&mut buf).unwrap().unwrap();
            assert_eq!(parsed, original);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_masked_round_trip_restores_payload() {
        let mut original = Frame::binary((0u8..=255).cycle().take(4096).collect());
        original.mask = Some([0xDE, 0xAD, 0xBE, 0xEF]);

        let mut buf = encode(&original);
        let mut parser = FrameParser::new(Role::Server, None);
        let parsed = parser.feed(&mut buf).unwrap().unwrap();
        assert_eq!(parsed.payload, original.payload);
        assert_eq!(parsed.mask, original.mask);
    }

    #[test]
    fn test_empty_masked_frame_still_carries_key() {
        let mut frame = Frame::ping(Vec::new());
        frame.mask = Some([9, 9, 9, 9]);
        let out = encode(&frame);
        assert_eq!(&out[..], &[0x89, 0x80, 9, 9, 9, 9]);
    }
}
