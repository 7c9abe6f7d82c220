use crate::close::CloseInfo;
use crate::config::Role;
use crate::error::Error;
use crate::frame::{Frame, OpCode};
use crate::mask::apply_mask;
use bytes::{Buf, BytesMut};

/// The longest possible frame header: 2 fixed bytes, 8 bytes of extended
/// length and a 4-byte mask key.
pub const MAX_HEADER_SIZE: usize = 14;

/// Initial payload buffer reservation. The declared payload length comes
/// from the peer, so we grow towards it instead of trusting it up front.
const PAYLOAD_BLOCK_SIZE: usize = 64 * 1024;

/// Stateful byte-to-frame decoder. `feed` can be called with however many
/// bytes the transport happened to deliver; the parser never consumes from
/// the input buffer until a complete header is available and buffers
/// partial payloads internally, so it is resumable at any byte boundary.
pub struct FrameParser {
    role: Role,
    max_frame_size: Option<usize>,
    state: State,
}

enum State {
    Header,
    Payload(Partial),
}

struct Partial {
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    remaining: usize,
    payload: Vec<u8>,
}

impl FrameParser {
    pub fn new(role: Role, max_frame_size: Option<usize>) -> Self {
        Self {
            role,
            max_frame_size,
            state: State::Header,
        }
    }

    /// True when no partially decoded frame is pending, i.e. the byte
    /// stream sits on a frame boundary.
    pub fn is_on_frame_boundary(&self) -> bool {
        matches!(self.state, State::Header)
    }

    /// Consumes as much of `buf` as possible and returns the next complete
    /// frame, or `None` when more bytes are needed. Call in a loop until it
    /// returns `None` to drain every frame already buffered.
    pub fn feed(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, Error> {
        if let State::Header = self.state {
            match self.parse_header(buf)? {
                Some(partial) => self.state = State::Payload(partial),
                None => return Ok(None),
            }
        }

        let frame = if let State::Payload(partial) = &mut self.state {
            let take = partial.remaining.min(buf.len());
            if take > 0 {
                partial.payload.extend_from_slice(&buf[..take]);
                buf.advance(take);
                partial.remaining -= take;
            }
            if partial.remaining > 0 {
                return Ok(None);
            }
            complete_frame(partial)?
        } else {
            return Ok(None);
        };

        self.state = State::Header;
        Ok(Some(frame))
    }

    /// Parses and consumes one frame header once `buf` holds all of it.
    /// Leaves `buf` untouched while the header is still incomplete.
    fn parse_header(&self, buf: &mut BytesMut) -> Result<Option<Partial>, Error> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let b0 = buf[0];
        let b1 = buf[1];

        let masked = b1 & 0b1000_0000 != 0;
        let length7 = (b1 & 0b0111_1111) as usize;
        let extended = match length7 {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let header_len = 2 + extended + if masked { 4 } else { 0 };
        debug_assert!(header_len <= MAX_HEADER_SIZE);
        if buf.len() < header_len {
            return Ok(None);
        }

        let fin = b0 & 0b1000_0000 != 0;
        let rsv1 = b0 & 0b0100_0000 != 0;
        let rsv2 = b0 & 0b0010_0000 != 0;
        let rsv3 = b0 & 0b0001_0000 != 0;
        let opcode = OpCode::from(b0 & 0b0000_1111)?;

        // RSV bits belong to negotiated extensions; this engine negotiates
        // none, so any set bit fails the connection.
        if rsv1 || rsv2 || rsv3 {
            return Err(Error::RsvNotZero);
        }

        if opcode.is_control() && !fin {
            return Err(Error::ControlFramesFragmented);
        }

        let payload_len: u64 = match length7 {
            126 => {
                let len = u16::from_be_bytes([buf[2], buf[3]]) as u64;
                if len <= 125 {
                    return Err(Error::NonMinimalLength);
                }
                len
            }
            127 => {
                let mut be_bytes = [0u8; 8];
                be_bytes.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(be_bytes);
                if len & (1 << 63) != 0 {
                    return Err(Error::InvalidFrameLength);
                }
                if len <= 65535 {
                    return Err(Error::NonMinimalLength);
                }
                len
            }
            len => len as u64,
        };

        if opcode.is_control() && payload_len > 125 {
            return Err(Error::ControlFramePayloadSize);
        }

        // Clients must mask everything they send, servers nothing.
        match self.role {
            Role::Server if !masked => return Err(Error::ExpectedMaskedFrame),
            Role::Client if masked => return Err(Error::UnexpectedMaskedFrame),
            _ => {}
        }

        if let Some(max) = self.max_frame_size {
            if payload_len > max as u64 {
                return Err(Error::MaxFrameSize);
            }
        }

        // A close payload is either empty or starts with a two-byte code.
        if opcode == OpCode::Close && payload_len == 1 {
            return Err(Error::InvalidClosePayload);
        }

        buf.advance(2 + extended);
        let mask = if masked {
            let mut key = [0u8; 4];
            key.copy_from_slice(&buf[..4]);
            buf.advance(4);
            Some(key)
        } else {
            None
        };

        let payload_len = payload_len as usize;
        Ok(Some(Partial {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            mask,
            remaining: payload_len,
            payload: Vec::with_capacity(payload_len.min(PAYLOAD_BLOCK_SIZE)),
        }))
    }
}

fn complete_frame(partial: &mut Partial) -> Result<Frame, Error> {
    let mut payload = std::mem::take(&mut partial.payload);

    // The mask index runs over the whole frame payload, which is why
    // unmasking waits for the final payload chunk.
    if let Some(key) = partial.mask {
        apply_mask(&mut payload, key);
    }

    // the one place an inbound close payload is parsed and validated;
    // downstream consumers use the decoded value on the frame
    let close_info = if partial.opcode == OpCode::Close {
        CloseInfo::parse(&payload)?
    } else {
        None
    };

    Ok(Frame {
        fin: partial.fin,
        rsv1: partial.rsv1,
        rsv2: partial.rsv2,
        rsv3: partial.rsv3,
        opcode: partial.opcode,
        mask: partial.mask,
        payload,
        close_info,
    })
}
